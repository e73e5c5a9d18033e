//! Environment driven configuration
use super::application::{ApplicationField, IntakePolicy};
use super::identity::TokenAuthority;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of the sled database
    pub db_path: PathBuf,

    /// Deadline applied to every store call
    pub store_timeout: Duration,

    /// HMAC secret for staff tokens, no default
    pub jwt_secret: String,

    /// Lifetime of issued tokens (default: 86400 = 24 hours)
    pub jwt_ttl_seconds: i64,

    pub intake: IntakePolicy,

    /// Fallback filter when RUST_LOG is unset
    pub log_level: String,
}

fn parse_number<T>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

impl Config {
    /// Load configuration from the process environment, after reading `.env` if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("LOAN_DESK_DB").unwrap_or_else(|| "loan-desk.db".to_string());

        let store_timeout = match lookup("LOAN_DESK_STORE_TIMEOUT_MS") {
            Some(raw) => parse_number::<u64>("LOAN_DESK_STORE_TIMEOUT_MS", raw)?,
            None => 2000,
        };
        if store_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LOAN_DESK_STORE_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("JWT_SECRET"))?;

        let jwt_ttl_seconds = match lookup("JWT_TTL_SECONDS") {
            Some(raw) => parse_number::<i64>("JWT_TTL_SECONDS", raw)?,
            None => 86400,
        };

        let mut intake = IntakePolicy::default();
        if let Some(raw) = lookup("LOAN_REQUIRED_FIELDS") {
            intake.required_fields = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| {
                    name.parse::<ApplicationField>()
                        .map_err(|e| ConfigError::InvalidValue {
                            key: "LOAN_REQUIRED_FIELDS",
                            value: raw.clone(),
                            reason: e.to_string(),
                        })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(raw) = lookup("LOAN_REQUIRED_TERMS") {
            intake.required_terms = parse_number("LOAN_REQUIRED_TERMS", raw)?;
        }

        Ok(Self {
            db_path: PathBuf::from(db_path),
            store_timeout: Duration::from_millis(store_timeout),
            jwt_secret,
            jwt_ttl_seconds,
            intake,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn token_authority(&self) -> TokenAuthority {
        TokenAuthority::new(self.jwt_secret.as_bytes(), self.jwt_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.db_path, PathBuf::from("loan-desk.db"));
        assert_eq!(config.store_timeout, Duration::from_millis(2000));
        assert_eq!(config.jwt_ttl_seconds, 86400);
        assert_eq!(config.intake, IntakePolicy::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn secret_is_required() {
        assert_eq!(
            Config::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::MissingEnvVar("JWT_SECRET")
        );
        assert_eq!(
            Config::from_lookup(lookup(&[("JWT_SECRET", "  ")])).unwrap_err(),
            ConfigError::MissingEnvVar("JWT_SECRET")
        );
    }

    #[test]
    fn intake_policy_is_configurable() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("LOAN_REQUIRED_FIELDS", "firstName, bankName,"),
            ("LOAN_REQUIRED_TERMS", "3"),
        ]))
        .unwrap();

        assert_eq!(
            config.intake.required_fields,
            vec![ApplicationField::FirstName, ApplicationField::BankName]
        );
        assert_eq!(config.intake.required_terms, 3);
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("LOAN_DESK_STORE_TIMEOUT_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "LOAN_DESK_STORE_TIMEOUT_MS",
                ..
            }
        ));

        let err = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s3cret"),
            ("LOAN_REQUIRED_FIELDS", "firstName,shoeSize"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "LOAN_REQUIRED_FIELDS", .. }));
    }
}
