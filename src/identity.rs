//! Identity & role context
//!
//! Resolves an opaque credential into a [`Principal`]. The engine only ever
//! sees principals; how a credential is checked lives behind
//! [`CredentialVerifier`]. [`TokenAuthority`] is the signed-token realization.

use super::error::WorkflowError;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("No credential provided")]
    MissingCredential,
    #[error("Credential expired")]
    Expired,
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
    #[error("Unknown role: {0:?}")]
    UnknownRole(String),
    #[error("Token could not be issued: {0}")]
    Issue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Maker,
    Checker,
    Accountant,
}

/// Role-gated workflow actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Review,
    Disburse,
    RecordPayment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub role: Role,
}

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Principal, AuthError>;
}

/// JWT claims carried by staff tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (staff user ID)
    pub sub: String,
    pub username: String,
    pub role: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Issues and verifies HS256-signed staff tokens
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Maker, Role::Checker, Role::Accountant];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Maker => "maker",
            Role::Checker => "checker",
            Role::Accountant => "accountant",
        }
    }

    pub fn permits(&self, action: Action) -> bool {
        match action {
            Action::Review => matches!(self, Role::Checker | Role::Admin),
            Action::Disburse | Action::RecordPayment => {
                matches!(self, Role::Accountant | Role::Admin)
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AuthError::UnknownRole(s.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Review => "review loans",
            Action::Disburse => "disburse loans",
            Action::RecordPayment => "record payments",
        })
    }
}

impl Principal {
    pub fn new(id: &str, username: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            role,
        }
    }

    pub fn authorize(&self, action: Action) -> Result<(), WorkflowError> {
        if self.role.permits(action) {
            return Ok(());
        }

        tracing::warn!(
            principal = %self.id,
            role = %self.role,
            %action,
            "Action denied for role"
        );
        Err(WorkflowError::Forbidden {
            role: self.role,
            action,
        })
    }
}

impl TokenAuthority {
    /// # Arguments
    /// * `secret` - HMAC signing secret
    /// * `ttl_seconds` - lifetime of issued tokens
    pub fn new(secret: &[u8], ttl_seconds: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: principal.id.clone(),
            username: principal.username.clone(),
            role: principal.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }
}

impl CredentialVerifier for TokenAuthority {
    fn verify(&self, credential: &str) -> Result<Principal, AuthError> {
        let credential = credential.trim();
        let token = credential
            .strip_prefix("Bearer")
            .map(str::trim)
            .unwrap_or(credential);
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidCredential(e.to_string()),
            }
        })?;

        let role = data
            .claims
            .role
            .parse::<Role>()
            .map_err(|e| AuthError::InvalidCredential(e.to_string()))?;

        Ok(Principal {
            id: data.claims.sub,
            username: data.claims.username,
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_permissions() {
        assert!(Role::Checker.permits(Action::Review));
        assert!(Role::Admin.permits(Action::Review));
        assert!(!Role::Accountant.permits(Action::Review));
        assert!(!Role::Maker.permits(Action::Review));

        for action in [Action::Disburse, Action::RecordPayment] {
            assert!(Role::Accountant.permits(action));
            assert!(Role::Admin.permits(action));
            assert!(!Role::Checker.permits(action));
            assert!(!Role::Maker.permits(action));
        }
    }

    #[test]
    fn token_round_trip() {
        let authority = TokenAuthority::new(b"unit-test-secret", 3600);
        let principal = Principal::new("user-7", "checker1", Role::Checker);

        let token = authority.issue(&principal).unwrap();
        assert_eq!(authority.verify(&token).unwrap(), principal);
        assert_eq!(authority.verify(&format!("Bearer {token}")).unwrap(), principal);
    }

    #[test]
    fn blank_credential_is_missing() {
        let authority = TokenAuthority::new(b"unit-test-secret", 3600);
        assert!(matches!(
            authority.verify("Bearer   "),
            Err(AuthError::MissingCredential)
        ));
    }
}
