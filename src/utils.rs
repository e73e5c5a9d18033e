//! Identifier generation and small input helpers

use bech32::Bech32m;
use uuid7::uuid7;

pub const LOAN_HRP: &str = "loan";
pub const REPAYMENT_HRP: &str = "repay";

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Trims a form value, treating whitespace-only input as absent
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let loan_id = new_uuid_to_bech32(LOAN_HRP).unwrap();
        let repayment_id = new_uuid_to_bech32(REPAYMENT_HRP).unwrap();

        assert!(loan_id.starts_with("loan1"));
        assert!(repayment_id.starts_with("repay1"));
    }

    #[test]
    fn blank_values_are_absent() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" Thandi ".into())), Some("Thandi".into()));
    }
}
