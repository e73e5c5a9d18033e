//! Repayment records and the payment request that creates them
use super::application::{number_or_text, parse_float};
use super::error::ValidationError;
use super::loan::{CalendarDate, TimeStamp};
use super::utils::non_blank;
use chrono::Utc;
use serde::Deserialize;

// Key in the repayments tree is `repayment_id`. Immutable once written.
#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Repayment {
    #[n(0)]
    pub repayment_id: String,
    #[n(1)]
    pub loan_id: String, // reference only, the loan is not owned
    #[n(2)]
    pub payment_date: CalendarDate,
    #[n(3)]
    pub amount_paid: f64,
    #[n(4)]
    pub payment_method: Option<String>,
    #[n(5)]
    pub reference_number: Option<String>,
    #[n(6)]
    pub notes: Option<String>,
    #[n(7)]
    pub recorded_by: String,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentRequest {
    pub loan_id: Option<String>,
    pub payment_date: Option<String>,
    #[serde(deserialize_with = "number_or_text")]
    pub amount_paid: Option<String>,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

/// A payment request that passed shape validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPayment {
    pub loan_id: String,
    pub payment_date: CalendarDate,
    pub amount_paid: f64,
    pub payment_method: Option<String>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

impl PaymentRequest {
    pub fn new(loan_id: &str, payment_date: &str, amount_paid: &str) -> Self {
        Self {
            loan_id: Some(loan_id.to_string()),
            payment_date: Some(payment_date.to_string()),
            amount_paid: Some(amount_paid.to_string()),
            ..Self::default()
        }
    }
    pub fn set_payment_method(mut self, method: &str) -> Self {
        self.payment_method = Some(method.to_string());
        self
    }
    pub fn set_reference_number(mut self, reference: &str) -> Self {
        self.reference_number = Some(reference.to_string());
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub fn validate(&self) -> Result<ValidPayment, ValidationError> {
        let loan_id =
            non_blank(self.loan_id.clone()).ok_or(ValidationError::MissingField("loanId"))?;
        let payment_date = match non_blank(self.payment_date.clone()) {
            Some(raw) => CalendarDate::parse("paymentDate", &raw)?,
            None => return Err(ValidationError::MissingField("paymentDate")),
        };
        let amount_paid = parse_float("amountPaid", self.amount_paid.as_deref())?;
        if amount_paid <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "amountPaid",
                value: amount_paid.to_string(),
            });
        }

        Ok(ValidPayment {
            loan_id,
            payment_date,
            amount_paid,
            payment_method: non_blank(self.payment_method.clone()),
            reference_number: non_blank(self.reference_number.clone()),
            notes: non_blank(self.notes.clone()),
        })
    }
}

impl ValidPayment {
    pub fn into_repayment(
        self,
        repayment_id: String,
        recorded_by: String,
        created_at: TimeStamp<Utc>,
    ) -> Repayment {
        Repayment {
            repayment_id,
            loan_id: self.loan_id,
            payment_date: self.payment_date,
            amount_paid: self.amount_paid,
            payment_method: self.payment_method,
            reference_number: self.reference_number,
            notes: self.notes,
            recorded_by,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_named() {
        let err = PaymentRequest::default().validate().unwrap_err();
        assert_eq!(err, ValidationError::MissingField("loanId"));

        let err = PaymentRequest::new("loan1x", " ", "10").validate().unwrap_err();
        assert_eq!(err, ValidationError::MissingField("paymentDate"));

        let err = PaymentRequest::new("loan1x", "2024-03-01", "").validate().unwrap_err();
        assert_eq!(err, ValidationError::MissingField("amountPaid"));
    }

    #[test]
    fn amount_must_be_positive() {
        assert!(PaymentRequest::new("loan1x", "2024-03-01", "0").validate().is_err());
        assert!(PaymentRequest::new("loan1x", "2024-03-01", "-5").validate().is_err());
        assert!(PaymentRequest::new("loan1x", "2024-03-01", "abc").validate().is_err());

        let valid = PaymentRequest::new("loan1x", "2024-03-01", "250.50")
            .set_payment_method("cash")
            .validate()
            .unwrap();
        assert_eq!(valid.amount_paid, 250.5);
        assert_eq!(valid.payment_method.as_deref(), Some("cash"));
    }
}
