//! Smoke Screen Unit tests for loan desk components
//!
//! These tests span the codebase, exercising each module in isolation from
//! the integration scenarios. Mostly happy paths plus the rejections a form
//! user is most likely to hit.

use chrono::{Datelike, Timelike, Utc};
use loan_desk::{
    application::{ApplicationField, IntakePolicy, LoanApplication},
    error::{ValidationError, WorkflowError},
    identity::{Action, AuthError, CredentialVerifier, Principal, Role, TokenAuthority},
    loan::{LoanStatus, RepaymentMethod, TimeStamp},
    utils::{LOAN_HRP, REPAYMENT_HRP, new_uuid_to_bech32},
};

fn complete_application() -> LoanApplication {
    LoanApplication::new()
        .set_applicant("Thandi", "Mokoena")
        .set_id_number("9001015009087")
        .set_contact_number("0821234567")
        .set_loan_amount("1000")
        .set_interest_rate("10")
        .set_loan_period_months("6")
        .add_repayment_method("cash")
        .accept_terms((1..=11).map(|i| format!("term-{i}")))
}

fn finalise(application: &LoanApplication) -> Result<loan_desk::loan::Loan, ValidationError> {
    application.validate_and_finalise(&IntakePolicy::default(), "loan1smoke".into(), TimeStamp::new())
}

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Ids carry their human readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let loan_id = new_uuid_to_bech32(LOAN_HRP).unwrap();
        assert!(loan_id.starts_with("loan1"));
        assert!(loan_id.len() > 10);

        let repayment_id = new_uuid_to_bech32(REPAYMENT_HRP).unwrap();
        assert!(repayment_id.starts_with("repay1"));
    }

    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn generates_unique_ids() {
        let first = new_uuid_to_bech32(LOAN_HRP).unwrap();
        let second = new_uuid_to_bech32(LOAN_HRP).unwrap();
        assert_ne!(first, second);
    }
}

// LOAN MODULE TESTS
#[cfg(test)]
mod loan_tests {
    use super::*;

    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1);
    }

    #[test]
    fn timestamp_new_with_creates_specific_time() {
        let dt = TimeStamp::new_with(2024, 6, 15, 10, 30, 0)
            .unwrap()
            .to_datetime_utc();

        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 6);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn terminal_statuses() {
        assert!(LoanStatus::Rejected.is_terminal());
        assert!(LoanStatus::Disbursed.is_terminal());
        assert!(!LoanStatus::Pending.is_terminal());
        assert!(!LoanStatus::Approved.is_terminal());
    }

    #[test]
    fn repayment_method_aliases() {
        assert_eq!("EFT".parse::<RepaymentMethod>().unwrap(), RepaymentMethod::BankTransfer);
        assert_eq!(
            "Salary Deduction".parse::<RepaymentMethod>().unwrap(),
            RepaymentMethod::SalaryDeduction
        );
    }
}

// APPLICATION MODULE TESTS
#[cfg(test)]
mod application_tests {
    use super::*;

    #[test]
    fn complete_application_validates() {
        let loan = finalise(&complete_application()).unwrap();

        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.terms.total_amount, 1100.0);
        assert_eq!(loan.terms.period_months, 6);
        assert_eq!(loan.repayment_methods, vec![RepaymentMethod::Cash]);
        assert_eq!(loan.terms_accepted.len(), 11);
        assert!(loan.spouse.is_none());
    }

    #[test]
    fn rejects_missing_required_field() {
        let application = complete_application().set_applicant("  ", "Mokoena");
        assert_eq!(
            finalise(&application).unwrap_err(),
            ValidationError::MissingField("firstName")
        );
    }

    #[test]
    fn policy_decides_which_fields_are_required() {
        let application = complete_application().set_contact_number("");
        assert!(finalise(&application).is_err());

        let relaxed = IntakePolicy {
            required_fields: vec![ApplicationField::FirstName],
            ..IntakePolicy::default()
        };
        let loan = application
            .validate_and_finalise(&relaxed, "loan1smoke".into(), TimeStamp::new())
            .unwrap();
        assert_eq!(loan.applicant.contact_number, None);
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let application = complete_application().set_loan_amount("R1000");
        assert!(matches!(
            finalise(&application),
            Err(ValidationError::InvalidNumber { field: "loanAmount", .. })
        ));

        let application = complete_application().set_interest_rate("ten");
        assert!(matches!(
            finalise(&application),
            Err(ValidationError::InvalidNumber { field: "interestRate", .. })
        ));

        let application = complete_application().set_loan_period_months("6.5");
        assert!(matches!(
            finalise(&application),
            Err(ValidationError::InvalidNumber { field: "loanPeriodMonths", .. })
        ));
    }

    #[test]
    fn rejects_non_positive_principal() {
        let application = complete_application().set_loan_amount("0");
        assert!(matches!(
            finalise(&application),
            Err(ValidationError::OutOfRange { field: "loanAmount", .. })
        ));
    }

    #[test]
    fn rejects_incomplete_terms() {
        let application = LoanApplication::new()
            .set_applicant("Thandi", "Mokoena")
            .set_id_number("9001015009087")
            .set_contact_number("0821234567")
            .set_loan_amount("1000")
            .set_interest_rate("10")
            .set_loan_period_months("6")
            .add_repayment_method("cash")
            // duplicates count once
            .accept_terms(["term-1", "term-1", "term-2"]);

        assert_eq!(
            finalise(&application).unwrap_err(),
            ValidationError::TermsIncomplete {
                accepted: 2,
                required: 11
            }
        );
    }

    #[test]
    fn rejects_missing_or_unknown_repayment_method() {
        let application = LoanApplication::new()
            .set_applicant("Thandi", "Mokoena")
            .set_id_number("9001015009087")
            .set_contact_number("0821234567")
            .set_loan_amount("1000")
            .set_interest_rate("10")
            .set_loan_period_months("6")
            .accept_terms((1..=11).map(|i| format!("term-{i}")));
        assert_eq!(
            finalise(&application).unwrap_err(),
            ValidationError::NoRepaymentMethod
        );

        let application = complete_application().add_repayment_method("cheque");
        assert!(matches!(
            finalise(&application),
            Err(ValidationError::UnknownRepaymentMethod(_))
        ));
    }

    #[test]
    fn spouse_required_only_when_married_in_community() {
        let application = complete_application()
            .set_married_in_community(true)
            .set_spouse("Sipho Mokoena", "");
        assert_eq!(
            finalise(&application).unwrap_err(),
            ValidationError::MissingField("spouseIdNumber")
        );

        let application = complete_application()
            .set_married_in_community(false)
            .set_spouse("Sipho Mokoena", "8905055009081");
        assert!(finalise(&application).unwrap().spouse.is_none());
    }

    #[test]
    fn rejects_malformed_dates() {
        let application = complete_application().set_loan_date("01/02/2025");
        assert!(matches!(
            finalise(&application),
            Err(ValidationError::InvalidDate { field: "loanDate", .. })
        ));
    }
}

// IDENTITY MODULE TESTS
#[cfg(test)]
mod identity_tests {
    use super::*;

    fn principal() -> Principal {
        Principal::new("staff-9", "checker9", Role::Checker)
    }

    #[test]
    fn expired_token_is_rejected() {
        let authority = TokenAuthority::new(b"smoke-secret", -300);
        let token = authority.issue(&principal()).unwrap();
        assert!(matches!(authority.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let issuer = TokenAuthority::new(b"smoke-secret", 3600);
        let verifier = TokenAuthority::new(b"other-secret", 3600);
        let token = issuer.issue(&principal()).unwrap();

        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn swapped_claims_are_rejected() {
        let authority = TokenAuthority::new(b"smoke-secret", 3600);
        let checker = authority.issue(&principal()).unwrap();
        let admin = authority
            .issue(&Principal::new("staff-9", "checker9", Role::Admin))
            .unwrap();

        // header and signature of one token around the claims of another
        let checker_parts: Vec<&str> = checker.split('.').collect();
        let admin_parts: Vec<&str> = admin.split('.').collect();
        let forged = format!("{}.{}.{}", checker_parts[0], admin_parts[1], checker_parts[2]);

        assert!(matches!(
            authority.verify(&forged),
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Accountant".parse::<Role>().unwrap(), Role::Accountant);
        assert!(matches!(
            "auditor".parse::<Role>(),
            Err(AuthError::UnknownRole(_))
        ));
    }

    #[test]
    fn authorize_reports_the_denied_action() {
        let err = principal().authorize(Action::Disburse).unwrap_err();
        assert_eq!(err.to_string(), "Role checker is not permitted to disburse loans");
        assert!(principal().authorize(Action::Review).is_ok());
    }
}

// ERROR MODULE TESTS
#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let cases: Vec<(WorkflowError, &str)> = vec![
            (ValidationError::NoRepaymentMethod.into(), "VALIDATION_ERROR"),
            (AuthError::MissingCredential.into(), "UNAUTHORIZED"),
            (WorkflowError::loan_not_found("loan1x"), "NOT_FOUND"),
            (WorkflowError::InvalidState("pending".into()), "INVALID_STATE"),
            (
                WorkflowError::PreconditionFailed {
                    loan_id: "loan1x".into(),
                    expected: LoanStatus::Approved,
                    actual: LoanStatus::Disbursed,
                },
                "PRECONDITION_FAILED",
            ),
            (WorkflowError::StorageUnavailable("timeout".into()), "STORAGE_UNAVAILABLE"),
            (WorkflowError::internal("boom"), "INTERNAL_ERROR"),
        ];

        for (err, code) in cases {
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn precondition_failure_names_both_statuses() {
        let err = WorkflowError::PreconditionFailed {
            loan_id: "loan1x".into(),
            expected: LoanStatus::Approved,
            actual: LoanStatus::Pending,
        };
        assert_eq!(err.to_string(), "Loan loan1x is pending, expected approved");
        assert!(err.is_retryable());
    }
}
