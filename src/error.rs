//! Error taxonomy shared by the lifecycle engine, the ledger and the operation surface
use super::identity::{Action, AuthError, Role};
use super::loan::LoanStatus;
use super::store::StoreError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
    #[error("{field} is not a valid date (expected YYYY-MM-DD): {value:?}")]
    InvalidDate { field: &'static str, value: String },
    #[error("At least one repayment method must be selected")]
    NoRepaymentMethod,
    #[error("Unknown repayment method: {0:?}")]
    UnknownRepaymentMethod(String),
    #[error("All terms must be accepted ({accepted} of {required})")]
    TermsIncomplete { accepted: usize, required: usize },
    #[error("Unknown review action: {0:?}")]
    UnknownAction(String),
    #[error("Unknown loan status: {0:?}")]
    UnknownStatus(String),
    #[error("Unknown application field: {0:?}")]
    UnknownField(String),
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
    #[error("Role {role} is not permitted to {action}")]
    Forbidden { role: Role, action: Action },
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Loan {loan_id} is {actual}, expected {expected}")]
    PreconditionFailed {
        loan_id: String,
        expected: LoanStatus,
        actual: LoanStatus,
    },
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn loan_not_found(loan_id: &str) -> Self {
        WorkflowError::NotFound {
            kind: "Loan",
            id: loan_id.to_string(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        WorkflowError::Internal(err.to_string())
    }

    /// Stable code a transport can map onto its own status values
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "VALIDATION_ERROR",
            WorkflowError::Unauthorized(_) => "UNAUTHORIZED",
            WorkflowError::Forbidden { .. } => "FORBIDDEN",
            WorkflowError::NotFound { .. } => "NOT_FOUND",
            WorkflowError::InvalidState(_) => "INVALID_STATE",
            WorkflowError::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            WorkflowError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            WorkflowError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Lost races and transient storage faults may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::PreconditionFailed { .. } | WorkflowError::StorageUnavailable(_)
        )
    }

    /// Internal faults are reported generically, everything else verbatim.
    pub fn public_message(&self) -> String {
        match self {
            WorkflowError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout(_) | StoreError::Unavailable(_) => {
                WorkflowError::StorageUnavailable(err.to_string())
            }
            StoreError::Codec(_) => WorkflowError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn store_faults_map_to_transient_errors() {
        let err: WorkflowError = StoreError::Timeout(Duration::from_millis(5)).into();
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
        assert!(err.is_retryable());

        let err: WorkflowError = StoreError::Codec("truncated".into()).into();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(!err.is_retryable());
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = WorkflowError::internal("tree poisoned at offset 42");
        assert_eq!(err.public_message(), "Internal error");

        let err = WorkflowError::loan_not_found("loan1abc");
        assert_eq!(err.public_message(), "Loan loan1abc not found");
    }

    #[test]
    fn forbidden_is_final() {
        let err = WorkflowError::Forbidden {
            role: Role::Maker,
            action: Action::Disburse,
        };
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(!err.is_retryable());
    }
}
