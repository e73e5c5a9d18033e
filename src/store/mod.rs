//! Storage port for loan and repayment records
//!
//! Both realizations honour the same contract, including the atomicity of
//! [`Store::update_loan_if`]: the status check and the write happen as one
//! step, so two racing transitions on one loan can never both apply.

mod durable;
mod memory;

pub use durable::SledStore;
pub use memory::MemoryStore;

use super::loan::{Loan, LoanStatus, LoanTransition};
use super::repayment::Repayment;
use std::future::Future;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Store call exceeded {0:?}")]
    Timeout(Duration),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Stored record could not be decoded: {0}")]
    Codec(String),
}

/// Result of a conditional update
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    Applied(Loan),
    Missing,
    Mismatch { actual: LoanStatus },
}

pub trait Store: Send + Sync + 'static {
    /// Insert or replace a loan record.
    fn put_loan(&self, loan: Loan) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_loan(
        &self,
        loan_id: &str,
    ) -> impl Future<Output = Result<Option<Loan>, StoreError>> + Send;

    fn loans_by_status(
        &self,
        status: LoanStatus,
    ) -> impl Future<Output = Result<Vec<Loan>, StoreError>> + Send;

    fn scan_loans(&self) -> impl Future<Output = Result<Vec<Loan>, StoreError>> + Send;

    /// Apply `transition` only if the stored loan currently has `expected` status.
    fn update_loan_if(
        &self,
        loan_id: &str,
        expected: LoanStatus,
        transition: LoanTransition,
    ) -> impl Future<Output = Result<CasOutcome, StoreError>> + Send;

    fn put_repayment(
        &self,
        repayment: Repayment,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn repayments_for_loan(
        &self,
        loan_id: &str,
    ) -> impl Future<Output = Result<Vec<Repayment>, StoreError>> + Send;

    fn scan_repayments(&self) -> impl Future<Output = Result<Vec<Repayment>, StoreError>> + Send;
}

/// Runs one store call under a deadline. Elapsed calls fail, they are not retried.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(?limit, "Store call timed out");
            Err(StoreError::Timeout(limit))
        }
    }
}

// shared by both realizations so the condition is evaluated identically
pub(crate) fn compare_and_apply(
    loan: &mut Loan,
    expected: LoanStatus,
    transition: &LoanTransition,
) -> Option<LoanStatus> {
    if loan.status != expected {
        return Some(loan.status);
    }
    transition.apply(loan);
    None
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<minicbor::decode::Error> for StoreError {
    fn from(err: minicbor::decode::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}
