//! Inbound operation surface
//!
//! [`LoanDesk`] is what a transport calls into. It resolves the caller's
//! credential into a [`Principal`], dispatches to the lifecycle service or
//! the ledger and logs failures by severity. Submit is the only operation
//! that takes no credential.
use super::application::{IntakePolicy, LoanApplication};
use super::error::{ValidationError, WorkflowError};
use super::identity::{Action, AuthError, CredentialVerifier, Principal};
use super::ledger::{LoanRepayments, RepaymentLedger, RepaymentView};
use super::loan::{Loan, LoanStatus, ReviewDecision};
use super::report::{LoanStats, RepaymentStats};
use super::repayment::PaymentRequest;
use super::service::{LoanFilter, LoanService};
use super::store::Store;
use super::utils::non_blank;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub struct LoanDesk<S: Store, V: CredentialVerifier> {
    loans: LoanService<S>,
    ledger: RepaymentLedger<S>,
    verifier: V,
}

/// Listing parameters as a transport receives them
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoanQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl LoanQuery {
    /// A blank status or `all` lists every status
    pub fn to_filter(&self) -> Result<LoanFilter, ValidationError> {
        let status = match non_blank(self.status.clone()) {
            Some(raw) if raw.eq_ignore_ascii_case("all") => None,
            Some(raw) => Some(raw.parse::<LoanStatus>()?),
            None => None,
        };

        Ok(LoanFilter {
            status,
            search: non_blank(self.search.clone()),
            limit: self.limit,
        })
    }
}

// server side faults at error, caller mistakes at debug
fn observe<T>(operation: &'static str, result: Result<T, WorkflowError>) -> Result<T, WorkflowError> {
    if let Err(err) = &result {
        match err {
            WorkflowError::StorageUnavailable(_) | WorkflowError::Internal(_) => {
                tracing::error!(operation, code = err.code(), error = %err, "Operation failed");
            }
            _ => {
                tracing::debug!(operation, code = err.code(), error = %err, "Operation rejected");
            }
        }
    }
    result
}

impl<S: Store, V: CredentialVerifier> LoanDesk<S, V> {
    pub fn new(store: Arc<S>, verifier: V, policy: IntakePolicy, store_timeout: Duration) -> Self {
        Self {
            loans: LoanService::new(store.clone(), policy, store_timeout),
            ledger: RepaymentLedger::new(store, store_timeout),
            verifier,
        }
    }

    fn resolve(&self, credential: Option<&str>) -> Result<Principal, WorkflowError> {
        let credential = credential.ok_or(AuthError::MissingCredential)?;
        Ok(self.verifier.verify(credential)?)
    }

    pub async fn submit(&self, application: &LoanApplication) -> Result<String, WorkflowError> {
        observe("submit", self.loans.submit(application).await)
    }

    pub async fn list(
        &self,
        credential: Option<&str>,
        query: &LoanQuery,
    ) -> Result<Vec<Loan>, WorkflowError> {
        let result = async {
            self.resolve(credential)?;
            let filter = query.to_filter()?;
            self.loans.list(&filter).await
        };
        observe("list", result.await)
    }

    pub async fn get(&self, credential: Option<&str>, loan_id: &str) -> Result<Loan, WorkflowError> {
        let result = async {
            self.resolve(credential)?;
            self.loans.get(loan_id).await
        };
        observe("get", result.await)
    }

    /// `action` is `approve` or `reject`
    pub async fn review(
        &self,
        credential: Option<&str>,
        loan_id: &str,
        action: &str,
        comments: Option<&str>,
    ) -> Result<Loan, WorkflowError> {
        let result = async {
            let principal = self.resolve(credential)?;
            principal.authorize(Action::Review)?;
            let decision = action.parse::<ReviewDecision>()?;
            self.loans
                .review(&principal, loan_id, decision, comments.map(str::to_string))
                .await
        };
        observe("review", result.await)
    }

    pub async fn disburse(
        &self,
        credential: Option<&str>,
        loan_id: &str,
        reference: &str,
    ) -> Result<Loan, WorkflowError> {
        let result = async {
            let principal = self.resolve(credential)?;
            self.loans.disburse(&principal, loan_id, reference).await
        };
        observe("disburse", result.await)
    }

    pub async fn loan_stats(&self, credential: Option<&str>) -> Result<LoanStats, WorkflowError> {
        let result = async {
            self.resolve(credential)?;
            self.loans.stats().await
        };
        observe("loan_stats", result.await)
    }

    pub async fn record_payment(
        &self,
        credential: Option<&str>,
        request: &PaymentRequest,
    ) -> Result<String, WorkflowError> {
        let result = async {
            let principal = self.resolve(credential)?;
            self.ledger.record_payment(&principal, request).await
        };
        observe("record_payment", result.await)
    }

    pub async fn list_repayments(
        &self,
        credential: Option<&str>,
    ) -> Result<Vec<RepaymentView>, WorkflowError> {
        let result = async {
            self.resolve(credential)?;
            self.ledger.list_all().await
        };
        observe("list_repayments", result.await)
    }

    pub async fn list_repayments_for_loan(
        &self,
        credential: Option<&str>,
        loan_id: &str,
    ) -> Result<LoanRepayments, WorkflowError> {
        let result = async {
            self.resolve(credential)?;
            self.ledger.list_for_loan(loan_id).await
        };
        observe("list_repayments_for_loan", result.await)
    }

    pub async fn repayment_stats(
        &self,
        credential: Option<&str>,
    ) -> Result<RepaymentStats, WorkflowError> {
        let result = async {
            self.resolve(credential)?;
            self.ledger.stats().await
        };
        observe("repayment_stats", result.await)
    }
}
