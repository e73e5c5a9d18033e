//! Loan lifecycle: intake, review and disbursement
use super::application::{IntakePolicy, LoanApplication};
use super::error::{ValidationError, WorkflowError};
use super::identity::{Action, Principal};
use super::loan::{DisbursementRecord, Loan, LoanStatus, LoanTransition, ReviewDecision, ReviewRecord, TimeStamp};
use super::report::LoanStats;
use super::store::{CasOutcome, Store, bounded};
use super::utils::{LOAN_HRP, new_uuid_to_bech32, non_blank};
use std::sync::Arc;
use std::time::Duration;

pub struct LoanService<S: Store> {
    store: Arc<S>,
    policy: IntakePolicy,
    store_timeout: Duration,
}

/// Narrows a loan listing. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanFilter {
    pub status: Option<LoanStatus>,
    pub search: Option<String>,
    /// Caps the returned records, applied after filtering and ordering
    pub limit: Option<usize>,
}

impl<S: Store> LoanService<S> {
    pub fn new(store: Arc<S>, policy: IntakePolicy, store_timeout: Duration) -> Self {
        Self {
            store,
            policy,
            store_timeout,
        }
    }

    /// Public intake, no principal needed. Returns the new loan id.
    pub async fn submit(&self, application: &LoanApplication) -> Result<String, WorkflowError> {
        let loan_id = new_uuid_to_bech32(LOAN_HRP).map_err(WorkflowError::internal)?;
        let loan = application.validate_and_finalise(&self.policy, loan_id, TimeStamp::new())?;
        let (loan_id, total_amount) = (loan.loan_id.clone(), loan.terms.total_amount);

        bounded(self.store_timeout, self.store.put_loan(loan)).await?;

        tracing::info!(%loan_id, total_amount, "Loan application submitted");
        Ok(loan_id)
    }

    /// Newest first by creation time
    pub async fn list(&self, filter: &LoanFilter) -> Result<Vec<Loan>, WorkflowError> {
        let mut loans = match filter.status {
            Some(status) => bounded(self.store_timeout, self.store.loans_by_status(status)).await?,
            None => bounded(self.store_timeout, self.store.scan_loans()).await?,
        };

        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            loans.retain(|loan| loan.matches_search(term));
        }
        loans.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.loan_id.cmp(&a.loan_id))
        });
        if let Some(limit) = filter.limit {
            loans.truncate(limit);
        }

        Ok(loans)
    }

    pub async fn get(&self, loan_id: &str) -> Result<Loan, WorkflowError> {
        bounded(self.store_timeout, self.store.get_loan(loan_id))
            .await?
            .ok_or_else(|| WorkflowError::loan_not_found(loan_id))
    }

    /// Approve or reject a pending loan
    pub async fn review(
        &self,
        principal: &Principal,
        loan_id: &str,
        decision: ReviewDecision,
        comments: Option<String>,
    ) -> Result<Loan, WorkflowError> {
        principal.authorize(Action::Review)?;

        let transition = LoanTransition::Review {
            decision,
            record: ReviewRecord {
                checked_by: principal.id.clone(),
                checked_at: TimeStamp::new(),
                checker_comments: non_blank(comments),
            },
        };
        let loan = self.transition(loan_id, transition).await?;

        tracing::info!(
            %loan_id,
            checked_by = %principal.id,
            status = %loan.status,
            "Loan reviewed"
        );
        Ok(loan)
    }

    /// Release funds for an approved loan
    pub async fn disburse(
        &self,
        principal: &Principal,
        loan_id: &str,
        reference: &str,
    ) -> Result<Loan, WorkflowError> {
        principal.authorize(Action::Disburse)?;

        let reference = non_blank(Some(reference.to_string()))
            .ok_or(ValidationError::MissingField("referenceNumber"))?;
        let transition = LoanTransition::Disburse(DisbursementRecord {
            disbursed_by: principal.id.clone(),
            disbursed_at: TimeStamp::new(),
            disbursement_reference: reference,
        });
        let loan = self.transition(loan_id, transition).await?;

        tracing::info!(%loan_id, disbursed_by = %principal.id, "Loan disbursed");
        Ok(loan)
    }

    pub async fn stats(&self) -> Result<LoanStats, WorkflowError> {
        let loans = bounded(self.store_timeout, self.store.scan_loans()).await?;
        Ok(LoanStats::fold(&loans))
    }

    // the status check and the write are a single conditional store call
    async fn transition(
        &self,
        loan_id: &str,
        transition: LoanTransition,
    ) -> Result<Loan, WorkflowError> {
        let expected = transition.expected_status();
        let outcome = bounded(
            self.store_timeout,
            self.store.update_loan_if(loan_id, expected, transition),
        )
        .await?;

        match outcome {
            CasOutcome::Applied(loan) => Ok(loan),
            CasOutcome::Missing => Err(WorkflowError::loan_not_found(loan_id)),
            CasOutcome::Mismatch { actual } => {
                tracing::warn!(%loan_id, %expected, %actual, "Loan transition precondition failed");
                Err(WorkflowError::PreconditionFailed {
                    loan_id: loan_id.to_string(),
                    expected,
                    actual,
                })
            }
        }
    }
}
