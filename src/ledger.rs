//! Repayment ledger over disbursed loans
use super::error::WorkflowError;
use super::identity::{Action, Principal};
use super::loan::{Loan, LoanStatus, TimeStamp};
use super::report::{LoanBalance, RepaymentStats};
use super::repayment::{PaymentRequest, Repayment};
use super::store::{Store, bounded};
use super::utils::{REPAYMENT_HRP, new_uuid_to_bech32};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct RepaymentLedger<S: Store> {
    store: Arc<S>,
    store_timeout: Duration,
}

/// A repayment joined with the applicant name of its loan at read time
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepaymentView {
    #[serde(flatten)]
    pub repayment: Repayment,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoanRepayments {
    pub summary: LoanBalance,
    pub repayments: Vec<Repayment>,
}

// newest payment first, ties broken by recording time
fn newest_first(a: &Repayment, b: &Repayment) -> std::cmp::Ordering {
    b.payment_date
        .cmp(&a.payment_date)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

impl<S: Store> RepaymentLedger<S> {
    pub fn new(store: Arc<S>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    async fn load_loan(&self, loan_id: &str) -> Result<Loan, WorkflowError> {
        bounded(self.store_timeout, self.store.get_loan(loan_id))
            .await?
            .ok_or_else(|| WorkflowError::loan_not_found(loan_id))
    }

    /// Records a payment against a disbursed loan. Returns the new repayment id.
    pub async fn record_payment(
        &self,
        principal: &Principal,
        request: &PaymentRequest,
    ) -> Result<String, WorkflowError> {
        principal.authorize(Action::RecordPayment)?;
        let payment = request.validate()?;

        let loan = self.load_loan(&payment.loan_id).await?;
        if loan.status != LoanStatus::Disbursed {
            tracing::warn!(
                loan_id = %loan.loan_id,
                status = %loan.status,
                "Payment refused for loan that is not disbursed"
            );
            return Err(WorkflowError::InvalidState(format!(
                "Loan {} is {}, payments can only be recorded against disbursed loans",
                loan.loan_id, loan.status
            )));
        }

        let repayment_id = new_uuid_to_bech32(REPAYMENT_HRP).map_err(WorkflowError::internal)?;
        let repayment =
            payment.into_repayment(repayment_id.clone(), principal.id.clone(), TimeStamp::new());
        let amount_paid = repayment.amount_paid;

        bounded(self.store_timeout, self.store.put_repayment(repayment)).await?;

        tracing::info!(
            %repayment_id,
            loan_id = %loan.loan_id,
            amount_paid,
            recorded_by = %principal.id,
            "Repayment recorded"
        );
        Ok(repayment_id)
    }

    pub async fn list_all(&self) -> Result<Vec<RepaymentView>, WorkflowError> {
        let mut repayments = bounded(self.store_timeout, self.store.scan_repayments()).await?;
        repayments.sort_by(newest_first);

        // each referenced loan is fetched once
        let mut names: HashMap<String, (Option<String>, Option<String>)> = HashMap::new();
        let mut views = Vec::with_capacity(repayments.len());
        for repayment in repayments {
            if !names.contains_key(&repayment.loan_id) {
                let loan = bounded(self.store_timeout, self.store.get_loan(&repayment.loan_id)).await?;
                let name = loan
                    .map(|loan| (loan.applicant.first_name, loan.applicant.last_name))
                    .unwrap_or_default();
                names.insert(repayment.loan_id.clone(), name);
            }
            let (first_name, last_name) = names
                .get(&repayment.loan_id)
                .cloned()
                .unwrap_or_default();

            views.push(RepaymentView {
                repayment,
                first_name,
                last_name,
            });
        }

        Ok(views)
    }

    pub async fn list_for_loan(&self, loan_id: &str) -> Result<LoanRepayments, WorkflowError> {
        let loan = self.load_loan(loan_id).await?;
        let mut repayments =
            bounded(self.store_timeout, self.store.repayments_for_loan(loan_id)).await?;
        repayments.sort_by(newest_first);

        Ok(LoanRepayments {
            summary: LoanBalance::for_loan(&loan, &repayments),
            repayments,
        })
    }

    pub async fn stats(&self) -> Result<RepaymentStats, WorkflowError> {
        let loans = bounded(self.store_timeout, self.store.scan_loans()).await?;
        let repayments = bounded(self.store_timeout, self.store.scan_repayments()).await?;
        Ok(RepaymentStats::fold(&loans, &repayments))
    }
}
