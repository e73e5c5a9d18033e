//! Volatile store, records live for the lifetime of the instance
use super::{CasOutcome, Store, StoreError, compare_and_apply};
use crate::loan::{Loan, LoanStatus, LoanTransition};
use crate::repayment::Repayment;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    loans: HashMap<String, Loan>,
    repayments: Vec<Repayment>, // in insertion order
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    async fn put_loan(&self, loan: Loan) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.loans.insert(loan.loan_id.clone(), loan);
        Ok(())
    }

    async fn get_loan(&self, loan_id: &str) -> Result<Option<Loan>, StoreError> {
        Ok(self.tables.read().await.loans.get(loan_id).cloned())
    }

    async fn loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .loans
            .values()
            .filter(|loan| loan.status == status)
            .cloned()
            .collect())
    }

    async fn scan_loans(&self) -> Result<Vec<Loan>, StoreError> {
        Ok(self.tables.read().await.loans.values().cloned().collect())
    }

    async fn update_loan_if(
        &self,
        loan_id: &str,
        expected: LoanStatus,
        transition: LoanTransition,
    ) -> Result<CasOutcome, StoreError> {
        // one write guard spans the check and the write
        let mut tables = self.tables.write().await;
        let Some(loan) = tables.loans.get_mut(loan_id) else {
            return Ok(CasOutcome::Missing);
        };

        match compare_and_apply(loan, expected, &transition) {
            Some(actual) => Ok(CasOutcome::Mismatch { actual }),
            None => Ok(CasOutcome::Applied(loan.clone())),
        }
    }

    async fn put_repayment(&self, repayment: Repayment) -> Result<(), StoreError> {
        self.tables.write().await.repayments.push(repayment);
        Ok(())
    }

    async fn repayments_for_loan(&self, loan_id: &str) -> Result<Vec<Repayment>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .repayments
            .iter()
            .filter(|repayment| repayment.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn scan_repayments(&self) -> Result<Vec<Repayment>, StoreError> {
        Ok(self.tables.read().await.repayments.clone())
    }
}
