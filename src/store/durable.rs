//! Durable store on sled
//!
//! Trees:
//! - `loans`: loan_id -> CBOR loan
//! - `loans_by_status`: status tag ++ loan_id -> empty
//! - `repayments`: repayment_id -> CBOR repayment
//! - `repayments_by_loan`: loan_id ++ 0x00 ++ repayment_id -> empty
//!
//! A record and its index entry are always written in the same transaction.
use super::{CasOutcome, Store, StoreError, compare_and_apply};
use crate::loan::{Loan, LoanStatus, LoanTransition};
use crate::repayment::Repayment;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

pub struct SledStore {
    db: sled::Db,
    loans: sled::Tree,
    loans_by_status: sled::Tree,
    repayments: sled::Tree,
    repayments_by_loan: sled::Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_db(sled::open(path)?)
    }

    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            loans: db.open_tree("loans")?,
            loans_by_status: db.open_tree("loans_by_status")?,
            repayments: db.open_tree("repayments")?,
            repayments_by_loan: db.open_tree("repayments_by_loan")?,
            db,
        })
    }

    /// Persist dirty buffers, returns the number of bytes flushed
    pub async fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.db.flush_async().await?)
    }
}

fn status_key(status: LoanStatus, loan_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + loan_id.len());
    key.push(status.tag());
    key.extend_from_slice(loan_id.as_bytes());
    key
}

fn loan_prefix(loan_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(loan_id.len() + 1);
    key.extend_from_slice(loan_id.as_bytes());
    key.push(0);
    key
}

fn encode<T: minicbor::Encode<()>>(record: &T) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(record).map_err(|e| StoreError::Codec(e.to_string()))
}

fn abort(err: impl Into<StoreError>) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err.into())
}

fn settle<T>(result: Result<T, TransactionError<StoreError>>) -> Result<T, StoreError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}

// sled calls block, keep them off the async workers
async fn blocking<T, F>(call: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
}

fn decode_all<T>(tree: &sled::Tree) -> Result<Vec<T>, StoreError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    let mut records = Vec::new();
    for entry in tree.iter() {
        let (_, bytes) = entry?;
        records.push(minicbor::decode(&bytes)?);
    }
    Ok(records)
}

impl Store for SledStore {
    async fn put_loan(&self, loan: Loan) -> Result<(), StoreError> {
        let loans = self.loans.clone();
        let index = self.loans_by_status.clone();

        blocking(move || {
            let bytes = encode(&loan)?;
            settle((&loans, &index).transaction(|(tx_loans, tx_index)| {
                if let Some(previous) = tx_loans.insert(loan.loan_id.as_bytes(), bytes.clone())? {
                    let previous: Loan = minicbor::decode(&previous).map_err(abort)?;
                    tx_index.remove(status_key(previous.status, &previous.loan_id))?;
                }
                tx_index.insert(status_key(loan.status, &loan.loan_id), Vec::new())?;
                Ok(())
            }))
        })
        .await
    }

    async fn get_loan(&self, loan_id: &str) -> Result<Option<Loan>, StoreError> {
        let loans = self.loans.clone();
        let loan_id = loan_id.to_string();

        blocking(move || match loans.get(loan_id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        })
        .await
    }

    async fn loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>, StoreError> {
        let loans = self.loans.clone();
        let index = self.loans_by_status.clone();

        blocking(move || {
            let mut found = Vec::new();
            for entry in index.scan_prefix([status.tag()]) {
                let (key, _) = entry?;
                let Some(bytes) = loans.get(&key[1..])? else {
                    continue;
                };
                let loan: Loan = minicbor::decode(&bytes)?;
                // the record may have moved on since the index entry was read
                if loan.status == status {
                    found.push(loan);
                }
            }
            Ok(found)
        })
        .await
    }

    async fn scan_loans(&self) -> Result<Vec<Loan>, StoreError> {
        let loans = self.loans.clone();
        blocking(move || decode_all(&loans)).await
    }

    async fn update_loan_if(
        &self,
        loan_id: &str,
        expected: LoanStatus,
        transition: LoanTransition,
    ) -> Result<CasOutcome, StoreError> {
        let loans = self.loans.clone();
        let index = self.loans_by_status.clone();
        let loan_id = loan_id.to_string();

        blocking(move || {
            settle((&loans, &index).transaction(|(tx_loans, tx_index)| {
                let Some(bytes) = tx_loans.get(loan_id.as_bytes())? else {
                    return Ok(CasOutcome::Missing);
                };
                let mut loan: Loan = minicbor::decode(&bytes).map_err(abort)?;

                if let Some(actual) = compare_and_apply(&mut loan, expected, &transition) {
                    return Ok(CasOutcome::Mismatch { actual });
                }

                let updated = encode(&loan).map_err(abort)?;
                tx_index.remove(status_key(expected, &loan_id))?;
                tx_index.insert(status_key(loan.status, &loan_id), Vec::new())?;
                tx_loans.insert(loan_id.as_bytes(), updated)?;

                Ok(CasOutcome::Applied(loan))
            }))
        })
        .await
    }

    async fn put_repayment(&self, repayment: Repayment) -> Result<(), StoreError> {
        let repayments = self.repayments.clone();
        let index = self.repayments_by_loan.clone();

        blocking(move || {
            let bytes = encode(&repayment)?;
            let mut index_key = loan_prefix(&repayment.loan_id);
            index_key.extend_from_slice(repayment.repayment_id.as_bytes());

            settle((&repayments, &index).transaction(|(tx_repayments, tx_index)| {
                tx_repayments.insert(repayment.repayment_id.as_bytes(), bytes.clone())?;
                tx_index.insert(index_key.clone(), Vec::new())?;
                Ok(())
            }))
        })
        .await
    }

    async fn repayments_for_loan(&self, loan_id: &str) -> Result<Vec<Repayment>, StoreError> {
        let repayments = self.repayments.clone();
        let index = self.repayments_by_loan.clone();
        let prefix = loan_prefix(loan_id);

        blocking(move || {
            let mut found = Vec::new();
            for entry in index.scan_prefix(&prefix) {
                let (key, _) = entry?;
                if let Some(bytes) = repayments.get(&key[prefix.len()..])? {
                    found.push(minicbor::decode(&bytes)?);
                }
            }
            Ok(found)
        })
        .await
    }

    async fn scan_repayments(&self) -> Result<Vec<Repayment>, StoreError> {
        let repayments = self.repayments.clone();
        blocking(move || decode_all(&repayments)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_keys_group_by_prefix() {
        let pending = status_key(LoanStatus::Pending, "loan1abc");
        let approved = status_key(LoanStatus::Approved, "loan1abc");

        assert_eq!(pending[0], 0);
        assert_eq!(approved[0], 1);
        assert_eq!(&pending[1..], b"loan1abc");
        assert_eq!(loan_prefix("loan1abc").last(), Some(&0));
    }
}
