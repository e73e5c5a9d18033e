//! Summary figures folded over the current record set
use super::loan::{Loan, LoanStatus};
use super::repayment::Repayment;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoanStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub disbursed: usize,
    /// Sum of `totalAmount` across every status
    pub total_amount: f64,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepaymentStats {
    /// Sum of `totalAmount` over disbursed loans only
    pub total_loaned: f64,
    /// Sum of every recorded repayment
    pub total_collected: f64,
    pub outstanding_balance: f64,
    pub active_loan_count: usize,
}

/// Running balance of one loan. Overpayment shows up as a negative balance.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoanBalance {
    pub loan_amount: f64,
    pub total_paid: f64,
    pub balance: f64,
}

impl LoanStats {
    pub fn fold<'a>(loans: impl IntoIterator<Item = &'a Loan>) -> Self {
        loans.into_iter().fold(Self::default(), |mut stats, loan| {
            stats.total += 1;
            stats.total_amount += loan.terms.total_amount;
            match loan.status {
                LoanStatus::Pending => stats.pending += 1,
                LoanStatus::Approved => stats.approved += 1,
                LoanStatus::Rejected => stats.rejected += 1,
                LoanStatus::Disbursed => stats.disbursed += 1,
            }
            stats
        })
    }
}

impl RepaymentStats {
    pub fn fold(loans: &[Loan], repayments: &[Repayment]) -> Self {
        let disbursed: HashSet<&str> = loans
            .iter()
            .filter(|loan| loan.status == LoanStatus::Disbursed)
            .map(|loan| loan.loan_id.as_str())
            .collect();

        let total_loaned: f64 = loans
            .iter()
            .filter(|loan| disbursed.contains(loan.loan_id.as_str()))
            .map(|loan| loan.terms.total_amount)
            .sum();
        let total_collected: f64 = repayments.iter().map(|r| r.amount_paid).sum();

        let outside = repayments
            .iter()
            .filter(|r| !disbursed.contains(r.loan_id.as_str()))
            .count();
        if outside > 0 {
            tracing::warn!(
                repayments = outside,
                "Repayments reference loans that are not disbursed, collected total includes them"
            );
        }

        Self {
            total_loaned,
            total_collected,
            outstanding_balance: total_loaned - total_collected,
            active_loan_count: disbursed.len(),
        }
    }
}

impl LoanBalance {
    /// Only repayments referencing `loan` are counted
    pub fn for_loan<'a>(loan: &Loan, repayments: impl IntoIterator<Item = &'a Repayment>) -> Self {
        let total_paid: f64 = repayments
            .into_iter()
            .filter(|r| r.loan_id == loan.loan_id)
            .map(|r| r.amount_paid)
            .sum();

        Self {
            loan_amount: loan.terms.total_amount,
            total_paid,
            balance: loan.terms.total_amount - total_paid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::{CalendarDate, LoanTerms, TimeStamp};

    fn loan(id: &str, total: f64, status: LoanStatus) -> Loan {
        Loan {
            loan_id: id.to_string(),
            applicant: Default::default(),
            next_of_kin: Default::default(),
            spouse: None,
            terms: LoanTerms {
                loan_amount: total,
                interest_rate: 0.0,
                total_amount: total,
                period_months: 12,
                loan_date: None,
            },
            bank: Default::default(),
            repayment_methods: vec![],
            payment_date: None,
            terms_accepted: vec![],
            status,
            created_at: TimeStamp::new(),
            updated_at: TimeStamp::new(),
            review: None,
            disbursement: None,
        }
    }

    fn repayment(loan_id: &str, amount: f64) -> Repayment {
        Repayment {
            repayment_id: format!("r-{loan_id}-{amount}"),
            loan_id: loan_id.to_string(),
            payment_date: CalendarDate::parse("paymentDate", "2025-03-01").unwrap(),
            amount_paid: amount,
            payment_method: None,
            reference_number: None,
            notes: None,
            recorded_by: "acct".into(),
            created_at: TimeStamp::new(),
        }
    }

    #[test]
    fn loan_stats_count_every_status() {
        let loans = [
            loan("a", 1000.0, LoanStatus::Pending),
            loan("b", 2000.0, LoanStatus::Disbursed),
            loan("c", 500.0, LoanStatus::Rejected),
        ];
        let stats = LoanStats::fold(&loans);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.disbursed, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.approved, 0);
        assert_eq!(stats.total_amount, 3500.0);
    }

    #[test]
    fn repayment_stats_scope_loaned_to_disbursed() {
        let loans = [
            loan("a", 1000.0, LoanStatus::Pending),
            loan("b", 2000.0, LoanStatus::Disbursed),
        ];
        let repayments = [repayment("b", 250.0), repayment("b", 250.0)];
        let stats = RepaymentStats::fold(&loans, &repayments);

        assert_eq!(stats.total_loaned, 2000.0);
        assert_eq!(stats.total_collected, 500.0);
        assert_eq!(stats.outstanding_balance, 1500.0);
        assert_eq!(stats.active_loan_count, 1);
    }

    #[test]
    fn collected_includes_repayments_outside_disbursed_loans() {
        let loans = [loan("a", 1000.0, LoanStatus::Approved)];
        let stats = RepaymentStats::fold(&loans, &[repayment("a", 100.0)]);

        assert_eq!(stats.total_loaned, 0.0);
        assert_eq!(stats.total_collected, 100.0);
        assert_eq!(stats.outstanding_balance, -100.0);
    }

    #[test]
    fn balance_goes_negative_on_overpayment() {
        let target = loan("a", 1100.0, LoanStatus::Disbursed);
        let repayments = [repayment("a", 1000.0), repayment("a", 200.0), repayment("z", 50.0)];
        let balance = LoanBalance::for_loan(&target, &repayments);

        assert_eq!(balance.total_paid, 1200.0);
        assert!((balance.balance + 100.0).abs() < 1e-9);
    }
}
