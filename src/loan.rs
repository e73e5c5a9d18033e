//! Loan record, workflow status and the transitions between them
use super::error::ValidationError;
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use std::{fmt, str::FromStr};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

/// A calendar day as entered on a form, no time of day attached.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct CalendarDate(NaiveDate);

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    serde::Serialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Disbursed,
}

#[derive(
    minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentMethod {
    #[n(0)]
    DebitOrder,
    #[n(1)]
    BankTransfer,
    #[n(2)]
    Cash,
    #[n(3)]
    SalaryDeduction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    #[n(0)]
    pub first_name: Option<String>,
    #[n(1)]
    pub last_name: Option<String>,
    #[n(2)]
    pub id_number: Option<String>,
    #[n(3)]
    pub contact_number: Option<String>,
    #[n(4)]
    pub physical_address: Option<String>,
    #[n(5)]
    pub postal_address: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NextOfKin {
    #[n(0)]
    pub name: Option<String>,
    #[n(1)]
    pub relationship: Option<String>,
    #[n(2)]
    pub address: Option<String>,
}

// only recorded when the applicant is married in community of property
#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Spouse {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub id_number: String,
}

#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoanTerms {
    #[n(0)]
    pub loan_amount: f64,
    #[n(1)]
    pub interest_rate: f64, // percent
    #[n(2)]
    pub total_amount: f64,
    #[n(3)]
    pub period_months: u32,
    #[n(4)]
    pub loan_date: Option<CalendarDate>,
}

#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    #[n(0)]
    pub bank_name: Option<String>,
    #[n(1)]
    pub account_number: Option<String>,
    #[n(2)]
    pub branch: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    #[n(0)]
    pub checked_by: String,
    #[n(1)]
    pub checked_at: TimeStamp<Utc>,
    #[n(2)]
    pub checker_comments: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementRecord {
    #[n(0)]
    pub disbursed_by: String,
    #[n(1)]
    pub disbursed_at: TimeStamp<Utc>,
    #[n(2)]
    pub disbursement_reference: String,
}

// Key in the loans tree is `loan_id`
#[derive(minicbor::Encode, minicbor::Decode, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    #[n(0)]
    pub loan_id: String, // bech32 encoded uuid7, never reused
    #[n(1)]
    pub applicant: Applicant,
    #[n(2)]
    pub next_of_kin: NextOfKin,
    #[n(3)]
    pub spouse: Option<Spouse>,
    #[n(4)]
    pub terms: LoanTerms,
    #[n(5)]
    pub bank: BankDetails,
    #[n(6)]
    pub repayment_methods: Vec<RepaymentMethod>,
    #[n(7)]
    pub payment_date: Option<CalendarDate>,
    #[n(8)]
    pub terms_accepted: Vec<String>,
    #[n(9)]
    pub status: LoanStatus,
    #[n(10)]
    pub created_at: TimeStamp<Utc>,
    #[n(11)]
    pub updated_at: TimeStamp<Utc>,
    #[n(12)]
    pub review: Option<ReviewRecord>,
    #[n(13)]
    pub disbursement: Option<DisbursementRecord>,
}

/// The two workflow mutations a loan can undergo after intake.
#[derive(Debug, Clone, PartialEq)]
pub enum LoanTransition {
    Review {
        decision: ReviewDecision,
        record: ReviewRecord,
    },
    Disburse(DisbursementRecord),
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(TimeStamp)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

// chrono's Utc is not Ord, so order by the instant itself
impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl CalendarDate {
    pub fn parse(field: &'static str, value: &str) -> Result<Self, ValidationError> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map(CalendarDate)
            .map_err(|_| ValidationError::InvalidDate {
                field,
                value: value.to_string(),
            })
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(value: NaiveDate) -> Self {
        CalendarDate(value)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 4] = [
        LoanStatus::Pending,
        LoanStatus::Approved,
        LoanStatus::Rejected,
        LoanStatus::Disbursed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Disbursed => "disbursed",
        }
    }

    /// Single byte prefix for the status index.
    pub fn tag(&self) -> u8 {
        match self {
            LoanStatus::Pending => 0,
            LoanStatus::Approved => 1,
            LoanStatus::Rejected => 2,
            LoanStatus::Disbursed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::Disbursed)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LoanStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownStatus(s.to_string()))
    }
}

impl RepaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepaymentMethod::DebitOrder => "debit_order",
            RepaymentMethod::BankTransfer => "bank_transfer",
            RepaymentMethod::Cash => "cash",
            RepaymentMethod::SalaryDeduction => "salary_deduction",
        }
    }
}

impl FromStr for RepaymentMethod {
    type Err = ValidationError;

    // accepts "debit_order", "Debit Order", "debit-order" and the like
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "debitorder" => Ok(RepaymentMethod::DebitOrder),
            "banktransfer" | "eft" => Ok(RepaymentMethod::BankTransfer),
            "cash" => Ok(RepaymentMethod::Cash),
            "salarydeduction" => Ok(RepaymentMethod::SalaryDeduction),
            _ => Err(ValidationError::UnknownRepaymentMethod(s.to_string())),
        }
    }
}

impl ReviewDecision {
    pub fn resulting_status(&self) -> LoanStatus {
        match self {
            ReviewDecision::Approve => LoanStatus::Approved,
            ReviewDecision::Reject => LoanStatus::Rejected,
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(ReviewDecision::Approve),
            "reject" => Ok(ReviewDecision::Reject),
            _ => Err(ValidationError::UnknownAction(s.to_string())),
        }
    }
}

impl LoanTransition {
    /// Status the loan must hold for the transition to apply
    pub fn expected_status(&self) -> LoanStatus {
        match self {
            LoanTransition::Review { .. } => LoanStatus::Pending,
            LoanTransition::Disburse(_) => LoanStatus::Approved,
        }
    }

    pub fn resulting_status(&self) -> LoanStatus {
        match self {
            LoanTransition::Review { decision, .. } => decision.resulting_status(),
            LoanTransition::Disburse(_) => LoanStatus::Disbursed,
        }
    }

    /// Writes the new status, its audit record and `updated_at`.
    /// The caller is responsible for checking `expected_status` first.
    pub fn apply(&self, loan: &mut Loan) {
        loan.status = self.resulting_status();
        match self {
            LoanTransition::Review { record, .. } => {
                loan.updated_at = record.checked_at.clone();
                loan.review = Some(record.clone());
            }
            LoanTransition::Disburse(record) => {
                loan.updated_at = record.disbursed_at.clone();
                loan.disbursement = Some(record.clone());
            }
        }
    }
}

impl Loan {
    /// Names match case-insensitively; ID and contact numbers match as typed.
    pub fn matches_search(&self, term: &str) -> bool {
        let lowered = term.to_lowercase();
        let name_hit = |name: &Option<String>| {
            name.as_deref()
                .is_some_and(|n| n.to_lowercase().contains(&lowered))
        };
        let number_hit = |number: &Option<String>| number.as_deref().is_some_and(|n| n.contains(term));

        name_hit(&self.applicant.first_name)
            || name_hit(&self.applicant.last_name)
            || number_hit(&self.applicant.id_number)
            || number_hit(&self.applicant.contact_number)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}
impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
impl serde::Serialize for TimeStamp<Utc> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl<C> minicbor::Encode<C> for CalendarDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(chrono::Datelike::num_days_from_ce(&self.0))?.ok()
    }
}
impl<'b, C> minicbor::Decode<'b, C> for CalendarDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(CalendarDate)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert day count to a calendar date",
            ))
    }
}
impl serde::Serialize for CalendarDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
