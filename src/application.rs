//! Public loan application intake
use super::error::ValidationError;
use super::loan::{
    Applicant, BankDetails, CalendarDate, Loan, LoanStatus, LoanTerms, NextOfKin,
    RepaymentMethod, Spouse, TimeStamp,
};
use super::utils::non_blank;
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use std::{fmt, str::FromStr};

/// Identity, contact and banking fields a deployment may mark as required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationField {
    FirstName,
    LastName,
    IdNumber,
    ContactNumber,
    PhysicalAddress,
    PostalAddress,
    KinName,
    KinRelationship,
    KinAddress,
    BankName,
    AccountNumber,
    Branch,
    LoanDate,
    PaymentDate,
}

/// Deployment constants applied to every submission.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakePolicy {
    pub required_fields: Vec<ApplicationField>,
    pub required_terms: usize,
}

// Raw form payload. Numbers stay as text until validation, as they arrive from the form.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoanApplication {
    first_name: Option<String>,
    last_name: Option<String>,
    id_number: Option<String>,
    contact_number: Option<String>,
    physical_address: Option<String>,
    postal_address: Option<String>,
    kin_name: Option<String>,
    kin_relationship: Option<String>,
    kin_address: Option<String>,
    #[serde(deserialize_with = "yes_or_bool")]
    married_in_community: bool,
    spouse_name: Option<String>,
    spouse_id_number: Option<String>,
    #[serde(deserialize_with = "number_or_text")]
    loan_amount: Option<String>,
    #[serde(deserialize_with = "number_or_text")]
    interest_rate: Option<String>,
    #[serde(deserialize_with = "number_or_text")]
    loan_period_months: Option<String>,
    loan_date: Option<String>,
    bank_name: Option<String>,
    account_number: Option<String>,
    branch: Option<String>,
    #[serde(alias = "repaymentMethod", deserialize_with = "list_or_csv")]
    repayment_methods: Vec<String>,
    payment_date: Option<String>,
    #[serde(deserialize_with = "list_or_csv")]
    terms_accepted: Vec<String>,
}

impl ApplicationField {
    pub const ALL: [ApplicationField; 14] = [
        ApplicationField::FirstName,
        ApplicationField::LastName,
        ApplicationField::IdNumber,
        ApplicationField::ContactNumber,
        ApplicationField::PhysicalAddress,
        ApplicationField::PostalAddress,
        ApplicationField::KinName,
        ApplicationField::KinRelationship,
        ApplicationField::KinAddress,
        ApplicationField::BankName,
        ApplicationField::AccountNumber,
        ApplicationField::Branch,
        ApplicationField::LoanDate,
        ApplicationField::PaymentDate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ApplicationField::FirstName => "firstName",
            ApplicationField::LastName => "lastName",
            ApplicationField::IdNumber => "idNumber",
            ApplicationField::ContactNumber => "contactNumber",
            ApplicationField::PhysicalAddress => "physicalAddress",
            ApplicationField::PostalAddress => "postalAddress",
            ApplicationField::KinName => "kinName",
            ApplicationField::KinRelationship => "kinRelationship",
            ApplicationField::KinAddress => "kinAddress",
            ApplicationField::BankName => "bankName",
            ApplicationField::AccountNumber => "accountNumber",
            ApplicationField::Branch => "branch",
            ApplicationField::LoanDate => "loanDate",
            ApplicationField::PaymentDate => "paymentDate",
        }
    }

    fn value<'a>(&self, app: &'a LoanApplication) -> Option<&'a str> {
        let value = match self {
            ApplicationField::FirstName => &app.first_name,
            ApplicationField::LastName => &app.last_name,
            ApplicationField::IdNumber => &app.id_number,
            ApplicationField::ContactNumber => &app.contact_number,
            ApplicationField::PhysicalAddress => &app.physical_address,
            ApplicationField::PostalAddress => &app.postal_address,
            ApplicationField::KinName => &app.kin_name,
            ApplicationField::KinRelationship => &app.kin_relationship,
            ApplicationField::KinAddress => &app.kin_address,
            ApplicationField::BankName => &app.bank_name,
            ApplicationField::AccountNumber => &app.account_number,
            ApplicationField::Branch => &app.branch,
            ApplicationField::LoanDate => &app.loan_date,
            ApplicationField::PaymentDate => &app.payment_date,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

impl fmt::Display for ApplicationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ApplicationField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApplicationField::ALL
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownField(s.to_string()))
    }
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            required_fields: vec![
                ApplicationField::FirstName,
                ApplicationField::LastName,
                ApplicationField::IdNumber,
                ApplicationField::ContactNumber,
            ],
            required_terms: 11,
        }
    }
}

impl LoanApplication {
    /// Construct an empty application, the basis for a submission
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_applicant(mut self, first_name: &str, last_name: &str) -> Self {
        self.first_name = Some(first_name.to_string());
        self.last_name = Some(last_name.to_string());
        self
    }
    pub fn set_id_number(mut self, id_number: &str) -> Self {
        self.id_number = Some(id_number.to_string());
        self
    }
    pub fn set_contact_number(mut self, contact_number: &str) -> Self {
        self.contact_number = Some(contact_number.to_string());
        self
    }
    pub fn set_addresses(mut self, physical: &str, postal: &str) -> Self {
        self.physical_address = Some(physical.to_string());
        self.postal_address = Some(postal.to_string());
        self
    }
    pub fn set_next_of_kin(mut self, name: &str, relationship: &str, address: &str) -> Self {
        self.kin_name = Some(name.to_string());
        self.kin_relationship = Some(relationship.to_string());
        self.kin_address = Some(address.to_string());
        self
    }
    pub fn set_married_in_community(mut self, married: bool) -> Self {
        self.married_in_community = married;
        self
    }
    pub fn set_spouse(mut self, name: &str, id_number: &str) -> Self {
        self.spouse_name = Some(name.to_string());
        self.spouse_id_number = Some(id_number.to_string());
        self
    }
    pub fn set_loan_amount(mut self, amount: &str) -> Self {
        self.loan_amount = Some(amount.to_string());
        self
    }
    pub fn set_interest_rate(mut self, rate: &str) -> Self {
        self.interest_rate = Some(rate.to_string());
        self
    }
    pub fn set_loan_period_months(mut self, months: &str) -> Self {
        self.loan_period_months = Some(months.to_string());
        self
    }
    pub fn set_loan_date(mut self, date: &str) -> Self {
        self.loan_date = Some(date.to_string());
        self
    }
    pub fn set_bank(mut self, bank_name: &str, account_number: &str, branch: &str) -> Self {
        self.bank_name = Some(bank_name.to_string());
        self.account_number = Some(account_number.to_string());
        self.branch = Some(branch.to_string());
        self
    }
    pub fn add_repayment_method(mut self, method: &str) -> Self {
        self.repayment_methods.push(method.to_string());
        self
    }
    pub fn set_payment_date(mut self, date: &str) -> Self {
        self.payment_date = Some(date.to_string());
        self
    }
    pub fn accept_terms<I, T>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.terms_accepted.extend(terms.into_iter().map(Into::into));
        self
    }

    // Checks fields against the policy, computes the total and returns a fresh pending loan
    pub fn validate_and_finalise(
        &self,
        policy: &IntakePolicy,
        loan_id: String,
        now: TimeStamp<Utc>,
    ) -> Result<Loan, ValidationError> {
        for field in &policy.required_fields {
            if field.value(self).is_none() {
                return Err(ValidationError::MissingField(field.name()));
            }
        }

        let loan_amount = parse_float("loanAmount", self.loan_amount.as_deref())?;
        if loan_amount <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "loanAmount",
                value: loan_amount.to_string(),
            });
        }
        let interest_rate = parse_float("interestRate", self.interest_rate.as_deref())?;
        if interest_rate < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "interestRate",
                value: interest_rate.to_string(),
            });
        }
        let period_months = parse_months(self.loan_period_months.as_deref())?;

        let loan_date = parse_optional_date("loanDate", self.loan_date.as_deref())?;
        let payment_date = parse_optional_date("paymentDate", self.payment_date.as_deref())?;

        let mut repayment_methods = Vec::new();
        for raw in self.repayment_methods.iter().filter(|m| !m.trim().is_empty()) {
            let method: RepaymentMethod = raw.parse()?;
            if !repayment_methods.contains(&method) {
                repayment_methods.push(method);
            }
        }
        if repayment_methods.is_empty() {
            return Err(ValidationError::NoRepaymentMethod);
        }

        let mut terms_accepted: Vec<String> = Vec::new();
        for term in self.terms_accepted.iter().map(|t| t.trim()) {
            if !term.is_empty() && !terms_accepted.iter().any(|t| t == term) {
                terms_accepted.push(term.to_string());
            }
        }
        if terms_accepted.len() < policy.required_terms {
            return Err(ValidationError::TermsIncomplete {
                accepted: terms_accepted.len(),
                required: policy.required_terms,
            });
        }

        let spouse = if self.married_in_community {
            let name = non_blank(self.spouse_name.clone())
                .ok_or(ValidationError::MissingField("spouseName"))?;
            let id_number = non_blank(self.spouse_id_number.clone())
                .ok_or(ValidationError::MissingField("spouseIdNumber"))?;
            Some(Spouse { name, id_number })
        } else {
            None
        };

        Ok(Loan {
            loan_id,
            applicant: Applicant {
                first_name: non_blank(self.first_name.clone()),
                last_name: non_blank(self.last_name.clone()),
                id_number: non_blank(self.id_number.clone()),
                contact_number: non_blank(self.contact_number.clone()),
                physical_address: non_blank(self.physical_address.clone()),
                postal_address: non_blank(self.postal_address.clone()),
            },
            next_of_kin: NextOfKin {
                name: non_blank(self.kin_name.clone()),
                relationship: non_blank(self.kin_relationship.clone()),
                address: non_blank(self.kin_address.clone()),
            },
            spouse,
            terms: LoanTerms {
                loan_amount,
                interest_rate,
                total_amount: total_amount(loan_amount, interest_rate),
                period_months,
                loan_date,
            },
            bank: BankDetails {
                bank_name: non_blank(self.bank_name.clone()),
                account_number: non_blank(self.account_number.clone()),
                branch: non_blank(self.branch.clone()),
            },
            repayment_methods,
            payment_date,
            terms_accepted,
            status: LoanStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
            review: None,
            disbursement: None,
        })
    }
}

/// Principal plus simple interest over the whole period, rate in percent.
pub fn total_amount(principal: f64, rate: f64) -> f64 {
    principal + principal * rate / 100.0
}

pub(crate) fn parse_float(field: &'static str, value: Option<&str>) -> Result<f64, ValidationError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))?;

    match raw.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(ValidationError::InvalidNumber {
            field,
            value: raw.to_string(),
        }),
    }
}

fn parse_months(value: Option<&str>) -> Result<u32, ValidationError> {
    let field = "loanPeriodMonths";
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingField(field))?;

    let months = raw.parse::<u32>().map_err(|_| ValidationError::InvalidNumber {
        field,
        value: raw.to_string(),
    })?;
    if months == 0 {
        return Err(ValidationError::OutOfRange {
            field,
            value: raw.to_string(),
        });
    }
    Ok(months)
}

fn parse_optional_date(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<CalendarDate>, ValidationError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => CalendarDate::parse(field, raw).map(Some),
        None => Ok(None),
    }
}

// the form posts "Yes"/"No", programmatic callers send booleans, null reads as "No"
fn yes_or_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(flag)) => flag,
        Some(Flag::Text(text)) => text.trim().eq_ignore_ascii_case("yes"),
        None => false,
    })
}

pub(crate) fn number_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(serde_json::Number),
        Text(String),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Number(number) => number.to_string(),
        Raw::Text(text) => text,
    }))
}

fn list_or_csv<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::List(items)) => items,
        // the form sends a JSON-encoded array as a string
        Some(Raw::Csv(text)) if text.trim_start().starts_with('[') => {
            serde_json::from_str(text.trim()).map_err(serde::de::Error::custom)?
        }
        Some(Raw::Csv(text)) => text.split(',').map(|item| item.trim().to_string()).collect(),
        None => Vec::new(),
    })
}
