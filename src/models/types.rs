//! Domain types for loan underwriting
//! Applicants, loans, repayments and gamification state

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of alternative-data features the model consumes
pub const FEATURE_COUNT: usize = 4;

/// Canonical feature order (model input, explanation keys, DB columns)
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "transaction_frequency",
    "avg_transaction_amount",
    "utility_payment_consistency",
    "airtime_topup_frequency",
];

/// Date format used on the wire and in SQLite
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Alternative-data profile of a borrower
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Mobile-money transactions per month
    pub transaction_frequency: f64,
    /// Average transaction amount (USD)
    pub avg_transaction_amount: f64,
    /// Utility payment consistency (0-1)
    pub utility_payment_consistency: f64,
    /// Airtime top-ups per month
    pub airtime_topup_frequency: f64,
}

impl FeatureVector {
    pub fn new(
        transaction_frequency: f64,
        avg_transaction_amount: f64,
        utility_payment_consistency: f64,
        airtime_topup_frequency: f64,
    ) -> Self {
        Self {
            transaction_frequency,
            avg_transaction_amount,
            utility_payment_consistency,
            airtime_topup_frequency,
        }
    }

    /// Values in `FEATURE_NAMES` order
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.transaction_frequency,
            self.avg_transaction_amount,
            self.utility_payment_consistency,
            self.airtime_topup_frequency,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }
}

/// Underwriting decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Deny => "deny",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(Decision::Approve),
            "deny" => Some(Decision::Deny),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repayment timeliness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepaymentStatus {
    #[serde(rename = "on-time")]
    OnTime,
    #[serde(rename = "late")]
    Late,
}

impl RepaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepaymentStatus::OnTime => "on-time",
            RepaymentStatus::Late => "late",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "on-time" => Some(RepaymentStatus::OnTime),
            "late" => Some(RepaymentStatus::Late),
            _ => None,
        }
    }
}

impl fmt::Display for RepaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Achievement badges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Badge {
    FirstApplication,
    ConsistentPayer,
    ReliableBorrower,
}

impl Badge {
    pub fn name(&self) -> &'static str {
        match self {
            Badge::FirstApplication => "First Application",
            Badge::ConsistentPayer => "Consistent Payer",
            Badge::ReliableBorrower => "Reliable Borrower",
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stored loan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoanRecord {
    pub loan_id: String,
    pub user_id: String,
    pub amount: f64,
    pub decision: Decision,
    pub score: f64,
    pub application_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// One entry of a borrower's repayment history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepaymentRecord {
    #[serde(rename = "date")]
    pub payment_date: NaiveDate,
    pub status: RepaymentStatus,
    pub amount: f64,
}

/// Points, streak and badges for one borrower
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GamificationState {
    pub repayment_streak: u32,
    pub points_earned: u32,
    /// Badge names in award order
    pub badges: Vec<String>,
}

impl GamificationState {
    pub fn has_badge(&self, badge: Badge) -> bool {
        self.badges.iter().any(|b| b == badge.name())
    }

    /// Comma-joined form stored in SQLite
    pub fn badges_column(&self) -> String {
        self.badges.join(",")
    }

    pub fn parse_badges(column: &str) -> Vec<String> {
        column
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .collect()
    }
}
