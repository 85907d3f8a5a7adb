//! API Request/Response Types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::explainer::Explanation;
use crate::models::{
    AppError, AppResult, Decision, FeatureVector, RepaymentRecord, RepaymentStatus, DATE_FORMAT,
};
use crate::storage::DatabaseCounts;
use crate::utils::telemetry::TelemetryStats;

/// Field-level checks run after deserialization
pub trait Validate {
    fn validate(&self) -> AppResult<()>;
}

fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn require_finite(field: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() {
        return Err(AppError::validation(format!("{} must be a finite number", field)));
    }
    Ok(())
}

fn require_positive(field: &str, value: f64) -> AppResult<()> {
    require_finite(field, value)?;
    if value <= 0.0 {
        return Err(AppError::validation(format!("{} must be greater than 0", field)));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: f64) -> AppResult<()> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(AppError::validation(format!("{} must be at least 0", field)));
    }
    Ok(())
}

/// Strict `YYYY-MM-DD`, rejecting impossible dates like 2024-02-30
pub fn parse_iso_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    let shape_ok = value.len() == 10
        && value.char_indices().all(|(i, c)| match i {
            4 | 7 => c == '-',
            _ => c.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(AppError::validation(format!(
            "{} must use YYYY-MM-DD format",
            field
        )));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| AppError::validation(format!("{} is not a valid calendar date", field)))
}

// ============================================
// Loan Application
// ============================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoanApplicationRequest {
    pub user_id: String,
    pub loan_amount: f64,
    pub transaction_frequency: f64,
    pub avg_transaction_amount: f64,
    pub utility_payment_consistency: f64,
    pub airtime_topup_frequency: f64,
}

impl LoanApplicationRequest {
    pub fn features(&self) -> FeatureVector {
        FeatureVector::new(
            self.transaction_frequency,
            self.avg_transaction_amount,
            self.utility_payment_consistency,
            self.airtime_topup_frequency,
        )
    }
}

impl Validate for LoanApplicationRequest {
    fn validate(&self) -> AppResult<()> {
        require_non_empty("user_id", &self.user_id)?;
        require_positive("loan_amount", self.loan_amount)?;
        require_non_negative("transaction_frequency", self.transaction_frequency)?;
        require_non_negative("avg_transaction_amount", self.avg_transaction_amount)?;
        require_non_negative("utility_payment_consistency", self.utility_payment_consistency)?;
        if self.utility_payment_consistency > 1.0 {
            return Err(AppError::validation(
                "utility_payment_consistency must be at most 1",
            ));
        }
        require_non_negative("airtime_topup_frequency", self.airtime_topup_frequency)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct LoanApplicationData {
    pub user_id: String,
    pub loan_id: String,
    pub decision: Decision,
    /// Approval score, 0-100
    pub score: f64,
    /// Log-odds attribution per feature
    pub explanation: Explanation,
    pub points_earned: u32,
    pub badges_earned: Vec<String>,
    pub due_date: NaiveDate,
    pub message: String,
}

// ============================================
// User Progress
// ============================================

#[derive(Debug, Serialize)]
pub struct UserProgressData {
    pub user_id: String,
    pub alternative_data: FeatureVector,
    pub gamification: GamificationData,
}

#[derive(Debug, Serialize)]
pub struct GamificationData {
    pub repayment_streak: u32,
    pub points_earned: u32,
    pub badges_earned: Vec<String>,
    pub progress_map: Vec<RepaymentRecord>,
}

// ============================================
// Repayment
// ============================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepaymentRequest {
    pub user_id: String,
    pub loan_id: String,
    /// YYYY-MM-DD
    pub payment_date: String,
    pub amount: f64,
}

impl RepaymentRequest {
    pub fn payment_date(&self) -> AppResult<NaiveDate> {
        parse_iso_date("payment_date", &self.payment_date)
    }
}

impl Validate for RepaymentRequest {
    fn validate(&self) -> AppResult<()> {
        require_non_empty("user_id", &self.user_id)?;
        require_non_empty("loan_id", &self.loan_id)?;
        self.payment_date()?;
        require_positive("amount", self.amount)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RepaymentData {
    pub user_id: String,
    pub loan_id: String,
    pub status: RepaymentStatus,
    pub new_repayment_streak: u32,
    /// Points from this repayment, badge bonuses included
    pub points_earned: u32,
    /// Badges newly awarded by this repayment
    pub badges_earned: Vec<String>,
    /// Re-scored approval score for the borrower
    pub new_score: f64,
    pub message: String,
}

// ============================================
// Stats / Health
// ============================================

#[derive(Debug, Serialize)]
pub struct StatsData {
    #[serde(flatten)]
    pub telemetry: TelemetryStats,
    pub database: DatabaseCounts,
    pub uptime_seconds: u64,
    pub api_version: String,
}

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub model_version: u32,
}
