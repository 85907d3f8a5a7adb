//! Underwriting rules
//!
//! Decision threshold, loan term and repayment timeliness.

use chrono::{Duration, NaiveDate};

use crate::models::{Decision, RepaymentStatus};

/// Score (0-100) an application must exceed to be approved
pub const APPROVAL_THRESHOLD: f64 = 70.0;
/// Days between application and due date
pub const LOAN_TERM_DAYS: i64 = 30;
/// Days after the due date a payment still counts as on time
pub const GRACE_PERIOD_DAYS: i64 = 1;
/// Allowed difference between loan amount and repayment amount
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// Strictly above the threshold approves
pub fn decide(score: f64, threshold: f64) -> Decision {
    if score > threshold {
        Decision::Approve
    } else {
        Decision::Deny
    }
}

pub fn due_date(application_date: NaiveDate) -> NaiveDate {
    application_date + Duration::days(LOAN_TERM_DAYS)
}

pub fn repayment_status(payment_date: NaiveDate, due_date: NaiveDate) -> RepaymentStatus {
    if payment_date <= due_date + Duration::days(GRACE_PERIOD_DAYS) {
        RepaymentStatus::OnTime
    } else {
        RepaymentStatus::Late
    }
}

pub fn amount_matches(loan_amount: f64, repayment_amount: f64) -> bool {
    (loan_amount - repayment_amount).abs() <= AMOUNT_TOLERANCE
}

/// Base loan id, `L{user_id}_{unix_seconds}`
pub fn loan_id(user_id: &str, unix_seconds: i64) -> String {
    format!("L{}_{}", user_id, unix_seconds)
}

/// Candidate ids in order: the base id, then `_2`, `_3`, ...
pub fn loan_id_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((2u32..).map(move |n| format!("{}_{}", base, n)))
}

pub fn application_message(decision: Decision, due_date: NaiveDate, points: u32) -> String {
    format!(
        "Loan {}! Repay by {} to earn {} points.",
        decision,
        due_date.format(crate::models::DATE_FORMAT),
        points
    )
}
