//! API Request Handlers

use axum::extract::{Json, Path, State};
use chrono::Local;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::extract::ValidJson;
use super::middleware::RateLimiter;
use super::types::*;
use crate::core::gamification::{self, apply_repayment};
use crate::core::model::UnderwritingModel;
use crate::core::underwriting;
use crate::models::{AppError, AppResult, Decision, ServerConfig};
use crate::storage::{Database, NewApplication, NewRepayment};
use crate::utils::telemetry::TelemetryCollector;

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    pub model: Arc<UnderwritingModel>,
    pub db: Arc<Database>,
    pub telemetry: Arc<TelemetryCollector>,
    pub rate_limiter: Arc<RateLimiter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, model: UnderwritingModel, db: Database) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            model: Arc::new(model),
            db: Arc::new(db),
            telemetry: Arc::new(TelemetryCollector::new()),
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Run blocking SQLite work off the async workers
    async fn with_db<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Database) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| AppError::internal(format!("Database task failed: {}", e)))?
    }
}

fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros().min(u64::MAX as u128) as u64
}

// ============================================
// Health & Stats
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthData> {
    Json(HealthData {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        model_version: state.model.artifact().version,
    })
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<StatsData>> {
    let database = state.with_db(|db| db.counts()).await?;
    Ok(Json(StatsData {
        telemetry: state.telemetry.get_stats(),
        database,
        uptime_seconds: state.uptime_seconds(),
        api_version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Fallback for unmatched paths
pub async fn not_found() -> AppError {
    AppError::not_found("Not Found")
}

// ============================================
// Loan Application
// ============================================

pub async fn apply_loan(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<LoanApplicationRequest>,
) -> AppResult<Json<LoanApplicationData>> {
    let start = Instant::now();
    let features = req.features();

    let score = state.model.score(&features);
    let decision = underwriting::decide(score, state.config.approval_threshold);
    let explanation = state.model.explain(&features);

    let now = Local::now();
    let application_date = now.date_naive();
    let due_date = underwriting::due_date(application_date);

    let application = NewApplication {
        user_id: req.user_id.clone(),
        features,
        amount: req.loan_amount,
        decision,
        score,
        application_date,
        due_date,
        submitted_at_unix: now.timestamp(),
    };
    let recorded = state
        .with_db(move |db| db.record_application(&application))
        .await?;

    state.telemetry.record_application(decision, elapsed_us(start));
    info!(
        user_id = %req.user_id,
        loan_id = %recorded.loan_id,
        decision = %decision,
        score = format_args!("{:.2}", score),
        top_factor = explanation.dominant_feature(),
        "Loan application scored"
    );

    Ok(Json(LoanApplicationData {
        user_id: req.user_id,
        loan_id: recorded.loan_id,
        decision,
        score,
        explanation,
        points_earned: gamification::APPLICATION_POINTS,
        badges_earned: recorded
            .new_badges
            .iter()
            .map(|b| b.name().to_string())
            .collect(),
        due_date,
        message: underwriting::application_message(
            decision,
            due_date,
            gamification::REPAYMENT_POINTS,
        ),
    }))
}

// ============================================
// User Progress
// ============================================

pub async fn get_user_progress(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserProgressData>> {
    let lookup_id = user_id.clone();
    let (features, gamification, history) = state
        .with_db(move |db| {
            let features = db
                .find_user(&lookup_id)?
                .ok_or_else(|| AppError::not_found("User not found"))?;
            Ok((
                features,
                db.gamification(&lookup_id)?,
                db.repayments_for(&lookup_id)?,
            ))
        })
        .await?;

    Ok(Json(UserProgressData {
        user_id,
        alternative_data: features,
        gamification: GamificationData {
            repayment_streak: gamification.repayment_streak,
            points_earned: gamification.points_earned,
            badges_earned: gamification.badges,
            progress_map: history,
        },
    }))
}

// ============================================
// Repayment
// ============================================

pub async fn record_repayment(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<RepaymentRequest>,
) -> AppResult<Json<RepaymentData>> {
    let start = Instant::now();
    let payment_date = req.payment_date()?;

    let (user_id, loan_id) = (req.user_id.clone(), req.loan_id.clone());
    let (loan, features) = state
        .with_db(move |db| Ok((db.find_loan(&loan_id)?, db.find_user(&user_id)?)))
        .await?;

    let loan = match loan {
        Some(loan)
            if loan.user_id == req.user_id
                && underwriting::amount_matches(loan.amount, req.amount) =>
        {
            loan
        }
        _ => {
            warn!(user_id = %req.user_id, loan_id = %req.loan_id, "Repayment rejected");
            return Err(AppError::bad_request("Invalid loan or amount"));
        }
    };
    if loan.decision != Decision::Approve {
        return Err(AppError::bad_request("Loan was not approved"));
    }
    let features = features.ok_or_else(|| AppError::not_found("User not found"))?;

    let status = underwriting::repayment_status(payment_date, loan.due_date);
    let repayment = NewRepayment {
        user_id: req.user_id.clone(),
        loan_id: req.loan_id.clone(),
        payment_date,
        amount: req.amount,
        status,
    };
    let outcome = state
        .with_db(move |db| db.record_repayment(&repayment, |s| apply_repayment(s, status)))
        .await?;

    let new_score = state.model.score(&features);
    state.telemetry.record_repayment(status, elapsed_us(start));
    info!(
        user_id = %req.user_id,
        loan_id = %req.loan_id,
        status = %status,
        streak = outcome.state.repayment_streak,
        "Repayment recorded"
    );

    Ok(Json(RepaymentData {
        message: gamification::repayment_message(&outcome, status),
        user_id: req.user_id,
        loan_id: req.loan_id,
        status,
        new_repayment_streak: outcome.state.repayment_streak,
        points_earned: outcome.points_awarded,
        badges_earned: outcome
            .new_badges
            .iter()
            .map(|b| b.name().to_string())
            .collect(),
        new_score,
    }))
}
