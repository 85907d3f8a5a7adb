//! Microloan Library
//!
//! Alternative-data underwriting for micro-loans:
//! - Logistic regression scoring over mobile-money and utility signals
//! - Per-feature SHAP explanations for every decision
//! - Repayment streaks, points and badges
//! - SQLite persistence behind an axum REST API

pub mod api;
pub mod core;
pub mod models;
pub mod storage;
pub mod utils;

pub use crate::core::{Explanation, ModelArtifact, TrainingConfig, UnderwritingModel};
pub use models::{AppError, AppResult, Decision, ErrorCode, FeatureVector, ServerConfig};
pub use storage::Database;
pub use utils::telemetry::{TelemetryCollector, TelemetryStats};
