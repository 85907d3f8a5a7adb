//! Microloan Underwriting API Server
//!
//! Usage:
//!   cargo run --bin microloan_api
//!
//! Environment:
//!   MICROLOAN_PORT / PORT  - Server port (default: 8000)
//!   MICROLOAN_HOST         - Server host (default: 0.0.0.0)
//!   MICROLOAN_MODEL_PATH   - Model artifact (default: artifacts/model.json)
//!   MICROLOAN_DB_PATH      - SQLite file (default: data/loans.db)
//!   MICROLOAN_AUTO_TRAIN   - Train a model when the artifact is missing
//!   RUST_LOG               - Log level (default: info)

use eyre::WrapErr;
use microloan::api::{create_router, start_cleanup_task, AppState};
use microloan::core::training::{train, TrainingConfig};
use microloan::utils::init_logging;
use microloan::{Database, ServerConfig, UnderwritingModel};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let config = ServerConfig::from_env().wrap_err("Invalid server configuration")?;
    init_logging("info", config.log_json);

    let model = load_model(&config)?;
    let db = Database::open(&config.db_path)
        .wrap_err_with(|| format!("Failed to open database {}", config.db_path.display()))?;

    let addr = config.socket_addr()?;
    let telemetry_dir = config.telemetry_dir.clone();

    let state = Arc::new(AppState::new(config, model, db));
    let telemetry = state.telemetry.clone();

    let cleanup = start_cleanup_task(state.rate_limiter.clone());
    info!("Rate limiter cleanup task started");

    let app = create_router(state);

    info!("Microloan API starting on http://{}", addr);
    info!("Endpoints (also under /v1):");
    info!("  POST /loan/apply                - Score a loan application");
    info!("  GET  /user/progress/{{user_id}}   - Streak, points, badges, repayments");
    info!("  POST /repayment/record          - Record a repayment");
    info!("  GET  /stats                     - Underwriting statistics");
    info!("  GET  /health                    - Health check");
    info!("Press Ctrl+C for graceful shutdown");

    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown signal received, cleaning up...");
    cleanup.abort();

    let stats = telemetry.get_stats();
    info!(
        applications = stats.total_applications,
        approved = stats.total_approved,
        repayments = stats.total_repayments,
        "Final telemetry"
    );
    match telemetry.export_stats_json(&telemetry_dir) {
        Ok(path) => info!("Stats exported to: {}", path.display()),
        Err(e) => warn!("Failed to export stats: {}", e),
    }

    info!("Microloan API shutdown complete");
    Ok(())
}

/// Load the artifact, or train and persist one when allowed
fn load_model(config: &ServerConfig) -> eyre::Result<UnderwritingModel> {
    if config.model_path.exists() {
        let model = UnderwritingModel::load(&config.model_path).wrap_err_with(|| {
            format!("Failed to load model {}", config.model_path.display())
        })?;
        info!(path = %config.model_path.display(), "Model loaded");
        return Ok(model);
    }

    if !config.auto_train {
        eyre::bail!(
            "Model artifact {} not found. Run `cargo run --bin train_model` or set MICROLOAN_AUTO_TRAIN=true",
            config.model_path.display()
        );
    }

    warn!(path = %config.model_path.display(), "Model artifact missing, training a new one");
    let (artifact, report) = train(&TrainingConfig::default())?;
    artifact.save(&config.model_path)?;
    info!(accuracy = report.accuracy, "Model trained and saved");
    Ok(UnderwritingModel::new(artifact)?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
