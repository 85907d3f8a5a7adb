//! API Route Configuration

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::handlers::{self, AppState};
use super::middleware::{
    auth_middleware, error_body_middleware, logging_middleware, rate_limit_middleware,
};

fn endpoints() -> Router<Arc<AppState>> {
    Router::new()
        // Health & Status
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        // Underwriting
        .route("/loan/apply", post(handlers::apply_loan))
        // Gamification
        .route("/user/progress/:user_id", get(handlers::get_user_progress))
        .route("/repayment/record", post(handlers::record_repayment))
}

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_timeout = state.config.request_timeout;
    let max_concurrent = state.config.max_concurrent_requests;

    Router::new()
        .merge(endpoints())
        .nest("/v1", endpoints())
        .fallback(handlers::not_found)
        .with_state(state.clone())
        // Middleware (bottom runs first)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(error_body_middleware))
        .layer(GlobalConcurrencyLimitLayer::new(max_concurrent))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
        .layer(middleware::from_fn(logging_middleware))
}
