//! Micro-loan Underwriting API Module
//! REST API for loan scoring, repayments and borrower progress

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod types;

pub use handlers::AppState;
pub use middleware::{start_cleanup_task, RateLimiter};
pub use routes::create_router;
pub use types::*;
