//! Utils Module - Helper Functions & Shared Utilities

pub mod logging;
pub mod telemetry;

pub use logging::*;
pub use telemetry::*;
