//! Core Module - Business Logic
//!
//! Scoring model, explanations, training, underwriting rules and gamification.

pub mod explainer;
pub mod gamification;
pub mod model;
pub mod training;
pub mod underwriting;

pub use explainer::*;
pub use gamification::*;
pub use model::*;
pub use training::*;
pub use underwriting::*;
