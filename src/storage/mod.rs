//! Storage Module - SQLite persistence

pub mod database;

pub use database::*;
