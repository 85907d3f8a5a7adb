//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code for logs and API responses.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - API_xxx: request errors
//! - DB_xxx: storage errors
//! - MODEL_xxx: model artifact errors
//! - CFG_xxx: configuration errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use tracing::error;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // API Errors
    // ============================================
    /// Request references invalid data
    ApiBadRequest,
    /// Request body failed field validation
    ApiValidationFailed,
    /// Unauthorized (invalid API key)
    ApiUnauthorized,
    /// Resource not found
    ApiNotFound,
    /// Route exists but not for this method
    ApiMethodNotAllowed,
    /// Request exceeded the server timeout
    ApiTimeout,
    /// Conflicts with existing state
    ApiConflict,
    /// Rate limit exceeded
    ApiRateLimited,
    /// Internal server error
    ApiInternalError,

    // ============================================
    // Storage Errors
    // ============================================
    /// SQLite failure
    DatabaseError,
    /// Stored row could not be decoded
    DatabaseCorrupt,

    // ============================================
    // Model Errors
    // ============================================
    /// Model artifact missing or unreadable
    ModelLoadFailed,
    /// Model artifact fails validation
    ModelInvalid,
    /// Training could not produce a model
    ModelTrainingFailed,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // Generic Errors
    // ============================================
    /// Filesystem failure
    Io,
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiValidationFailed => "API_VALIDATION_FAILED",
            Self::ApiUnauthorized => "API_UNAUTHORIZED",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::ApiMethodNotAllowed => "API_METHOD_NOT_ALLOWED",
            Self::ApiTimeout => "API_TIMEOUT",
            Self::ApiConflict => "API_CONFLICT",
            Self::ApiRateLimited => "API_RATE_LIMITED",
            Self::ApiInternalError => "API_INTERNAL_ERROR",

            Self::DatabaseError => "DB_ERROR",
            Self::DatabaseCorrupt => "DB_CORRUPT_ROW",

            Self::ModelLoadFailed => "MODEL_LOAD_FAILED",
            Self::ModelInvalid => "MODEL_INVALID",
            Self::ModelTrainingFailed => "MODEL_TRAINING_FAILED",

            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            Self::Io => "IO_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ApiBadRequest => 400,
            Self::ApiUnauthorized => 401,
            Self::ApiNotFound => 404,
            Self::ApiMethodNotAllowed => 405,
            Self::ApiTimeout => 408,
            Self::ApiConflict => 409,
            Self::ApiValidationFailed => 422,
            Self::ApiRateLimited => 429,
            _ => 500,
        }
    }

    /// Whether the client caused this error
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiValidationFailed, msg)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::ApiUnauthorized, "Invalid or missing API key")
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiNotFound, msg)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(ErrorCode::ApiMethodNotAllowed, "Method Not Allowed")
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::ApiTimeout, "Request timed out")
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiConflict, msg)
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self::new(
            ErrorCode::ApiRateLimited,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after),
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }

    pub fn model_invalid(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ModelInvalid, msg)
    }

    pub fn invalid_config(key: &str, value: &str) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for {}: {:?}", key, value),
        )
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        Self::with_source(ErrorCode::DatabaseError, format!("Database error: {}", err), err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Io, format!("IO error: {}", err), err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::ModelInvalid, format!("JSON error: {}", err), err)
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(err: chrono::ParseError) -> Self {
        Self::with_source(
            ErrorCode::DatabaseCorrupt,
            format!("Invalid stored date: {}", err),
            err,
        )
    }
}

// ============================================
// HTTP response mapping
// ============================================

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if !self.code.is_client_error() {
            error!(code = self.code_str(), error = %self.message, "Request failed");
        }

        let body = ErrorBody {
            detail: self.message,
            code: self.code.as_str(),
        };
        (status, Json(body)).into_response()
    }
}
