//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so it can be found in logs and
//! matched by the storefront.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - API_xxx: generic request errors
//! - AUTH_xxx: authentication errors
//! - UPLOAD_xxx: image upload errors
//! - DB_xxx / STORAGE_xxx / SEARCH_xxx: backend failures
//! - TRYON_xxx: virtual try-on upstream errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use tracing::error;

use crate::api::types::{ApiErrorBody, ApiResponse};

/// Application-wide error type
/// All handler and provider errors flow through this type
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
    /// Invalid request format
    ApiBadRequest,
    /// Field validation failed
    ValidationFailed,
    /// Caller may not touch this resource
    ApiForbidden,
    /// Resource not found
    ApiNotFound,
    /// Unique constraint or state conflict
    ApiConflict,
    /// Rate limit exceeded
    ApiRateLimited,
    /// Internal server error
    ApiInternalError,

    // ============================================
    // Auth Errors
    // ============================================
    /// No bearer token supplied
    AuthMissingToken,
    /// Token malformed, badly signed, or for an unknown user
    AuthInvalidToken,
    /// Access token past its `exp`
    AuthTokenExpired,
    /// Wrong login or password
    AuthInvalidCredentials,
    /// Revoked refresh token presented again
    AuthRefreshRevoked,

    // ============================================
    // Upload Errors
    // ============================================
    /// Upload exceeds the configured size
    UploadTooLarge,
    /// Content type is not an accepted image type
    UploadUnsupportedType,

    // ============================================
    // Backend Errors
    // ============================================
    /// Database query failed
    DatabaseError,
    /// Object storage operation failed
    StorageError,
    /// Search engine operation failed
    SearchError,

    // ============================================
    // External Service Errors
    // ============================================
    /// Try-on upstream returned an error or unusable payload
    TryOnUpstreamError,
    /// Try-on not configured
    TryOnDisabled,
    /// External service timeout
    ExternalTimeout,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::ApiForbidden => "API_FORBIDDEN",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::ApiConflict => "API_CONFLICT",
            Self::ApiRateLimited => "API_RATE_LIMITED",
            Self::ApiInternalError => "API_INTERNAL_ERROR",

            Self::AuthMissingToken => "AUTH_MISSING_TOKEN",
            Self::AuthInvalidToken => "AUTH_INVALID_TOKEN",
            Self::AuthTokenExpired => "AUTH_TOKEN_EXPIRED",
            Self::AuthInvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            Self::AuthRefreshRevoked => "AUTH_REFRESH_REVOKED",

            Self::UploadTooLarge => "UPLOAD_TOO_LARGE",
            Self::UploadUnsupportedType => "UPLOAD_UNSUPPORTED_TYPE",

            Self::DatabaseError => "DB_ERROR",
            Self::StorageError => "STORAGE_ERROR",
            Self::SearchError => "SEARCH_ERROR",

            Self::TryOnUpstreamError => "TRYON_UPSTREAM_ERROR",
            Self::TryOnDisabled => "TRYON_DISABLED",
            Self::ExternalTimeout => "EXTERNAL_TIMEOUT",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ApiBadRequest | Self::ValidationFailed => 400,
            Self::AuthMissingToken
            | Self::AuthInvalidToken
            | Self::AuthTokenExpired
            | Self::AuthInvalidCredentials
            | Self::AuthRefreshRevoked => 401,
            Self::ApiForbidden => 403,
            Self::ApiNotFound => 404,
            Self::ApiConflict => 409,
            Self::UploadTooLarge => 413,
            Self::UploadUnsupportedType => 415,
            Self::ApiRateLimited => 429,
            Self::TryOnUpstreamError => 502,
            Self::TryOnDisabled => 503,
            Self::ExternalTimeout => 504,
            _ => 500,
        }
    }

    /// Internal failures whose message must not reach the client
    pub fn is_internal(&self) -> bool {
        self.http_status() == 500
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// API bad request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    /// Field validation failed
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiForbidden, msg)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(ErrorCode::ApiNotFound, format!("{} not found", what))
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

    pub fn missing_token() -> Self {
        Self::new(ErrorCode::AuthMissingToken, "Missing bearer token")
    }

    pub fn invalid_token() -> Self {
        Self::new(ErrorCode::AuthInvalidToken, "Invalid or unknown token")
    }

    /// Same message for unknown user and wrong password
    pub fn invalid_credentials() -> Self {
        Self::new(ErrorCode::AuthInvalidCredentials, "Invalid login or password")
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, msg)
    }

    pub fn search(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SearchError, msg)
    }

    pub fn tryon_upstream(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TryOnUpstreamError, msg)
    }

    /// API internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// HTTP response
// ============================================

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if self.code.is_internal() {
            error!(code = %self.code_str(), source = ?self.source, "{}", self.message);
            "Internal server error".to_string()
        } else {
            self.message
        };

        let body = ApiResponse::<()>::error(ApiErrorBody {
            code: self.code.as_str().to_string(),
            message,
        });

        (status, Json(body)).into_response()
    }
}

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::ExternalTimeout, "Upstream request timed out")
        } else if err.is_connect() {
            Self::new(ErrorCode::TryOnUpstreamError, "Upstream connection failed")
        } else {
            Self::with_source(ErrorCode::TryOnUpstreamError, "Upstream request failed", err)
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::ApiBadRequest, format!("Invalid JSON: {}", err), err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::new(ErrorCode::ApiNotFound, "Record not found"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::new(ErrorCode::ApiConflict, "Resource already exists")
            }
            _ => Self::with_source(ErrorCode::DatabaseError, "Database error", err),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::with_source(ErrorCode::DatabaseError, "Migration failed", err)
    }
}

impl From<s3::error::S3Error> for AppError {
    fn from(err: s3::error::S3Error) -> Self {
        Self::with_source(ErrorCode::StorageError, "Object storage error", err)
    }
}

impl From<meilisearch_sdk::errors::Error> for AppError {
    fn from(err: meilisearch_sdk::errors::Error) -> Self {
        Self::with_source(ErrorCode::SearchError, "Search engine error", err)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                Self::new(ErrorCode::AuthTokenExpired, "Access token expired")
            }
            _ => Self::invalid_token(),
        }
    }
}
