/// Error handling for the credential lifecycle
///
/// Every failure is a value from a closed enumeration. Domain enums are kept
/// separate so a route can tell an expired access credential apart from a
/// reused refresh credential without string matching:
/// 1. Domain-specific error types
/// 2. A unified `AppError` used for control flow
/// 3. HTTP mapping with structured, non-revealing responses
/// 4. Error context for enriched logging

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(String),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(String, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(String, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(String),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(String),
    #[error("input contains potentially dangerous SQL patterns")]
    PossibleSQLInjection,
}

/// Database operation errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Duplicate entry: {0}")]
    UniqueConstraintViolation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database connection error: {0}")]
    ConnectionPool(String),
    #[error("Database error: {0}")]
    UnexpectedError(String),
}

/// Email dispatcher errors
#[derive(Debug, Clone, Error)]
pub enum EmailError {
    #[error("Failed to send email: {0}")]
    SendFailed(String),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Email service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required config: {0}")]
    MissingRequired(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Why an access credential was rejected.
///
/// `Expired` is kept apart from the others: it is the only kind a client
/// should answer with a refresh instead of a full re-authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessTokenError {
    #[error("Missing authentication token")]
    Missing,
    #[error("Malformed authentication token")]
    Malformed,
    #[error("Token has expired")]
    Expired,
    #[error("Token signature is invalid")]
    InvalidSignature,
}

/// Why a refresh credential could not be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("Refresh token has already been used")]
    ReuseDetected,
    #[error("Refresh token has been revoked")]
    Revoked,
    #[error("Refresh token has expired")]
    Expired,
    #[error("Refresh token not found")]
    NotFound,
}

/// Authentication and authorization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Same value for an unknown identifier and a wrong secret.
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is inactive")]
    AccountInactive,
    #[error(transparent)]
    Access(#[from] AccessTokenError),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("Recovery token is invalid or expired")]
    RecoveryTokenInvalidOrExpired,
    #[error("Insufficient permissions")]
    Forbidden,
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Too many requests")]
    RateLimited,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the authentication failure carried by this error, if any.
    pub fn auth_error(&self) -> Option<&AuthError> {
        match self {
            AppError::Auth(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AccessTokenError> for AppError {
    fn from(err: AccessTokenError) -> Self {
        AppError::Auth(AuthError::Access(err))
    }
}

impl From<RefreshError> for AppError {
    fn from(err: RefreshError) -> Self {
        AppError::Auth(AuthError::Refresh(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    db.message().to_string(),
                ))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AppError::Email(EmailError::ServiceUnavailable(err.to_string()))
        } else {
            AppError::Email(EmailError::SendFailed(err.to_string()))
        }
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Unique error ID, also present in the server log line
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

fn auth_status_and_code(e: &AuthError) -> (StatusCode, &'static str) {
    match e {
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
        AuthError::AccountInactive => (StatusCode::FORBIDDEN, "ACCOUNT_INACTIVE"),
        AuthError::Access(AccessTokenError::Missing) => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN"),
        AuthError::Access(AccessTokenError::Malformed) => {
            (StatusCode::UNAUTHORIZED, "TOKEN_MALFORMED")
        }
        AuthError::Access(AccessTokenError::Expired) => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
        AuthError::Access(AccessTokenError::InvalidSignature) => {
            (StatusCode::UNAUTHORIZED, "TOKEN_INVALID_SIGNATURE")
        }
        AuthError::Refresh(RefreshError::ReuseDetected) => (StatusCode::UNAUTHORIZED, "TOKEN_REUSED"),
        AuthError::Refresh(RefreshError::Revoked) => (StatusCode::UNAUTHORIZED, "TOKEN_REVOKED"),
        AuthError::Refresh(RefreshError::Expired) => {
            (StatusCode::UNAUTHORIZED, "REFRESH_TOKEN_EXPIRED")
        }
        AuthError::Refresh(RefreshError::NotFound) => (StatusCode::UNAUTHORIZED, "TOKEN_NOT_FOUND"),
        AuthError::RecoveryTokenInvalidOrExpired => {
            (StatusCode::BAD_REQUEST, "RECOVERY_TOKEN_INVALID")
        }
        AuthError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),

            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => {
                    (StatusCode::CONFLICT, "DUPLICATE_ENTRY", "Duplicate entry".to_string())
                }
                DatabaseError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found".to_string())
                }
                DatabaseError::ConnectionPool(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service temporarily unavailable".to_string(),
                ),
                DatabaseError::UnexpectedError(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                ),
            },

            AppError::Email(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "EMAIL_SERVICE_ERROR",
                "Email service temporarily unavailable".to_string(),
            ),

            AppError::Auth(e) => {
                let (status, code) = auth_status_and_code(e);
                (status, code, e.to_string())
            }

            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests".to_string(),
            ),

            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let error_response =
            ErrorResponse::new(request_id.to_string(), message, code.to_string(), status.as_u16());

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(request_id = request_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Database(e) => {
                tracing::error!(request_id = request_id, error = %e, "Database error");
            }
            AppError::Email(e) => {
                tracing::error!(request_id = request_id, error = %e, "Email service error");
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(request_id = request_id, "Invalid credentials attempt");
            }
            AppError::Auth(AuthError::Refresh(RefreshError::ReuseDetected)) => {
                tracing::warn!(request_id = request_id, "Rejected reused refresh token");
            }
            AppError::Auth(e) => {
                tracing::info!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::RateLimited => {
                tracing::warn!(request_id = request_id, "Rate limit exceeded");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        <Self as ErrorHandler>::error_response(self, "").0
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub principal_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            principal_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_principal_id(mut self, principal_id: impl ToString) -> Self {
        self.principal_id = Some(principal_id.to_string());
        self
    }

    /// Log an error that a handler chose to swallow instead of returning.
    pub fn log_error(&self, error: &AppError) {
        tracing::error!(
            request_id = %self.request_id,
            operation = %self.operation,
            principal_id = ?self.principal_id,
            error = %error,
            "Operation failed"
        );
    }
}
