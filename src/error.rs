/// Application Error Handling Module
///
/// One closed error type for the whole service:
/// 1. Domain-specific error enums (validation, auth, database, email, config)
/// 2. `AppError`, the tagged union every operation returns
/// 3. `ErrorKind`, the stable discriminant callers branch on
/// 4. HTTP response mapping with the `{success, message, error}` envelope
/// 5. Timeout helper and structured error logging with context

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
    PossibleSQLInjection,
    WeakPassword(String),
    Mismatch(String),
    MalformedBody(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
            ValidationError::PossibleSQLInjection => {
                write!(f, "input contains potentially dangerous SQL patterns")
            }
            ValidationError::WeakPassword(reason) => write!(f, "password is too weak: {}", reason),
            ValidationError::Mismatch(msg) => write!(f, "{}", msg),
            ValidationError::MalformedBody(msg) => write!(f, "invalid request body: {}", msg),
        }
    }
}

impl StdError for ValidationError {}

/// Authentication and authorization errors
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    InvalidCredentials,
    TokenExpired,
    TokenRevoked,
    TokenMalformed,
    MissingToken,
    AccountNotConfirmed,
    InsufficientRole,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenRevoked => write!(f, "Token has been revoked"),
            AuthError::TokenMalformed => write!(f, "Invalid token"),
            AuthError::MissingToken => write!(f, "Missing or invalid authorization header"),
            AuthError::AccountNotConfirmed => write!(f, "Email address is not verified"),
            AuthError::InsufficientRole => write!(f, "Insufficient permissions"),
        }
    }
}

impl StdError for AuthError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    EmailTaken(String),
    UsernameTaken(String),
    NotFound(String),
    PoolTimeout(String),
    QueryExecution(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::EmailTaken(email) => write!(f, "Email already exists: {}", email),
            DatabaseError::UsernameTaken(name) => write!(f, "Username already exists: {}", name),
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::PoolTimeout(msg) => write!(f, "Database connection timed out: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Email service errors
#[derive(Debug, Clone)]
pub enum EmailError {
    SendFailed(String),
    InvalidRecipient(String),
    ServiceUnavailable(String),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::SendFailed(msg) => write!(f, "Failed to send email: {}", msg),
            EmailError::InvalidRecipient(msg) => write!(f, "Invalid recipient: {}", msg),
            EmailError::ServiceUnavailable(msg) => {
                write!(f, "Email service unavailable: {}", msg)
            }
        }
    }
}

impl StdError for EmailError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Database(DatabaseError),
    Email(EmailError),
    Config(ConfigError),
    Timeout(String),
    NotImplemented(String),
    Internal(String),
}

/// Stable discriminant of an `AppError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCredentials,
    TokenExpired,
    TokenRevoked,
    TokenMalformed,
    MissingToken,
    AccountNotConfirmed,
    Forbidden,
    EmailAlreadyExists,
    UsernameAlreadyExists,
    UserNotFound,
    InvalidInput,
    Timeout,
    NotImplemented,
    Internal,
}

impl ErrorKind {
    /// Machine-readable code used in the `error` field of the envelope
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorKind::TokenExpired => "TOKEN_EXPIRED",
            ErrorKind::TokenRevoked => "TOKEN_REVOKED",
            ErrorKind::TokenMalformed => "TOKEN_MALFORMED",
            ErrorKind::MissingToken => "MISSING_TOKEN",
            ErrorKind::AccountNotConfirmed => "ACCOUNT_NOT_CONFIRMED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            ErrorKind::UsernameAlreadyExists => "USERNAME_ALREADY_EXISTS",
            ErrorKind::UserNotFound => "USER_NOT_FOUND",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::NotImplemented => "NOT_IMPLEMENTED",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidCredentials
            | ErrorKind::TokenExpired
            | ErrorKind::TokenRevoked
            | ErrorKind::TokenMalformed
            | ErrorKind::MissingToken
            | ErrorKind::AccountNotConfirmed => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::UserNotFound => StatusCode::NOT_FOUND,
            ErrorKind::EmailAlreadyExists | ErrorKind::UsernameAlreadyExists => {
                StatusCode::CONFLICT
            }
            ErrorKind::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::InvalidInput,
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
                AuthError::TokenExpired => ErrorKind::TokenExpired,
                AuthError::TokenRevoked => ErrorKind::TokenRevoked,
                AuthError::TokenMalformed => ErrorKind::TokenMalformed,
                AuthError::MissingToken => ErrorKind::MissingToken,
                AuthError::AccountNotConfirmed => ErrorKind::AccountNotConfirmed,
                AuthError::InsufficientRole => ErrorKind::Forbidden,
            },
            AppError::Database(e) => match e {
                DatabaseError::EmailTaken(_) => ErrorKind::EmailAlreadyExists,
                DatabaseError::UsernameTaken(_) => ErrorKind::UsernameAlreadyExists,
                DatabaseError::NotFound(_) => ErrorKind::UserNotFound,
                DatabaseError::PoolTimeout(_) => ErrorKind::Timeout,
                DatabaseError::QueryExecution(_) => ErrorKind::Internal,
            },
            AppError::Email(_) | AppError::Config(_) | AppError::Internal(_) => {
                ErrorKind::Internal
            }
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::NotImplemented(_) => ErrorKind::NotImplemented,
        }
    }

    /// Message safe to return to the caller.
    /// Internal details stay in the server logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            ErrorKind::Timeout => "Service temporarily unavailable, please retry".to_string(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Email(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Timeout(op) => write!(f, "{} timed out", op),
            AppError::NotImplemented(feature) => write!(f, "Feature not implemented: {}", feature),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self {
        AppError::Email(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::PoolTimedOut => {
                AppError::Database(DatabaseError::PoolTimeout(err.to_string()))
            }
            sqlx::Error::Database(db_err) => match db_err.constraint() {
                Some("user_account_email_address_key") => {
                    AppError::Database(DatabaseError::EmailTaken("email".to_string()))
                }
                Some("user_account_user_name_key") => {
                    AppError::Database(DatabaseError::UsernameTaken("username".to_string()))
                }
                _ => AppError::Database(DatabaseError::QueryExecution(err.to_string())),
            },
            _ => AppError::Database(DatabaseError::QueryExecution(err.to_string())),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Background task failed: {}", err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error envelope returned for every rejected request
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: String, code: Option<String>) -> Self {
        Self {
            success: false,
            message,
            error: code,
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let context = ErrorContext::new("http_response");
        context.log_error(self);

        let kind = self.kind();
        HttpResponse::build(kind.status()).json(ErrorResponse::new(
            self.public_message(),
            Some(kind.code().to_string()),
        ))
    }

    fn status_code(&self) -> StatusCode {
        self.kind().status()
    }
}

// ============================================================================
// 4. HELPER FUNCTIONS FOR COMMON ERROR PATTERNS
// ============================================================================

/// Run a fallible operation under a deadline.
/// Expiry becomes `AppError::Timeout`, never "not found" or "invalid".
pub async fn with_timeout<T, F>(seconds: u64, operation: &str, future: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(Duration::from_secs(seconds), future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation = operation, timeout_secs = seconds, "Operation timed out");
            Err(AppError::Timeout(operation.to_string()))
        }
    }
}

// ============================================================================
// 5. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub operation: String,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
        }
    }

    pub fn log_error(&self, error: &AppError) {
        let kind = error.kind().code();
        match error.kind() {
            ErrorKind::Internal => {
                tracing::error!(
                    request_id = %self.request_id,
                    operation = %self.operation,
                    kind = kind,
                    error = %error,
                    "Internal error"
                );
            }
            ErrorKind::Timeout => {
                tracing::error!(
                    request_id = %self.request_id,
                    operation = %self.operation,
                    kind = kind,
                    error = %error,
                    "Operation timed out"
                );
            }
            _ => {
                tracing::warn!(
                    request_id = %self.request_id,
                    operation = %self.operation,
                    kind = kind,
                    error = %error,
                    "Request rejected"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email".to_string());
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = ValidationError::InvalidFormat("test".to_string()).into();
        assert_eq!(app_err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_kind_to_status_mapping() {
        assert_eq!(ErrorKind::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::TokenRevoked.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::UserNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::EmailAlreadyExists.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::Timeout.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorKind::NotImplemented.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(ErrorKind::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = AppError::Internal("connection reset by peer at 10.0.0.3".to_string());
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::Email(EmailError::SendFailed("smtp down".to_string()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.public_message().contains("smtp"));
    }

    #[test]
    fn test_business_message_is_stable() {
        let err = AppError::Auth(AuthError::TokenRevoked);
        assert_eq!(err.public_message(), "Token has been revoked");
        assert_eq!(err.kind().code(), "TOKEN_REVOKED");
    }

    #[test]
    fn test_row_not_found_maps_to_user_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::UserNotFound);

        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_error_envelope_omits_empty_code() {
        let body = serde_json::to_value(ErrorResponse::new("nope".to_string(), None)).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "nope");
        assert!(body.get("error").is_none());
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("test_operation");
        assert_eq!(ctx.operation, "test_operation");
        assert_ne!(ctx.request_id, ErrorContext::new("test_operation").request_id);
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(1, "fast_op", async { Ok::<_, AppError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_maps_expiry_to_timeout_kind() {
        let result: Result<(), AppError> = with_timeout(0, "slow_op", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.to_string(), "slow_op timed out");
    }
}
