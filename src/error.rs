use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// AuthError
///
/// Failures of the identity gateway and the session extractor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The authenticated email is outside the institutional domain. The
    /// provider session has already been revoked when this is returned.
    #[error("Only @{0} email addresses are allowed")]
    DomainRejected(String),

    #[error("No active session")]
    NoSession,

    #[error("Invalid token")]
    InvalidToken,

    /// The token predates the last role change and must be refreshed.
    #[error("Role claim is stale, refresh the session token")]
    StaleClaim,
}

/// ValidationError
///
/// Input problems detected before any upload or write happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill in the {0}")]
    MissingField(&'static str),

    #[error("Please enter a valid URL: {0}")]
    InvalidUrl(String),

    #[error("Please upload at least one file")]
    EmptyFileSet,

    #[error("A reason is required to report a resource")]
    EmptyReason,

    #[error("Unknown role '{0}'")]
    InvalidRole(String),

    #[error("Malformed request: {0}")]
    Malformed(String),
}

/// AppError
///
/// The single error type returned by services and handlers. Every variant is
/// scoped to one request.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The actor lacks the role or ownership the action requires.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    /// The external media endpoint (or blob store) refused an upload.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// An earlier step of a multi-step operation took effect and a later one
    /// failed. `orphaned` lists uploaded URLs that no record references.
    #[error("Partially completed: {message}")]
    PartialFailure {
        message: String,
        orphaned: Vec<String>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Identity provider, notifier or other collaborator failure.
    #[error("Downstream service error: {0}")]
    Downstream(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(AuthError::DomainRejected(_)) => StatusCode::FORBIDDEN,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::PartialFailure { .. }
            | AppError::Database(_)
            | AppError::Downstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Auth(AuthError::DomainRejected(_)) => "DOMAIN_REJECTED",
            AppError::Auth(AuthError::NoSession) => "NO_SESSION",
            AppError::Auth(AuthError::InvalidToken) => "INVALID_TOKEN",
            AppError::Auth(AuthError::StaleClaim) => "STALE_CLAIM",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::UploadFailed(_) => "UPLOAD_FAILED",
            AppError::PartialFailure { .. } => "PARTIAL_FAILURE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Downstream(_) => "DOWNSTREAM_ERROR",
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs.
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Downstream(msg) => {
                tracing::error!("Downstream error: {}", msg);
                "Downstream service error".to_string()
            }
            AppError::PartialFailure { message, orphaned } => {
                tracing::error!(orphaned = ?orphaned, "Partial failure: {}", message);
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = match &self {
            AppError::PartialFailure { orphaned, .. } => json!({
                "error": self.error_code(),
                "message": message,
                "orphaned": orphaned,
            }),
            _ => json!({
                "error": self.error_code(),
                "message": message,
            }),
        };

        (status, Json(body)).into_response()
    }
}
