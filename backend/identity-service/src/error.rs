use actix_web::{http::header, http::StatusCode, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid or expired OTP")]
    InvalidOtp,

    #[error("Too many failed attempts, locked until {until}")]
    OtpLocked { until: DateTime<Utc> },

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Wrong token type")]
    WrongTokenType,

    #[error("Insufficient scope")]
    InsufficientScope,

    #[error("Social provider verification failed: {0}")]
    ProviderVerification(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Phone already registered")]
    PhoneAlreadyRegistered,

    #[error("Phone in use by another account")]
    PhoneInUse,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error body returned to clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl IdentityError {
    /// Stable machine-readable code for the API boundary.
    ///
    /// All token failures share one code so callers cannot probe token structure.
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::Validation(_) => "validation_error",
            IdentityError::InvalidOtp => "invalid_or_expired_otp",
            IdentityError::OtpLocked { .. } => "otp_locked",
            IdentityError::MissingToken => "missing_token",
            IdentityError::InvalidToken
            | IdentityError::TokenRevoked
            | IdentityError::WrongTokenType
            | IdentityError::ProviderVerification(_) => "unauthorized",
            IdentityError::InsufficientScope => "insufficient_scope",
            IdentityError::UserNotFound => "not_found",
            IdentityError::PhoneAlreadyRegistered | IdentityError::PhoneInUse => "phone_in_use",
            IdentityError::Database(_)
            | IdentityError::Redis(_)
            | IdentityError::Http(_)
            | IdentityError::Internal(_) => "internal_error",
        }
    }

    /// Client-facing message; internal details stay in the logs
    fn public_message(&self) -> String {
        match self {
            IdentityError::Validation(msg) => msg.clone(),
            IdentityError::InvalidToken
            | IdentityError::TokenRevoked
            | IdentityError::WrongTokenType
            | IdentityError::ProviderVerification(_) => "Unauthorized".to_string(),
            IdentityError::Database(_)
            | IdentityError::Redis(_)
            | IdentityError::Http(_)
            | IdentityError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Seconds until an OTP lock lifts, rounded up
    pub fn retry_after_secs(&self) -> Option<i64> {
        match self {
            IdentityError::OtpLocked { until } => {
                let remaining = (*until - Utc::now()).num_milliseconds();
                Some(((remaining + 999) / 1000).max(1))
            }
            _ => None,
        }
    }
}

impl ResponseError for IdentityError {
    fn status_code(&self) -> StatusCode {
        match self {
            IdentityError::Validation(_) | IdentityError::InvalidOtp => StatusCode::BAD_REQUEST,
            IdentityError::MissingToken
            | IdentityError::InvalidToken
            | IdentityError::TokenRevoked
            | IdentityError::WrongTokenType
            | IdentityError::ProviderVerification(_) => StatusCode::UNAUTHORIZED,
            IdentityError::InsufficientScope => StatusCode::FORBIDDEN,
            IdentityError::UserNotFound => StatusCode::NOT_FOUND,
            IdentityError::PhoneAlreadyRegistered | IdentityError::PhoneInUse => {
                StatusCode::CONFLICT
            }
            IdentityError::OtpLocked { .. } => StatusCode::TOO_MANY_REQUESTS,
            IdentityError::Database(_)
            | IdentityError::Redis(_)
            | IdentityError::Http(_)
            | IdentityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(reason = %self, "Authentication rejected");
        }

        let mut builder = HttpResponse::build(status);
        if let Some(secs) = self.retry_after_secs() {
            builder.insert_header((header::RETRY_AFTER, secs.to_string()));
        }
        builder.json(ErrorResponse {
            error: self.code(),
            message: self.public_message(),
        })
    }
}

// Conversions from external error types
impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        IdentityError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for IdentityError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        IdentityError::Redis(err.to_string())
    }
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!("HTTP client error: {}", err);
        IdentityError::Http(err.to_string())
    }
}

impl From<anyhow::Error> for IdentityError {
    fn from(err: anyhow::Error) -> Self {
        IdentityError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for IdentityError {
    fn from(err: validator::ValidationErrors) -> Self {
        IdentityError::Validation(err.to_string())
    }
}
