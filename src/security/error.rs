//! Error taxonomy for the admin security core.
//!
//! Credential failures are flattened before they reach a caller; token and
//! rate-limit failures stay specific. `kind()` keeps the internal detail
//! available for logs.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Message returned for every credential failure, whatever the cause.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "invalid login or password";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Wrong password (or a stale verification that lost a race).
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account not found")]
    AccountNotFound,

    #[error("account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("account inactive")]
    AccountInactive,

    #[error("token expired")]
    ExpiredToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("rate limit exceeded")]
    RateLimitExceeded { retry_after: Duration },

    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("login already exists")]
    DuplicateLogin,

    /// Stored hash could not be parsed; distinct from a mismatch.
    #[error("malformed password hash")]
    MalformedHash,

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidCredentials
            | Self::AccountNotFound
            | Self::AccountLocked { .. }
            | Self::AccountInactive
            | Self::ExpiredToken
            | Self::InvalidToken => 401,
            Self::RateLimitExceeded { .. } => 429,
            Self::WeakPassword { .. } | Self::DuplicateLogin => 400,
            Self::MalformedHash
            | Self::StoreUnavailable(_)
            | Self::Configuration(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Message safe to hand to an unauthenticated caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials
            | Self::AccountNotFound
            | Self::AccountLocked { .. }
            | Self::AccountInactive => INVALID_CREDENTIALS_MESSAGE.to_string(),
            Self::ExpiredToken
            | Self::InvalidToken
            | Self::RateLimitExceeded { .. }
            | Self::WeakPassword { .. }
            | Self::DuplicateLogin => self.to_string(),
            Self::MalformedHash
            | Self::StoreUnavailable(_)
            | Self::Configuration(_)
            | Self::Internal(_) => "internal server error".to_string(),
        }
    }

    /// Stable identifier for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountNotFound => "account_not_found",
            Self::AccountLocked { .. } => "account_locked",
            Self::AccountInactive => "account_inactive",
            Self::ExpiredToken => "expired_token",
            Self::InvalidToken => "invalid_token",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::WeakPassword { .. } => "weak_password",
            Self::DuplicateLogin => "duplicate_login",
            Self::MalformedHash => "malformed_hash",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }

    /// True for every branch the login path reports as "invalid login or password".
    #[must_use]
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::AccountNotFound
                | Self::AccountLocked { .. }
                | Self::AccountInactive
        )
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.code().is_some_and(|code| code.as_ref() == "23505") =>
            {
                Self::DuplicateLogin
            }
            _ => Self::StoreUnavailable(err.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AuthError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::StoreUnavailable("deadline exceeded".to_string())
    }
}
