//! Admin session security: password checks with lockout, signed session
//! tokens and per-client rate limiting, behind the [`Security`] facade.

pub mod clock;
pub mod config;
pub mod error;
pub mod lockout;
pub mod password;
pub mod rate_limit;
pub mod token;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use self::clock::Clock;
use self::config::SecurityConfig;
use self::error::AuthError;
use self::lockout::LockoutManager;
use self::password::{ensure_strong, PasswordHasher};
use self::rate_limit::RateLimiter;
use self::token::TokenService;
use crate::store::{AdminAccount, AdminId, CredentialStore};

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub account: AdminAccount,
}

/// Caller identity recovered from a valid bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub admin_id: AdminId,
    pub login: String,
}

#[derive(Debug)]
pub struct Security {
    lockout: LockoutManager,
    tokens: TokenService,
    limiter: Arc<RateLimiter>,
}

impl Security {
    /// # Errors
    /// Returns `AuthError::Configuration` for an unusable hasher or token
    /// secret, or a lockout duration, token TTL or rate limit window above its
    /// maximum.
    pub fn new(
        config: SecurityConfig,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let hasher = PasswordHasher::new(config.hasher)?;
        let lockout = LockoutManager::new(store, hasher, config.lockout, clock.clone())?;
        let tokens = TokenService::new(config.token, clock.clone())?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit, clock)?);
        Ok(Self {
            lockout,
            tokens,
            limiter,
        })
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Authenticate and issue a session token.
    ///
    /// # Errors
    /// Any credential failure (see [`AuthError::is_credential_failure`]) or
    /// `StoreUnavailable`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, login: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let account = match self.lockout.authenticate(login, password).await {
            Ok(account) => account,
            Err(err) => {
                warn!(login, kind = err.kind(), "login rejected: {err}");
                return Err(err);
            }
        };

        let issued = self.tokens.issue(&account)?;
        info!(admin_id = account.id, login = %account.login, "admin logged in");

        Ok(LoginOutcome {
            token: issued.token,
            expires_at: issued.expires_at,
            account,
        })
    }

    /// Validate a bearer token and return who it was issued to.
    ///
    /// # Errors
    /// `ExpiredToken` or `InvalidToken`.
    pub fn authorize(&self, token: &str) -> Result<Identity, AuthError> {
        match self.tokens.validate(token) {
            Ok(claims) => Ok(Identity {
                admin_id: claims.admin_id,
                login: claims.login,
            }),
            Err(err) => {
                warn!(kind = err.kind(), "bearer token rejected");
                Err(err)
            }
        }
    }

    /// # Errors
    /// `WeakPassword` for a short replacement, any credential failure for a
    /// wrong `current`, or `StoreUnavailable`.
    #[instrument(skip(self, current, replacement))]
    pub async fn change_password(
        &self,
        id: AdminId,
        current: &str,
        replacement: &str,
    ) -> Result<(), AuthError> {
        ensure_strong(replacement)?;
        match self.lockout.change_password(id, current, replacement).await {
            Ok(account) => {
                info!(admin_id = account.id, login = %account.login, "password changed");
                Ok(())
            }
            Err(err) => {
                warn!(admin_id = id, kind = err.kind(), "password change rejected: {err}");
                Err(err)
            }
        }
    }

    /// # Errors
    /// `AccountNotFound` or `StoreUnavailable`.
    pub async fn profile(&self, id: AdminId) -> Result<AdminAccount, AuthError> {
        self.lockout.account(id).await
    }

    /// Store liveness for `/health`.
    ///
    /// # Errors
    /// `StoreUnavailable`.
    pub async fn ping(&self) -> Result<(), AuthError> {
        self.lockout.ping().await
    }

    /// # Errors
    /// `WeakPassword`, `DuplicateLogin` or `StoreUnavailable`.
    pub async fn create_admin(&self, login: &str, password: &str) -> Result<AdminAccount, AuthError> {
        ensure_strong(password)?;
        self.lockout.create(login, password).await
    }

    /// # Errors
    /// `AccountNotFound` or `StoreUnavailable`.
    pub async fn unlock(&self, id: AdminId) -> Result<AdminAccount, AuthError> {
        self.lockout.unlock(id).await
    }

    /// # Errors
    /// `AccountNotFound` or `StoreUnavailable`.
    pub async fn set_active(&self, id: AdminId, active: bool) -> Result<AdminAccount, AuthError> {
        self.lockout.set_active(id, active).await
    }
}
