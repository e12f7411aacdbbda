//! Configuration values handed to each security component at construction.

use secrecy::SecretString;
use std::time::Duration;

use super::error::AuthError;

const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;
const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(15 * 60);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_ISSUER: &str = "bastion-admin";
const DEFAULT_AUDIENCE: &str = "admin-panel";
const DEFAULT_RATE_LIMIT_REQUESTS: usize = 200;
const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

pub const MIN_SECRET_BYTES: usize = 32;
pub const MIN_PASSWORD_CHARS: usize = 8;

pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(8760 * 60 * 60);
pub const MAX_LOCKOUT_DURATION: Duration = Duration::from_secs(10_080 * 60);
pub const MAX_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10_080 * 60);

/// Convert a configured duration for timestamp arithmetic, refusing anything
/// above `max`.
///
/// # Errors
/// `AuthError::Configuration` when `duration` exceeds `max` or cannot be
/// represented as a `chrono::Duration`.
pub fn bounded_span(
    what: &str,
    duration: Duration,
    max: Duration,
) -> Result<chrono::Duration, AuthError> {
    if duration > max {
        return Err(AuthError::Configuration(format!(
            "{what} of {}s exceeds the maximum of {}s",
            duration.as_secs(),
            max.as_secs()
        )));
    }
    chrono::Duration::from_std(duration)
        .map_err(|err| AuthError::Configuration(format!("invalid {what}: {err}")))
}

/// Argon2id work factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HasherConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl HasherConfig {
    /// Smallest parameters argon2 accepts; only for tests and local tooling.
    #[must_use]
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LockoutConfig {
    threshold: u32,
    duration: Duration,
    store_timeout: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_LOCKOUT_THRESHOLD,
            duration: DEFAULT_LOCKOUT_DURATION,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl LockoutConfig {
    #[must_use]
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    secret: SecretString,
    ttl: Duration,
    issuer: String,
    audience: String,
}

impl TokenConfig {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            ttl: DEFAULT_TOKEN_TTL,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = audience;
        self
    }

    #[must_use]
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    requests: usize,
    window: Duration,
    trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_REQUESTS, DEFAULT_RATE_LIMIT_WINDOW)
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn new(requests: usize, window: Duration) -> Self {
        Self {
            requests,
            window,
            trust_proxy_headers: false,
        }
    }

    /// Key clients by `X-Forwarded-For`/`X-Real-IP` instead of the peer address.
    #[must_use]
    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }

    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Zero requests means the HTTP layer does not limit at all.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.requests > 0
    }
}

/// Everything the [`crate::security::Security`] facade needs.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub hasher: HasherConfig,
    pub lockout: LockoutConfig,
    pub token: TokenConfig,
    pub rate_limit: RateLimitConfig,
}

impl SecurityConfig {
    #[must_use]
    pub fn new(token: TokenConfig) -> Self {
        Self {
            hasher: HasherConfig::default(),
            lockout: LockoutConfig::default(),
            token,
            rate_limit: RateLimitConfig::default(),
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: HasherConfig) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutConfig) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}
