//! Sliding-window admission control keyed by client address.
//!
//! Each key keeps the instants of its accepted requests. An entry counts while
//! `now - t < window`; older entries are pruned when the key is next touched.
//! Keys whose windows have emptied are evicted by a sweep that runs at most
//! once per window (piggybacked on `admit`), or on demand via `cleanup`.
//!
//! `retry_after` on rejection is the time until the oldest retained entry
//! leaves the window, so it is always positive and never longer than `window`.
//!
//! Single-process and in-memory: best-effort protection, not a global quota.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use super::clock::Clock;
use super::config::{bounded_span, RateLimitConfig, MAX_RATE_LIMIT_WINDOW};
use super::error::AuthError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub retry_after: Duration,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    /// `retry_after` rounded up to whole seconds, at least one.
    #[must_use]
    pub fn retry_after_seconds(&self) -> u64 {
        whole_seconds(self.retry_after)
    }
}

/// Round up to whole seconds, never below one.
#[must_use]
pub fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    let rounded = if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    };
    rounded.max(1)
}

#[derive(Debug, Default)]
struct Windows {
    by_key: HashMap<String, VecDeque<DateTime<Utc>>>,
    last_sweep: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<Windows>,
    config: RateLimitConfig,
    span: chrono::Duration,
    clock: Arc<dyn Clock>,
}

/// Start of the window ending at `now`; saturates at the earliest instant.
fn window_start(now: DateTime<Utc>, span: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn prune(entries: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    while entries.front().is_some_and(|&t| t <= cutoff) {
        entries.pop_front();
    }
}

impl RateLimiter {
    /// # Errors
    /// Returns `AuthError::Configuration` when the window is above
    /// [`MAX_RATE_LIMIT_WINDOW`].
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let span = bounded_span("rate limit window", config.window(), MAX_RATE_LIMIT_WINDOW)?;
        Ok(Self {
            windows: Mutex::new(Windows::default()),
            config,
            span,
            clock,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn windows(&self) -> MutexGuard<'_, Windows> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit against the configured limit and window.
    pub fn check(&self, key: &str) -> Admission {
        self.admit_within(key, self.config.requests(), self.config.window(), self.span)
    }

    /// Record a request for `key` if fewer than `limit` were accepted within
    /// the trailing `window`; otherwise reject without recording.
    ///
    /// # Errors
    /// Returns `AuthError::Configuration` when `window` is above
    /// [`MAX_RATE_LIMIT_WINDOW`].
    pub fn admit(&self, key: &str, limit: usize, window: Duration) -> Result<Admission, AuthError> {
        let span = bounded_span("rate limit window", window, MAX_RATE_LIMIT_WINDOW)?;
        Ok(self.admit_within(key, limit, window, span))
    }

    fn admit_within(
        &self,
        key: &str,
        limit: usize,
        window: Duration,
        span: chrono::Duration,
    ) -> Admission {
        let now = self.clock.now();
        let cutoff = window_start(now, span);

        let mut windows = self.windows();
        if windows
            .last_sweep
            .map_or(true, |last| now - last >= span)
        {
            sweep(&mut windows.by_key, cutoff);
            windows.last_sweep = Some(now);
        }

        let entries = windows.by_key.entry(key.to_string()).or_default();
        prune(entries, cutoff);

        if entries.len() >= limit {
            let retry_after = entries
                .front()
                .and_then(|&oldest| oldest.checked_add_signed(span))
                .and_then(|leaves| (leaves - now).to_std().ok())
                .filter(|wait| !wait.is_zero())
                .unwrap_or(window);
            if entries.is_empty() {
                windows.by_key.remove(key);
            }
            debug!(key, limit, "rate limit exceeded");
            return Admission {
                allowed: false,
                retry_after,
            };
        }

        entries.push_back(now);
        Admission::allowed()
    }

    /// Prune every key and drop those left empty.
    pub fn cleanup(&self) {
        let cutoff = window_start(self.clock.now(), self.span);
        let mut windows = self.windows();
        sweep(&mut windows.by_key, cutoff);
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows().by_key.len()
    }

    /// Run `cleanup` every `interval` on the current tokio runtime.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                timer.tick().await;
                limiter.cleanup();
            }
        })
    }
}

fn sweep(by_key: &mut HashMap<String, VecDeque<DateTime<Utc>>>, cutoff: DateTime<Utc>) {
    let before = by_key.len();
    by_key.retain(|_, entries| {
        prune(entries, cutoff);
        !entries.is_empty()
    });
    let evicted = before - by_key.len();
    if evicted > 0 {
        debug!(evicted, "evicted idle rate limit windows");
    }
}
