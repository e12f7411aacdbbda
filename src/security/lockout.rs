//! Failed-attempt accounting and temporary account lockout.
//!
//! Flow Overview:
//! 1) Load the account and reject inactive or locked rows without hashing.
//! 2) Verify the password on the blocking pool, outside any store lock.
//! 3) Settle the attempt in one `transactional_update`: re-check the row,
//!    drop the attempt if the hash changed underneath us, then either reset
//!    the counter or count the failure (locking at the threshold).
//!
//! A counter at or above the threshold whose lock has expired means the next
//! failure starts a fresh count.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::clock::Clock;
use super::config::{bounded_span, LockoutConfig, MAX_LOCKOUT_DURATION};
use super::error::AuthError;
use super::password::PasswordHasher;
use crate::store::{AdminAccount, AdminId, CredentialStore};

const DUMMY_PASSWORD: &str = "bastion-timing-equalizer";

/// Reject rows that may not authenticate right now.
fn ensure_usable(account: &AdminAccount, now: DateTime<Utc>) -> Result<(), AuthError> {
    if !account.active {
        return Err(AuthError::AccountInactive);
    }
    match account.locked_until {
        Some(until) if now < until => Err(AuthError::AccountLocked { until }),
        _ => Ok(()),
    }
}

fn record_failure(
    account: &mut AdminAccount,
    now: DateTime<Utc>,
    threshold: u32,
    lock_for: chrono::Duration,
) -> Result<(), AuthError> {
    if account.failed_attempts >= threshold && !account.is_locked_at(now) {
        account.failed_attempts = 0;
    }
    account.failed_attempts = account.failed_attempts.saturating_add(1);
    if account.failed_attempts >= threshold {
        let until = now.checked_add_signed(lock_for).ok_or_else(|| {
            AuthError::Configuration(format!("lockout of {lock_for} overflows from {now}"))
        })?;
        account.locked_until = Some(until);
    }
    Ok(())
}

fn clear_failures(account: &mut AdminAccount) {
    account.failed_attempts = 0;
    account.locked_until = None;
}

/// What a verified attempt should do to the row.
enum Settle {
    Login,
    Replace(String),
}

pub struct LockoutManager {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    config: LockoutConfig,
    lock_for: chrono::Duration,
    clock: Arc<dyn Clock>,
    dummy_hash: String,
}

impl std::fmt::Debug for LockoutManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LockoutManager {
    /// # Errors
    /// Returns `AuthError::Configuration` if the lockout duration is above
    /// [`MAX_LOCKOUT_DURATION`], or `AuthError::Internal` if the
    /// timing-equalizer hash cannot be built.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        config: LockoutConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let lock_for = bounded_span("lockout duration", config.duration(), MAX_LOCKOUT_DURATION)?;
        let dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(Self {
            store,
            hasher,
            config,
            lock_for,
            clock,
            dummy_hash,
        })
    }

    #[must_use]
    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    #[must_use]
    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    async fn deadline<T, F>(&self, operation: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        tokio::time::timeout(self.config.store_timeout(), operation).await?
    }

    /// Check `password` for `login` and record the outcome on the account.
    ///
    /// # Errors
    /// `AccountNotFound`, `AccountInactive`, `AccountLocked` or
    /// `InvalidCredentials` for rejected attempts; `StoreUnavailable` when the
    /// store fails or misses its deadline.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<AdminAccount, AuthError> {
        let Some(account) = self.deadline(self.store.find_by_login(login)).await? else {
            let _ = self
                .hasher
                .verify_blocking(password.to_string(), self.dummy_hash.clone())
                .await;
            return Err(AuthError::AccountNotFound);
        };

        ensure_usable(&account, self.clock.now())?;

        let verified = self
            .hasher
            .verify_blocking(password.to_string(), account.password_hash.clone())
            .await?;

        self.settle(&account, verified, Settle::Login).await
    }

    /// Replace the password after checking the current one.
    ///
    /// A wrong `current` counts as a failed attempt, exactly like a failed login.
    ///
    /// # Errors
    /// Same as [`Self::authenticate`].
    #[instrument(skip(self, current, replacement))]
    pub async fn change_password(
        &self,
        id: AdminId,
        current: &str,
        replacement: &str,
    ) -> Result<AdminAccount, AuthError> {
        let account = self.account(id).await?;
        ensure_usable(&account, self.clock.now())?;

        let verified = self
            .hasher
            .verify_blocking(current.to_string(), account.password_hash.clone())
            .await?;
        if !verified {
            return self.settle(&account, false, Settle::Login).await;
        }

        let new_hash = self.hasher.hash_blocking(replacement.to_string()).await?;
        self.settle(&account, true, Settle::Replace(new_hash)).await
    }

    /// Persist the result of a verification made against `snapshot`.
    async fn settle(
        &self,
        snapshot: &AdminAccount,
        verified: bool,
        settle: Settle,
    ) -> Result<AdminAccount, AuthError> {
        let now = self.clock.now();
        let threshold = self.config.threshold();
        let lock_for = self.lock_for;
        let verified_hash = snapshot.password_hash.clone();

        let stored = self
            .deadline(self.store.transactional_update(
                snapshot.id,
                Box::new(move |row: &mut AdminAccount| {
                    ensure_usable(row, now)?;
                    if row.password_hash != verified_hash {
                        // password changed since verification
                        return Err(AuthError::InvalidCredentials);
                    }
                    if !verified {
                        return record_failure(row, now, threshold, lock_for);
                    }
                    clear_failures(row);
                    match settle {
                        Settle::Login => row.last_login_at = Some(now),
                        Settle::Replace(hash) => row.password_hash = hash,
                    }
                    Ok(())
                }),
            ))
            .await?;

        if verified {
            return Ok(stored);
        }

        if let Some(until) = stored.locked_until.filter(|_| stored.is_locked_at(now)) {
            warn!(
                admin_id = stored.id,
                login = %stored.login,
                failed_attempts = stored.failed_attempts,
                %until,
                "account locked after repeated failures"
            );
        }
        Err(AuthError::InvalidCredentials)
    }

    /// # Errors
    /// `AccountNotFound` for unknown ids; `StoreUnavailable` on store failure.
    pub async fn account(&self, id: AdminId) -> Result<AdminAccount, AuthError> {
        self.deadline(self.store.find_by_id(id))
            .await?
            .ok_or(AuthError::AccountNotFound)
    }

    /// # Errors
    /// `StoreUnavailable` when the store cannot be reached in time.
    pub async fn ping(&self) -> Result<(), AuthError> {
        self.deadline(self.store.ping()).await
    }

    /// Hash `password` and insert a new active account.
    ///
    /// # Errors
    /// `DuplicateLogin` when the login is taken; `StoreUnavailable` on store failure.
    #[instrument(skip(self, password))]
    pub async fn create(&self, login: &str, password: &str) -> Result<AdminAccount, AuthError> {
        let hash = self.hasher.hash_blocking(password.to_string()).await?;
        let account = self.deadline(self.store.create(login, &hash)).await?;
        info!(admin_id = account.id, login = %account.login, "admin account created");
        Ok(account)
    }

    /// Reset the failure counter and clear any lock.
    ///
    /// # Errors
    /// `AccountNotFound` for unknown ids; `StoreUnavailable` on store failure.
    #[instrument(skip(self))]
    pub async fn unlock(&self, id: AdminId) -> Result<AdminAccount, AuthError> {
        let account = self
            .deadline(
                self.store
                    .transactional_update(id, Box::new(|row: &mut AdminAccount| {
                        clear_failures(row);
                        Ok(())
                    })),
            )
            .await?;
        info!(admin_id = account.id, login = %account.login, "admin account unlocked");
        Ok(account)
    }

    /// # Errors
    /// `AccountNotFound` for unknown ids; `StoreUnavailable` on store failure.
    #[instrument(skip(self))]
    pub async fn set_active(&self, id: AdminId, active: bool) -> Result<AdminAccount, AuthError> {
        let account = self
            .deadline(self.store.transactional_update(
                id,
                Box::new(move |row: &mut AdminAccount| {
                    row.active = active;
                    Ok(())
                }),
            ))
            .await?;
        info!(
            admin_id = account.id,
            login = %account.login,
            active = account.active,
            "admin account status changed"
        );
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;
    use crate::security::config::HasherConfig;
    use crate::store::MemoryCredentialStore;
    use chrono::Duration;

    fn row(failed_attempts: u32, locked_until: Option<DateTime<Utc>>) -> AdminAccount {
        let now = Utc::now();
        AdminAccount {
            id: 1,
            login: "ops".to_string(),
            password_hash: String::new(),
            active: true,
            failed_attempts,
            locked_until,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct Fixture {
        manager: LockoutManager,
        clock: Arc<ManualClock>,
        store: Arc<MemoryCredentialStore>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryCredentialStore::new(clock.clone()));
        let hasher = PasswordHasher::new(HasherConfig::insecure_fast()).expect("hasher");
        let manager = LockoutManager::new(
            store.clone(),
            hasher,
            LockoutConfig::default(),
            clock.clone(),
        )
        .expect("manager");
        Fixture {
            manager,
            clock,
            store,
        }
    }

    #[test]
    fn failure_locks_at_threshold() -> Result<(), AuthError> {
        let now = Utc::now();
        let mut account = row(4, None);
        record_failure(&mut account, now, 5, Duration::minutes(15))?;
        assert_eq!(account.failed_attempts, 5);
        assert_eq!(account.locked_until, Some(now + Duration::minutes(15)));
        Ok(())
    }

    #[test]
    fn unrepresentable_lock_is_an_error_not_a_panic() {
        let now = Utc::now();
        let mut account = row(4, None);
        assert!(matches!(
            record_failure(&mut account, now, 5, Duration::MAX),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn oversized_lockout_duration_rejected_at_construction() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryCredentialStore::new(clock.clone()));
        let hasher = PasswordHasher::new(HasherConfig::insecure_fast()).expect("hasher");
        for duration in [
            MAX_LOCKOUT_DURATION + std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(u64::MAX),
        ] {
            let result = LockoutManager::new(
                store.clone(),
                hasher.clone(),
                LockoutConfig::default().with_duration(duration),
                clock.clone(),
            );
            assert!(matches!(result, Err(AuthError::Configuration(_))));
        }
    }

    #[tokio::test]
    async fn longest_lockout_still_locks() -> Result<(), AuthError> {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryCredentialStore::new(clock.clone()));
        let hasher = PasswordHasher::new(HasherConfig::insecure_fast())?;
        let manager = LockoutManager::new(
            store,
            hasher,
            LockoutConfig::default().with_duration(MAX_LOCKOUT_DURATION),
            clock.clone(),
        )?;
        let created = manager.create("ops", "correct-password").await?;
        for _ in 0..5 {
            let _ = manager.authenticate("ops", "wrong-password").await;
        }
        let stored = manager.account(created.id).await?;
        assert_eq!(stored.locked_until, Some(clock.now() + Duration::days(7)));
        assert!(matches!(
            manager.authenticate("ops", "correct-password").await,
            Err(AuthError::AccountLocked { .. })
        ));
        Ok(())
    }

    #[test]
    fn failure_after_expired_lock_starts_over() -> Result<(), AuthError> {
        let now = Utc::now();
        let mut account = row(5, Some(now - Duration::seconds(1)));
        record_failure(&mut account, now, 5, Duration::minutes(15))?;
        assert_eq!(account.failed_attempts, 1);
        assert_eq!(account.locked_until, Some(now - Duration::seconds(1)));
        assert!(!account.is_locked_at(now));
        Ok(())
    }

    #[test]
    fn usable_checks_inactive_before_lock() {
        let now = Utc::now();
        let mut account = row(5, Some(now + Duration::minutes(1)));
        account.active = false;
        assert_eq!(ensure_usable(&account, now), Err(AuthError::AccountInactive));
        account.active = true;
        assert!(matches!(
            ensure_usable(&account, now),
            Err(AuthError::AccountLocked { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_login_is_not_found() {
        let fx = fixture();
        assert_eq!(
            fx.manager.authenticate("ghost", "whatever").await,
            Err(AuthError::AccountNotFound)
        );
    }

    #[tokio::test]
    async fn success_records_last_login() -> Result<(), AuthError> {
        let fx = fixture();
        fx.manager.create("ops", "correct-password").await?;
        let account = fx.manager.authenticate("OPS", "correct-password").await?;
        assert_eq!(account.failed_attempts, 0);
        assert_eq!(account.last_login_at, Some(fx.clock.now()));
        Ok(())
    }

    #[tokio::test]
    async fn locked_account_rejects_correct_password() -> Result<(), AuthError> {
        let fx = fixture();
        let created = fx.manager.create("ops", "correct-password").await?;
        for _ in 0..5 {
            assert_eq!(
                fx.manager.authenticate("ops", "wrong-password").await,
                Err(AuthError::InvalidCredentials)
            );
        }
        assert!(matches!(
            fx.manager.authenticate("ops", "correct-password").await,
            Err(AuthError::AccountLocked { .. })
        ));

        let stored = fx.manager.account(created.id).await?;
        assert_eq!(stored.failed_attempts, 5);
        assert_eq!(stored.last_login_at, None);
        Ok(())
    }

    #[tokio::test]
    async fn unlock_clears_counter_and_lock() -> Result<(), AuthError> {
        let fx = fixture();
        let created = fx.manager.create("ops", "correct-password").await?;
        for _ in 0..5 {
            let _ = fx.manager.authenticate("ops", "wrong-password").await;
        }
        let unlocked = fx.manager.unlock(created.id).await?;
        assert_eq!(unlocked.failed_attempts, 0);
        assert_eq!(unlocked.locked_until, None);
        fx.manager.authenticate("ops", "correct-password").await?;
        Ok(())
    }

    #[tokio::test]
    async fn inactive_account_leaves_counter_alone() -> Result<(), AuthError> {
        let fx = fixture();
        let created = fx.manager.create("ops", "correct-password").await?;
        fx.manager.set_active(created.id, false).await?;
        assert_eq!(
            fx.manager.authenticate("ops", "wrong-password").await,
            Err(AuthError::AccountInactive)
        );
        let stored = fx.store.find_by_id(created.id).await?.expect("row");
        assert_eq!(stored.failed_attempts, 0);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_current_password_counts_as_failure() -> Result<(), AuthError> {
        let fx = fixture();
        let created = fx.manager.create("ops", "correct-password").await?;
        assert_eq!(
            fx.manager
                .change_password(created.id, "not-it", "replacement-password")
                .await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(fx.manager.account(created.id).await?.failed_attempts, 1);
        Ok(())
    }

    #[tokio::test]
    async fn stale_verification_is_not_counted() -> Result<(), AuthError> {
        let fx = fixture();
        let created = fx.manager.create("ops", "correct-password").await?;
        let snapshot = fx.manager.account(created.id).await?;

        fx.manager
            .change_password(created.id, "correct-password", "replacement-password")
            .await?;

        assert_eq!(
            fx.manager.settle(&snapshot, false, Settle::Login).await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(fx.manager.account(created.id).await?.failed_attempts, 0);
        Ok(())
    }
}
