//! Durable admin account records.
//!
//! Flow Overview:
//! 1) Lookups (`find_by_login`, `find_by_id`) return a snapshot of the row.
//! 2) Every mutation goes through `transactional_update`, which applies a
//!    closure to the row under a per-row lock and persists it in one step.
//! 3) A closure error aborts the update; nothing is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::security::error::AuthError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

pub type AdminId = i64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AdminAccount {
    pub id: AdminId,
    pub login: String,
    #[serde(skip)]
    pub password_hash: String,
    pub active: bool,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdminAccount {
    /// True while `locked_until` lies in the future.
    #[must_use]
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

/// A read-modify-write step applied to one account row while it is locked.
pub type Mutation = Box<dyn FnOnce(&mut AdminAccount) -> Result<(), AuthError> + Send>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Case-insensitive lookup. `Ok(None)` when the login is unknown.
    async fn find_by_login(&self, login: &str) -> Result<Option<AdminAccount>, AuthError>;

    async fn find_by_id(&self, id: AdminId) -> Result<Option<AdminAccount>, AuthError>;

    /// Insert an active account with zero failed attempts.
    /// Returns `AuthError::DuplicateLogin` when the login is taken.
    async fn create(&self, login: &str, password_hash: &str) -> Result<AdminAccount, AuthError>;

    /// Atomically apply `mutation` to the account and persist the result.
    /// Returns the stored account, `AuthError::AccountNotFound` for unknown ids,
    /// or the closure's own error (with nothing written).
    async fn transactional_update(
        &self,
        id: AdminId,
        mutation: Mutation,
    ) -> Result<AdminAccount, AuthError>;

    /// Cheap liveness check for `/health`.
    async fn ping(&self) -> Result<(), AuthError>;
}
