//! In-process credential store.
//!
//! Rows live behind one mutex; `transactional_update` runs the mutation on a
//! copy while the mutex is held and swaps it in only when the closure succeeds.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{AdminAccount, AdminId, CredentialStore, Mutation};
use crate::security::clock::{Clock, SystemClock};
use crate::security::error::AuthError;

#[derive(Debug, Default)]
struct Rows {
    next_id: AdminId,
    by_id: HashMap<AdminId, AdminAccount>,
}

#[derive(Debug, Clone)]
pub struct MemoryCredentialStore {
    rows: Arc<Mutex<Rows>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(Rows::default())),
            clock,
        }
    }

    fn rows(&self) -> MutexGuard<'_, Rows> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_login(&self, login: &str) -> Result<Option<AdminAccount>, AuthError> {
        let wanted = login.to_lowercase();
        Ok(self
            .rows()
            .by_id
            .values()
            .find(|account| account.login.to_lowercase() == wanted)
            .cloned())
    }

    async fn find_by_id(&self, id: AdminId) -> Result<Option<AdminAccount>, AuthError> {
        Ok(self.rows().by_id.get(&id).cloned())
    }

    async fn create(&self, login: &str, password_hash: &str) -> Result<AdminAccount, AuthError> {
        let now = self.clock.now();
        let mut rows = self.rows();
        let wanted = login.to_lowercase();
        if rows
            .by_id
            .values()
            .any(|account| account.login.to_lowercase() == wanted)
        {
            return Err(AuthError::DuplicateLogin);
        }

        rows.next_id += 1;
        let account = AdminAccount {
            id: rows.next_id,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            active: true,
            failed_attempts: 0,
            locked_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        rows.by_id.insert(account.id, account.clone());
        Ok(account)
    }

    async fn transactional_update(
        &self,
        id: AdminId,
        mutation: Mutation,
    ) -> Result<AdminAccount, AuthError> {
        let now = self.clock.now();
        let mut rows = self.rows();
        let current = rows.by_id.get(&id).ok_or(AuthError::AccountNotFound)?;

        let mut updated = current.clone();
        mutation(&mut updated)?;
        updated.id = id;
        updated.updated_at = now;

        rows.by_id.insert(id, updated.clone());
        Ok(updated)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
