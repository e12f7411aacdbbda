//! Postgres-backed credential store.
//!
//! Flow Overview:
//! 1) Lookups are plain `SELECT`s; `login` is `CITEXT`, so equality is case-insensitive.
//! 2) `transactional_update` takes the row with `SELECT ... FOR UPDATE`, applies the
//!    mutation, writes it back and commits. Dropping the transaction (error,
//!    deadline, cancellation) rolls it back.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::{instrument, Instrument};

use super::{AdminAccount, AdminId, CredentialStore, Mutation};
use crate::security::error::AuthError;

const ACCOUNT_COLUMNS: &str = "id, login::text AS login, hashed_password, is_active, failed_attempts, locked_until, last_login_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn account_from_row(row: &PgRow) -> Result<AdminAccount, AuthError> {
    let failed_attempts: i32 = row.try_get("failed_attempts")?;
    Ok(AdminAccount {
        id: row.try_get("id")?,
        login: row.try_get("login")?,
        password_hash: row.try_get("hashed_password")?,
        active: row.try_get("is_active")?,
        failed_attempts: u32::try_from(failed_attempts).unwrap_or(0),
        locked_until: row.try_get("locked_until")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    #[instrument(skip(self))]
    async fn find_by_login(&self, login: &str) -> Result<Option<AdminAccount>, AuthError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM admins WHERE login = $1 LIMIT 1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(login)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: AdminId) -> Result<Option<AdminAccount>, AuthError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM admins WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self, password_hash))]
    async fn create(&self, login: &str, password_hash: &str) -> Result<AdminAccount, AuthError> {
        let query = format!(
            "INSERT INTO admins (login, hashed_password, is_active) VALUES ($1, $2, TRUE) RETURNING {ACCOUNT_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        let row = sqlx::query(&query)
            .bind(login)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        account_from_row(&row)
    }

    #[instrument(skip(self, mutation))]
    async fn transactional_update(
        &self,
        id: AdminId,
        mutation: Mutation,
    ) -> Result<AdminAccount, AuthError> {
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT {ACCOUNT_COLUMNS} FROM admins WHERE id = $1 FOR UPDATE");
        let select_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .instrument(select_span)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Err(AuthError::AccountNotFound);
        };

        let mut account = account_from_row(&row)?;
        if let Err(err) = mutation(&mut account) {
            tx.rollback().await?;
            return Err(err);
        }

        let failed_attempts = i32::try_from(account.failed_attempts).unwrap_or(i32::MAX);
        let update = format!(
            r"
            UPDATE admins
            SET hashed_password = $2,
                is_active = $3,
                failed_attempts = $4,
                locked_until = $5,
                last_login_at = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let update_span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        let row = sqlx::query(&update)
            .bind(id)
            .bind(&account.password_hash)
            .bind(account.active)
            .bind(failed_attempts)
            .bind(account.locked_until)
            .bind(account.last_login_at)
            .fetch_one(&mut *tx)
            .instrument(update_span)
            .await?;
        let stored = account_from_row(&row)?;

        tx.commit().await?;

        Ok(stored)
    }

    async fn ping(&self) -> Result<(), AuthError> {
        let span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        let mut conn = self.pool.acquire().instrument(span.clone()).await?;
        conn.ping().instrument(span).await?;
        Ok(())
    }
}
