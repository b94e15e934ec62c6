//! Postgres-backed account directory.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / Other | N/A | `Backend` |
//!
//! ## Atomicity
//!
//! `create_or_fetch` and `update` run inside a transaction that locks the rows
//! they read (`FOR UPDATE`). A racing insert that slips past the lock still hits
//! the unique indexes on `username`/`email` and is resolved by re-reading.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use critica_auth::{
    Account, ConfirmationSecret, Email, NewAccount, PendingConfirmation, ProfileChanges, Role, Username,
};
use critica_core::AccountId;

use super::{AccountStore, SignupMatch, StoreError, check_rename, classify_signup};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id                      UUID PRIMARY KEY,
    username                TEXT NOT NULL UNIQUE,
    email                   TEXT NOT NULL UNIQUE,
    role                    TEXT NOT NULL DEFAULT 'user',
    staff                   BOOLEAN NOT NULL DEFAULT FALSE,
    first_name              TEXT NOT NULL DEFAULT '',
    last_name               TEXT NOT NULL DEFAULT '',
    bio                     TEXT NOT NULL DEFAULT '',
    confirmation_secret     TEXT NULL,
    confirmation_issued_at  TIMESTAMPTZ NULL,
    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const ACCOUNT_COLUMNS: &str = "id, username, email, role, staff, first_name, last_name, bio, \
                               confirmation_secret, confirmation_issued_at, created_at";

/// Postgres-backed [`AccountStore`].
///
/// Uses the SQLx connection pool, which is `Send + Sync` and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct PostgresAccountStore {
    pool: Arc<PgPool>,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool against `url` and make sure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create the `accounts` table if it is missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch_one_where(&self, clause: &str, value: &str, operation: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {clause}");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert_row(
        tx: &mut Transaction<'_, Postgres>,
        account: &Account,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, username, email, role, staff, first_name, last_name, bio, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.username.as_str())
        .bind(account.email.as_str())
        .bind(account.role.as_str())
        .bind(account.staff)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.bio)
        .bind(account.created_at)
        .execute(&mut **tx)
        .await
        .map(|_| ())
    }
}

/// Accounts currently holding `username` or `email`, locked for the transaction.
async fn lock_matches(
    tx: &mut Transaction<'_, Postgres>,
    username: &Username,
    email: &Email,
) -> Result<(Option<Account>, Option<Account>), StoreError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1 OR email = $2 FOR UPDATE");
    let rows = sqlx::query(&sql)
        .bind(username.as_str())
        .bind(email.as_str())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_matches", e))?;

    let mut by_username = None;
    let mut by_email = None;
    for row in &rows {
        let account = account_from_row(row)?;
        if &account.username == username {
            by_username = Some(account.clone());
        }
        if &account.email == email {
            by_email = Some(account);
        }
    }
    Ok((by_username, by_email))
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;

        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self), fields(username = %username), err)]
    async fn find_by_username(&self, username: &Username) -> Result<Option<Account>, StoreError> {
        self.fetch_one_where("username = $1", username.as_str(), "find_by_username")
            .await
    }

    #[instrument(skip(self), fields(username = %username), err)]
    async fn find_by_username_and_email(
        &self,
        username: &Username,
        email: &Email,
    ) -> Result<Option<Account>, StoreError> {
        let found = self.find_by_username(username).await?;
        Ok(found.filter(|a| &a.email == email))
    }

    #[instrument(skip(self, new), fields(username = %new.username, outcome = tracing::field::Empty), err)]
    async fn create_or_fetch(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let span = Span::current();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (by_username, by_email) = lock_matches(&mut tx, &new.username, &new.email).await?;
        let account = match classify_signup(by_username.as_ref(), by_email.as_ref()) {
            SignupMatch::Existing(account) => {
                span.record("outcome", "existing");
                return Ok(account);
            }
            SignupMatch::Conflict(msg) => return Err(StoreError::Conflict(msg)),
            SignupMatch::Fresh => Account::create(new, now),
        };

        match Self::insert_row(&mut tx, &account).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                // Lost a race with a concurrent sign-up; the winner is visible now.
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return match self
                    .find_by_username_and_email(&account.username, &account.email)
                    .await?
                {
                    Some(existing) => Ok(existing),
                    None => Err(StoreError::Conflict(
                        "username or email is already registered".into(),
                    )),
                };
            }
            Err(e) => return Err(map_sqlx_error("insert_account", e)),
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        span.record("outcome", "created");
        Ok(account)
    }

    #[instrument(skip(self, pending), fields(account_id = %id), err)]
    async fn rotate_confirmation(
        &self,
        id: AccountId,
        pending: PendingConfirmation,
    ) -> Result<Account, StoreError> {
        let sql = format!(
            "UPDATE accounts SET confirmation_secret = $2, confirmation_issued_at = $3 \
             WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(pending.secret.expose())
            .bind(pending.issued_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("rotate_confirmation", e))?;

        match row {
            Some(row) => account_from_row(&row),
            None => Err(StoreError::NotFound),
        }
    }

    #[instrument(skip(self, new), fields(username = %new.username), err)]
    async fn insert(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let account = Account::create(new, now);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Self::insert_row(&mut tx, &account)
            .await
            .map_err(|e| map_sqlx_error("insert_account", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(account)
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY username ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_accounts", e))?;

        rows.iter().map(account_from_row).collect()
    }

    #[instrument(skip(self, changes), fields(account_id = %id), err)]
    async fn update_profile(&self, id: AccountId, changes: ProfileChanges) -> Result<Account, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("load_for_update", e))?;
        let mut account = match row {
            Some(row) => account_from_row(&row)?,
            None => return Err(StoreError::NotFound),
        };

        if changes.username.is_some() || changes.email.is_some() {
            let username = changes.username.as_ref().unwrap_or(&account.username);
            let email = changes.email.as_ref().unwrap_or(&account.email);
            let (u, e) = lock_matches(&mut tx, username, email).await?;
            check_rename(id, &changes, u.iter().chain(e.iter()))?;
        }

        changes.apply_to(&mut account);

        sqlx::query(
            r#"
            UPDATE accounts SET
                username = $2,
                email = $3,
                role = $4,
                first_name = $5,
                last_name = $6,
                bio = $7
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(account.username.as_str())
        .bind(account.email.as_str())
        .bind(account.role.as_str())
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.bio)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_account", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(account)
    }

    #[instrument(skip(self), fields(username = %username), err)]
    async fn delete(&self, username: &Username) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM accounts WHERE username = $1")
            .bind(username.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_account", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode account row: {e}"));
    let invalid = |field: &str, e: &dyn std::fmt::Display| {
        StoreError::Backend(format!("stored {field} is invalid: {e}"))
    };

    let username: String = row.try_get("username").map_err(decode)?;
    let email: String = row.try_get("email").map_err(decode)?;
    let role: String = row.try_get("role").map_err(decode)?;
    let secret: Option<String> = row.try_get("confirmation_secret").map_err(decode)?;
    let issued_at: Option<DateTime<Utc>> = row.try_get("confirmation_issued_at").map_err(decode)?;

    let confirmation = match (secret, issued_at) {
        (Some(secret), Some(issued_at)) => Some(PendingConfirmation {
            secret: ConfirmationSecret::from_stored(secret),
            issued_at,
        }),
        _ => None,
    };

    Ok(Account {
        id: AccountId::from_uuid(row.try_get("id").map_err(decode)?),
        username: Username::parse(&username).map_err(|e| invalid("username", &e))?,
        email: Email::parse(&email).map_err(|e| invalid("email", &e))?,
        role: role.parse::<Role>().map_err(|e| invalid("role", &e))?,
        staff: row.try_get("staff").map_err(decode)?,
        first_name: row.try_get("first_name").map_err(decode)?,
        last_name: row.try_get("last_name").map_err(decode)?,
        bio: row.try_get("bio").map_err(decode)?,
        confirmation,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => {
                    StoreError::Conflict("username or email is already registered".into())
                }
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
