//! Account directory boundary.
//!
//! The directory is the only durable shared state of the auth flow. Every
//! mutating operation is atomic per account, so two concurrent sign-ups for the
//! same identity serialize on the row and a token request always observes one
//! completed secret write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use critica_auth::{Account, Email, NewAccount, PendingConfirmation, ProfileChanges, Username};
use critica_core::AccountId;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryAccountStore;
pub use postgres::PostgresAccountStore;

/// Account store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Username or email is already taken by a different account.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("account not found")]
    NotFound,
    #[error("storage error: {0}")]
    Backend(String),
}

/// Persistent account store (the user directory).
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn find_by_username(&self, username: &Username) -> Result<Option<Account>, StoreError>;

    async fn find_by_username_and_email(
        &self,
        username: &Username,
        email: &Email,
    ) -> Result<Option<Account>, StoreError>;

    /// Return the account owning exactly this (username, email) pair, creating it
    /// if neither value is taken.
    ///
    /// A clash on one field with a mismatch on the other is a `Conflict` and
    /// leaves the directory untouched.
    async fn create_or_fetch(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError>;

    /// Overwrite the pending confirmation of one account (single-row write).
    async fn rotate_confirmation(
        &self,
        id: AccountId,
        pending: PendingConfirmation,
    ) -> Result<Account, StoreError>;

    /// Strict insert: any username or email clash is a `Conflict`.
    async fn insert(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError>;

    /// All accounts ordered by username.
    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    /// Apply a partial update; renames keep username/email unique.
    async fn update_profile(&self, id: AccountId, changes: ProfileChanges) -> Result<Account, StoreError>;

    async fn delete(&self, username: &Username) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> AccountStore for Arc<S>
where
    S: AccountStore + ?Sized,
{
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<Account>, StoreError> {
        (**self).find_by_username(username).await
    }

    async fn find_by_username_and_email(
        &self,
        username: &Username,
        email: &Email,
    ) -> Result<Option<Account>, StoreError> {
        (**self).find_by_username_and_email(username, email).await
    }

    async fn create_or_fetch(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError> {
        (**self).create_or_fetch(new, now).await
    }

    async fn rotate_confirmation(
        &self,
        id: AccountId,
        pending: PendingConfirmation,
    ) -> Result<Account, StoreError> {
        (**self).rotate_confirmation(id, pending).await
    }

    async fn insert(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError> {
        (**self).insert(new, now).await
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        (**self).list().await
    }

    async fn update_profile(&self, id: AccountId, changes: ProfileChanges) -> Result<Account, StoreError> {
        (**self).update_profile(id, changes).await
    }

    async fn delete(&self, username: &Username) -> Result<(), StoreError> {
        (**self).delete(username).await
    }
}

/// How a sign-up request relates to the existing directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SignupMatch {
    Fresh,
    Existing(Account),
    Conflict(String),
}

/// Classify a sign-up from the accounts currently holding its username and email.
pub(crate) fn classify_signup(by_username: Option<&Account>, by_email: Option<&Account>) -> SignupMatch {
    match (by_username, by_email) {
        (None, None) => SignupMatch::Fresh,
        (Some(u), Some(e)) if u.id == e.id => SignupMatch::Existing(u.clone()),
        (Some(_), _) => SignupMatch::Conflict("username is already registered with a different email".into()),
        (None, Some(_)) => SignupMatch::Conflict("email is already registered to a different user".into()),
    }
}

/// Reject renames that would collide with another account.
pub(crate) fn check_rename<'a>(
    id: AccountId,
    changes: &ProfileChanges,
    others: impl IntoIterator<Item = &'a Account>,
) -> Result<(), StoreError> {
    for other in others {
        if other.id == id {
            continue;
        }
        if changes.username.as_ref() == Some(&other.username) {
            return Err(StoreError::Conflict("username is already taken".into()));
        }
        if changes.email.as_ref() == Some(&other.email) {
            return Err(StoreError::Conflict("email is already registered".into()));
        }
    }
    Ok(())
}
