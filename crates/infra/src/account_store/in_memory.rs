use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use critica_auth::{Account, Email, NewAccount, PendingConfirmation, ProfileChanges, Username};
use critica_core::AccountId;

use super::{AccountStore, SignupMatch, StoreError, check_rename, classify_signup};

/// In-memory account directory for tests/dev.
///
/// Every mutating call runs inside one write-lock critical section, which gives
/// the same per-account atomicity a row update gives in Postgres.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    inner: RwLock<HashMap<AccountId, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<AccountId, Account>>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("account store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<AccountId, Account>>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("account store lock poisoned".into()))
    }
}

fn by_username<'a>(map: &'a HashMap<AccountId, Account>, username: &Username) -> Option<&'a Account> {
    map.values().find(|a| &a.username == username)
}

fn by_email<'a>(map: &'a HashMap<AccountId, Account>, email: &Email) -> Option<&'a Account> {
    map.values().find(|a| &a.email == email)
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &Username) -> Result<Option<Account>, StoreError> {
        let map = self.read()?;
        Ok(by_username(&map, username).cloned())
    }

    async fn find_by_username_and_email(
        &self,
        username: &Username,
        email: &Email,
    ) -> Result<Option<Account>, StoreError> {
        let map = self.read()?;
        Ok(by_username(&map, username)
            .filter(|a| &a.email == email)
            .cloned())
    }

    async fn create_or_fetch(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let mut map = self.write()?;

        match classify_signup(by_username(&map, &new.username), by_email(&map, &new.email)) {
            SignupMatch::Existing(account) => Ok(account),
            SignupMatch::Conflict(msg) => Err(StoreError::Conflict(msg)),
            SignupMatch::Fresh => {
                let account = Account::create(new, now);
                map.insert(account.id, account.clone());
                Ok(account)
            }
        }
    }

    async fn rotate_confirmation(
        &self,
        id: AccountId,
        pending: PendingConfirmation,
    ) -> Result<Account, StoreError> {
        let mut map = self.write()?;
        let account = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.confirmation = Some(pending);
        Ok(account.clone())
    }

    async fn insert(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let mut map = self.write()?;
        if by_username(&map, &new.username).is_some() {
            return Err(StoreError::Conflict("username is already taken".into()));
        }
        if by_email(&map, &new.email).is_some() {
            return Err(StoreError::Conflict("email is already registered".into()));
        }
        let account = Account::create(new, now);
        map.insert(account.id, account.clone());
        Ok(account)
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.read()?.values().cloned().collect();
        accounts.sort_by(|a, b| a.username.as_str().cmp(b.username.as_str()));
        Ok(accounts)
    }

    async fn update_profile(&self, id: AccountId, changes: ProfileChanges) -> Result<Account, StoreError> {
        let mut map = self.write()?;
        check_rename(id, &changes, map.values())?;

        let account = map.get_mut(&id).ok_or(StoreError::NotFound)?;
        changes.apply_to(account);
        Ok(account.clone())
    }

    async fn delete(&self, username: &Username) -> Result<(), StoreError> {
        let mut map = self.write()?;
        let id = by_username(&map, username).map(|a| a.id).ok_or(StoreError::NotFound)?;
        map.remove(&id);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use critica_auth::Role;

    fn signup(username: &str, email: &str) -> NewAccount {
        NewAccount::signup(Username::parse(username).unwrap(), Email::parse(email).unwrap())
    }

    #[tokio::test]
    async fn lookups_by_username() {
        let store = InMemoryAccountStore::new();
        let alice = store.insert(signup("alice", "a@x.com"), Utc::now()).await.unwrap();

        let found = store.find_by_username(&alice.username).await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(alice.id));

        let missing = Username::parse("nobody").unwrap();
        assert_eq!(store.find_by_username(&missing).await.unwrap(), None);

        let wrong_email = Email::parse("other@x.com").unwrap();
        assert_eq!(
            store
                .find_by_username_and_email(&alice.username, &wrong_email)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn create_or_fetch_is_idempotent_on_the_pair() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();

        let first = store.create_or_fetch(signup("alice", "a@x.com"), now).await.unwrap();
        let second = store.create_or_fetch(signup("alice", "a@x.com"), now).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mismatched_counterpart_is_a_conflict_and_mutates_nothing() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();
        store.create_or_fetch(signup("alice", "a@x.com"), now).await.unwrap();
        store.create_or_fetch(signup("bob", "b@x.com"), now).await.unwrap();
        let before = store.list().await.unwrap();

        for (u, e) in [("alice", "other@x.com"), ("carol", "a@x.com"), ("alice", "b@x.com")] {
            let err = store.create_or_fetch(signup(u, e), now).await.unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)), "{u}/{e}");
        }

        assert_eq!(store.list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn rotation_overwrites_the_single_pending_secret() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();
        let account = store.create_or_fetch(signup("alice", "a@x.com"), now).await.unwrap();

        let first = PendingConfirmation::mint(now);
        let second = PendingConfirmation::mint(now);
        store.rotate_confirmation(account.id, first).await.unwrap();
        store.rotate_confirmation(account.id, second.clone()).await.unwrap();

        let stored = store
            .find_by_username(&account.username)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.confirmation, Some(second));
    }

    #[tokio::test]
    async fn concurrent_signups_for_one_pair_create_one_account() {
        let store = Arc::new(InMemoryAccountStore::new());
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_or_fetch(signup("dana", "d@x.com"), now).await
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap().id);
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn renames_stay_unique() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();
        let alice = store.create_or_fetch(signup("alice", "a@x.com"), now).await.unwrap();
        store.create_or_fetch(signup("bob", "b@x.com"), now).await.unwrap();

        let clash = ProfileChanges {
            username: Some(Username::parse("bob").unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_profile(alice.id, clash).await,
            Err(StoreError::Conflict(_))
        ));

        let promote = ProfileChanges {
            role: Some(Role::Moderator),
            ..Default::default()
        };
        let updated = store.update_profile(alice.id, promote).await.unwrap();
        assert_eq!(updated.role, Role::Moderator);
    }

    #[tokio::test]
    async fn delete_removes_by_username() {
        let store = InMemoryAccountStore::new();
        let alice = store
            .insert(signup("alice", "a@x.com"), Utc::now())
            .await
            .unwrap();

        store.delete(&alice.username).await.unwrap();
        assert_eq!(store.find_by_id(alice.id).await.unwrap(), None);
        assert_eq!(store.delete(&alice.username).await, Err(StoreError::NotFound));
    }
}
