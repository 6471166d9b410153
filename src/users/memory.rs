use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AccountError, AccountResult};
use crate::users::query::{ReadOp, UserFilter, UserPatch};
use crate::users::repo::UserStore;
use crate::users::repo_types::User;

/// Process-local store with the same visibility and selection rules as
/// the Postgres one.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn project(user: &User, filter: &UserFilter) -> User {
    let mut out = user.clone();
    if !filter.selects_password() {
        out.password = None;
    }
    out
}

fn email_taken(users: &HashMap<Uuid, User>, user: &User) -> bool {
    users
        .values()
        .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: &User) -> AccountResult<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(anyhow::anyhow!("user id {} already stored", user.id).into());
        }
        if email_taken(&users, user) {
            return Err(AccountError::Conflict { field: "email" });
        }
        let mut stored = user.clone();
        stored.clear_pending_password();
        stored.mark_persisted();
        users.insert(user.id, stored);
        Ok(())
    }

    async fn update(&self, user: &User) -> AccountResult<()> {
        let mut users = self.users.write().await;
        if email_taken(&users, user) {
            return Err(AccountError::Conflict { field: "email" });
        }
        let existing = users.get_mut(&user.id).ok_or(AccountError::NotFound)?;
        if existing.version != user.version {
            return Err(AccountError::WriteConflict);
        }
        let kept_hash = existing.password.take();
        *existing = user.clone();
        existing.version += 1;
        existing.clear_pending_password();
        existing.mark_persisted();
        if existing.password.is_none() {
            existing.password = kept_hash;
        }
        Ok(())
    }

    async fn find_one(&self, filter: &UserFilter) -> AccountResult<Option<User>> {
        let users = self.users.read().await;
        let mut hits: Vec<&User> = users
            .values()
            .filter(|u| filter.matches(ReadOp::FindOne, u))
            .collect();
        hits.sort_by_key(|u| u.created_at);
        Ok(hits.first().map(|u| project(u, filter)))
    }

    async fn find_many(&self, filter: &UserFilter) -> AccountResult<Vec<User>> {
        let users = self.users.read().await;
        let mut hits: Vec<User> = users
            .values()
            .filter(|u| filter.matches(ReadOp::FindMany, u))
            .map(|u| project(u, filter))
            .collect();
        hits.sort_by_key(|u| u.created_at);
        Ok(hits)
    }

    async fn count(&self, filter: &UserFilter) -> AccountResult<i64> {
        let users = self.users.read().await;
        let n = users
            .values()
            .filter(|u| filter.matches(ReadOp::Count, u))
            .count();
        Ok(n as i64)
    }

    async fn update_many(&self, filter: &UserFilter, patch: &UserPatch) -> AccountResult<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        let mut users = self.users.write().await;
        let mut n = 0;
        for user in users
            .values_mut()
            .filter(|u| filter.matches(ReadOp::UpdateMany, u))
        {
            patch.apply(user);
            user.version += 1;
            n += 1;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::NewUser;
    use time::OffsetDateTime;

    fn user(email: &str) -> User {
        let mut u = User::from_new(
            NewUser {
                name: "N".into(),
                last_name: "L".into(),
                email: email.into(),
                ..Default::default()
            },
            OffsetDateTime::now_utc(),
        );
        u.password = Some("$argon2id$fake".into());
        u
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = InMemoryUserStore::new();
        store.insert(&user("a@b.co")).await.expect("first insert");
        let err = store.insert(&user("A@B.co")).await.unwrap_err();
        assert!(matches!(err, AccountError::Conflict { field: "email" }));
    }

    #[tokio::test]
    async fn reads_leave_out_password_unless_selected() {
        let store = InMemoryUserStore::new();
        let u = user("a@b.co");
        store.insert(&u).await.unwrap();

        let plain = store.find_one(&UserFilter::by_id(u.id)).await.unwrap().unwrap();
        assert!(plain.password.is_none());
        assert!(!plain.is_new());

        let full = store
            .find_one(&UserFilter::by_id(u.id).with_password())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(full.password.as_deref(), Some("$argon2id$fake"));
    }

    #[tokio::test]
    async fn update_without_password_keeps_stored_hash() {
        let store = InMemoryUserStore::new();
        let u = user("a@b.co");
        store.insert(&u).await.unwrap();

        let mut loaded = store.find_one(&UserFilter::by_id(u.id)).await.unwrap().unwrap();
        loaded.career = Some("Physics".into());
        store.update(&loaded).await.unwrap();

        let full = store
            .find_one(&UserFilter::by_id(u.id).with_password())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(full.career.as_deref(), Some("Physics"));
        assert_eq!(full.password.as_deref(), Some("$argon2id$fake"));
    }

    #[tokio::test]
    async fn inactive_users_hidden_from_default_reads() {
        let store = InMemoryUserStore::new();
        let active = user("a@b.co");
        let gone = user("c@d.co");
        store.insert(&active).await.unwrap();
        store.insert(&gone).await.unwrap();

        let n = store
            .update_many(&UserFilter::by_id(gone.id), &UserPatch::deactivate())
            .await
            .unwrap();
        assert_eq!(n, 1);

        assert_eq!(store.count(&UserFilter::all()).await.unwrap(), 1);
        assert!(store.find_one(&UserFilter::by_id(gone.id)).await.unwrap().is_none());
        let listed = store.find_many(&UserFilter::all()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, active.id);

        // a second deactivation cannot see the record any more
        let again = store
            .update_many(&UserFilter::by_id(gone.id), &UserPatch::deactivate())
            .await
            .unwrap();
        assert_eq!(again, 0);

        let found = store
            .find_one(&UserFilter::by_id(gone.id).including_inactive())
            .await
            .unwrap()
            .expect("override sees inactive");
        assert!(!found.active);
        assert_eq!(
            store.count(&UserFilter::all().including_inactive()).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn reused_id_is_a_store_error_not_an_email_conflict() {
        let store = InMemoryUserStore::new();
        let first = user("a@b.co");
        store.insert(&first).await.unwrap();

        let mut other = user("c@d.co");
        other.id = first.id;
        let err = store.insert(&other).await.unwrap_err();
        assert!(matches!(err, AccountError::Store(_)));
        assert!(err.to_string().contains(&first.id.to_string()));
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = InMemoryUserStore::new();
        let u = user("a@b.co");
        store.insert(&u).await.unwrap();

        let stale = store.find_one(&UserFilter::by_id(u.id)).await.unwrap().unwrap();
        store
            .update_many(&UserFilter::by_id(u.id), &UserPatch::deactivate())
            .await
            .unwrap();

        let err = store.update(&stale).await.unwrap_err();
        assert!(matches!(err, AccountError::WriteConflict));
        let found = store
            .find_one(&UserFilter::by_id(u.id).including_inactive())
            .await
            .unwrap()
            .unwrap();
        assert!(!found.active);
        assert_eq!(found.version, 1);
    }

    #[tokio::test]
    async fn each_update_advances_the_version() {
        let store = InMemoryUserStore::new();
        let u = user("a@b.co");
        store.insert(&u).await.unwrap();

        let mut loaded = store.find_one(&UserFilter::by_id(u.id)).await.unwrap().unwrap();
        assert_eq!(loaded.version, 0);
        store.update(&loaded).await.unwrap();
        // same snapshot a second time is now stale
        assert!(matches!(
            store.update(&loaded).await,
            Err(AccountError::WriteConflict)
        ));
        loaded.version += 1;
        store.update(&loaded).await.unwrap();
    }

    #[tokio::test]
    async fn update_of_missing_user_is_not_found() {
        let store = InMemoryUserStore::new();
        let err = store.update(&user("a@b.co")).await.unwrap_err();
        assert!(matches!(err, AccountError::NotFound));
    }
}
