use std::sync::Arc;

use tracing::{debug, instrument};

use crate::auth::password::CredentialManager;
use crate::error::AccountResult;
use crate::users::repo::UserStore;
use crate::users::repo_types::User;
use crate::users::validation::validate_user;

/// Write path for user records: validate, hash a modified password, persist.
#[derive(Clone)]
pub struct Users {
    store: Arc<dyn UserStore>,
    credentials: CredentialManager,
}

impl Users {
    pub fn new(store: Arc<dyn UserStore>, credentials: CredentialManager) -> Self {
        Self { store, credentials }
    }

    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    /// Persists `user`. Nothing is written if validation or hashing fails.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn save(&self, user: &mut User) -> AccountResult<()> {
        validate_user(user)?;

        if let Some(raw) = user.pending_password().map(|p| p.password.clone()) {
            self.credentials.commit_password(user, &raw).await?;
        }

        if user.is_new() {
            self.store.insert(user).await?;
            user.mark_persisted();
            debug!("user created");
        } else {
            self.store.update(user).await?;
            user.version += 1;
            debug!(version = user.version, "user updated");
        }
        Ok(())
    }
}
