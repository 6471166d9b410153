use std::sync::{Arc, OnceLock};

use time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::mailer::ResetMailer;
use crate::auth::password::CredentialManager;
use crate::auth::random::{OsRandom, SecureRandom};
use crate::auth::reset::{hash_token, ResetTokenIssuer};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::error::{AccountError, AccountResult};
use crate::users::query::{UserFilter, UserPatch};
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, PasswordInput, User};
use crate::users::services::Users;

/// The account flows callers use: registration, login, password reset,
/// token authorization and soft deletion.
pub struct AccountService {
    users: Users,
    credentials: CredentialManager,
    reset: ResetTokenIssuer,
    mailer: Arc<dyn ResetMailer>,
    clock: Arc<dyn Clock>,
    decoy_hash: OnceLock<String>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn UserStore>,
        credentials: CredentialManager,
        reset: ResetTokenIssuer,
        mailer: Arc<dyn ResetMailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users: Users::new(store, credentials.clone()),
            credentials,
            reset,
            mailer,
            clock,
            decoy_hash: OnceLock::new(),
        }
    }

    /// Wires the OS random source and the system clock.
    pub fn from_config(
        cfg: &AppConfig,
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn ResetMailer>,
    ) -> AccountResult<Self> {
        let rng: Arc<dyn SecureRandom> = Arc::new(OsRandom);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let credentials = CredentialManager::new(&cfg.hashing, rng.clone(), clock.clone())?;
        let reset = ResetTokenIssuer::new(
            rng,
            clock.clone(),
            Duration::minutes(cfg.reset.ttl_minutes),
        );
        Ok(Self::new(store, credentials, reset, mailer, clock))
    }

    fn store(&self) -> &dyn UserStore {
        self.users.store()
    }

    fn decoy_hash(&self) -> AccountResult<&str> {
        if let Some(h) = self.decoy_hash.get() {
            return Ok(h);
        }
        let h = self.credentials.hash("decoy-password-for-unknown-accounts")?;
        Ok(self.decoy_hash.get_or_init(|| h))
    }

    #[instrument(skip(self, input))]
    pub async fn register(&self, input: NewUser) -> AccountResult<User> {
        let mut user = User::from_new(input, self.clock.now());
        self.users.save(&mut user).await?;
        user.password = None;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Same error and the same hashing work for an unknown email as for a
    /// wrong password.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AccountResult<User> {
        let found = self
            .store()
            .find_one(&UserFilter::by_email(email).with_password())
            .await?;

        let Some(mut user) = found else {
            self.credentials
                .verify_async(password, self.decoy_hash()?)
                .await?;
            warn!("login unknown email");
            return Err(AccountError::InvalidCredentials);
        };

        let hash = user.password.take().unwrap_or_default();
        if !self.credentials.verify_async(password, &hash).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AccountError::InvalidCredentials);
        }
        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }

    /// Issues a reset token and hands it to the mailer. Unknown emails
    /// succeed silently.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> AccountResult<()> {
        let Some(mut user) = self.store().find_one(&UserFilter::by_email(email)).await? else {
            warn!("password reset for unknown email");
            return Ok(());
        };

        let token = self.reset.issue(&mut user);
        self.users.save(&mut user).await?;

        if let Err(e) = self.mailer.send_reset(&user, &token).await {
            error!(error = %e, user_id = %user.id, "reset delivery failed");
            self.reset.clear(&mut user);
            self.users.save(&mut user).await?;
            return Err(AccountError::Delivery(e));
        }
        Ok(())
    }

    /// Sets a new password if `token` is the live reset token of some
    /// account. The token is spent by the same write; of two concurrent
    /// redemptions only the one whose versioned write lands first succeeds.
    #[instrument(skip(self, token, input))]
    pub async fn complete_password_reset(
        &self,
        token: &str,
        input: PasswordInput,
    ) -> AccountResult<User> {
        let mut user = self
            .store()
            .find_one(&UserFilter::by_reset_token(hash_token(token)))
            .await?
            .ok_or(AccountError::InvalidResetToken)?;

        if !self.reset.validate(&user, token) {
            warn!(user_id = %user.id, "reset token rejected");
            return Err(AccountError::InvalidResetToken);
        }

        user.set_password(input);
        self.reset.clear(&mut user);
        match self.users.save(&mut user).await {
            Ok(()) => {}
            Err(AccountError::WriteConflict) => {
                warn!(user_id = %user.id, "reset token spent by a concurrent request");
                return Err(AccountError::InvalidResetToken);
            }
            Err(e) => return Err(e),
        }
        user.password = None;
        info!(user_id = %user.id, "password reset completed");
        Ok(user)
    }

    /// Rejects a session token issued at `issued_at` (Unix seconds) if the
    /// account is gone or its password changed since.
    #[instrument(skip(self))]
    pub async fn authorize_token(&self, user_id: Uuid, issued_at: i64) -> AccountResult<User> {
        let user = self
            .store()
            .find_one(&UserFilter::by_id(user_id))
            .await?
            .ok_or_else(|| {
                warn!("token for missing or inactive user");
                AccountError::InvalidCredentials
            })?;

        if self.credentials.changed_password_after(&user, issued_at) {
            warn!("token predates password change");
            return Err(AccountError::TokenRevoked);
        }
        Ok(user)
    }

    #[instrument(skip(self, current, input))]
    pub async fn update_password(
        &self,
        user_id: Uuid,
        current: &str,
        input: PasswordInput,
    ) -> AccountResult<User> {
        let mut user = self
            .store()
            .find_one(&UserFilter::by_id(user_id).with_password())
            .await?
            .ok_or(AccountError::NotFound)?;

        let hash = user.password.clone().unwrap_or_default();
        if !self.credentials.verify_async(current, &hash).await? {
            warn!("current password mismatch");
            return Err(AccountError::InvalidCredentials);
        }

        user.set_password(input);
        self.users.save(&mut user).await?;
        user.password = None;
        info!("password updated");
        Ok(user)
    }

    /// Soft delete; the record stays but default reads stop seeing it.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, user_id: Uuid) -> AccountResult<()> {
        let n = self
            .store()
            .update_many(&UserFilter::by_id(user_id), &UserPatch::deactivate())
            .await?;
        if n == 0 {
            return Err(AccountError::NotFound);
        }
        info!("user deactivated");
        Ok(())
    }

    pub async fn list_users(&self, include_inactive: bool) -> AccountResult<Vec<User>> {
        self.store().find_many(&scope(include_inactive)).await
    }

    pub async fn count_users(&self, include_inactive: bool) -> AccountResult<i64> {
        self.store().count(&scope(include_inactive)).await
    }
}

fn scope(include_inactive: bool) -> UserFilter {
    if include_inactive {
        UserFilter::all().including_inactive()
    } else {
        UserFilter::all()
    }
}
