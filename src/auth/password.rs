use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::{debug, error, warn};

use crate::auth::random::SecureRandom;
use crate::clock::{truncate_to_seconds, Clock};
use crate::config::HashingConfig;
use crate::error::{AccountError, AccountResult};
use crate::users::repo_types::User;

const SALT_LEN: usize = 16;

/// One-way password hashing scheme behind [`CredentialManager`].
pub trait CredentialHasher: Send + Sync {
    /// Hashes `plain` with the given salt bytes into a PHC string.
    fn hash(&self, plain: &str, salt: &[u8]) -> AccountResult<String>;
    /// Checks `plain` against a stored PHC string; false on any mismatch
    /// or malformed input.
    fn verify(&self, plain: &str, stored: &str) -> bool;
}

/// Argon2id with configurable cost.
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new(cfg: &HashingConfig) -> AccountResult<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| {
                error!(error = %e, "invalid argon2 parameters");
                AccountError::Hashing(e.to_string())
            })?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plain: &str, salt: &[u8]) -> AccountResult<String> {
        let salt = SaltString::encode_b64(salt).map_err(|e| AccountError::Hashing(e.to_string()))?;
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                AccountError::Hashing(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, plain: &str, stored: &str) -> bool {
        let parsed = match PasswordHash::new(stored) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "stored password hash is malformed");
                return false;
            }
        };
        self.argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Hashes, verifies and tracks password changes on a [`User`].
#[derive(Clone)]
pub struct CredentialManager {
    hasher: Arc<dyn CredentialHasher>,
    rng: Arc<dyn SecureRandom>,
    clock: Arc<dyn Clock>,
}

impl CredentialManager {
    /// Argon2id manager built from `cfg`.
    pub fn new(
        cfg: &HashingConfig,
        rng: Arc<dyn SecureRandom>,
        clock: Arc<dyn Clock>,
    ) -> AccountResult<Self> {
        let hasher = Argon2Hasher::new(cfg)?;
        Ok(Self::with_hasher(Arc::new(hasher), rng, clock))
    }

    pub fn with_hasher(
        hasher: Arc<dyn CredentialHasher>,
        rng: Arc<dyn SecureRandom>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { hasher, rng, clock }
    }

    fn salt(&self) -> [u8; SALT_LEN] {
        let mut bytes = [0u8; SALT_LEN];
        self.rng.fill(&mut bytes);
        bytes
    }

    /// Blocking hash of `plain` into a PHC string.
    pub fn hash(&self, plain: &str) -> AccountResult<String> {
        self.hasher.hash(plain, &self.salt())
    }

    /// Hashes `raw` on the blocking pool and stores it as the record's credential.
    ///
    /// Clears the staged password and confirmation. The change timestamp is
    /// only set when the record already existed: a brand new account has no
    /// earlier tokens to revoke. On error the record is left untouched.
    pub async fn commit_password(&self, user: &mut User, raw: &str) -> AccountResult<()> {
        let salt = self.salt();
        let hasher = self.hasher.clone();
        let raw = raw.to_owned();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&raw, &salt))
            .await
            .map_err(|e| {
                error!(error = %e, "hashing worker failed");
                AccountError::Hashing(e.to_string())
            })??;

        user.password = Some(hash);
        user.clear_pending_password();
        if !user.is_new() {
            user.password_changed_at = Some(truncate_to_seconds(self.clock.now()));
        }
        debug!(user_id = %user.id, first_set = user.is_new(), "password committed");
        Ok(())
    }

    /// Timing-safe check of `plain` against a stored PHC string.
    pub fn verify(&self, plain: &str, stored: &str) -> bool {
        self.hasher.verify(plain, stored)
    }

    /// [`Self::verify`] on the blocking pool, for async callers.
    pub async fn verify_async(&self, plain: &str, stored: &str) -> AccountResult<bool> {
        let this = self.clone();
        let plain = plain.to_owned();
        let stored = stored.to_owned();
        tokio::task::spawn_blocking(move || this.verify(&plain, &stored))
            .await
            .map_err(|e| AccountError::Hashing(e.to_string()))
    }

    /// Whether the password changed after a token issued at `issued_at`
    /// (seconds since the Unix epoch).
    pub fn changed_password_after(&self, user: &User, issued_at: i64) -> bool {
        match user.password_changed_at {
            Some(changed) => issued_at < changed.unix_timestamp(),
            None => false,
        }
    }
}
