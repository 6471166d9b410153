use std::sync::Arc;

use sha2::{Digest, Sha256};
use time::Duration;
use tracing::debug;

use crate::auth::random::SecureRandom;
use crate::clock::Clock;
use crate::users::repo_types::User;

const TOKEN_BYTES: usize = 32;

/// SHA-256 hex digest of a reset token; the only form that gets stored.
pub fn hash_token(token: &str) -> String {
    let mut h = Sha256::new();
    h.update(token.as_bytes());
    hex::encode(h.finalize())
}

/// Compares two hex digests without stopping at the first differing byte.
fn digests_match(candidate: &str, stored: &str) -> bool {
    candidate.len() == stored.len()
        && candidate
            .bytes()
            .zip(stored.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Issues and checks single-use password reset tokens.
#[derive(Clone)]
pub struct ResetTokenIssuer {
    rng: Arc<dyn SecureRandom>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ResetTokenIssuer {
    pub fn new(rng: Arc<dyn SecureRandom>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { rng, clock, ttl }
    }

    /// Stores the digest and expiry on `user` and returns the plaintext token.
    pub fn issue(&self, user: &mut User) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng.fill(&mut bytes);
        let token = hex::encode(bytes);

        user.password_reset_token = Some(hash_token(&token));
        user.password_reset_expires = Some(self.clock.now() + self.ttl);
        debug!(user_id = %user.id, "password reset token issued");
        token
    }

    /// True only if `candidate` matches the stored digest and has not expired.
    pub fn validate(&self, user: &User, candidate: &str) -> bool {
        let (Some(stored), Some(expires)) = (
            user.password_reset_token.as_deref(),
            user.password_reset_expires,
        ) else {
            return false;
        };
        let matches = digests_match(&hash_token(candidate), stored);
        let live = self.clock.now() < expires;
        matches & live
    }

    pub fn clear(&self, user: &mut User) {
        user.password_reset_token = None;
        user.password_reset_expires = None;
    }
}
