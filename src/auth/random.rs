use rand::{rngs::OsRng, RngCore};

/// Cryptographically secure byte source used for salts and reset tokens.
pub trait SecureRandom: Send + Sync {
    fn fill(&self, dest: &mut [u8]);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

#[cfg(test)]
pub use seeded::SeededRandom;
