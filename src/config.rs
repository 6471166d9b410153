use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    pub ttl_minutes: i64,
    pub url_base: String,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 10,
            url_base: "http://localhost:8080/api/v1/users/reset-password".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Unset means the process-local store; accounts vanish on restart.
    pub database_url: Option<String>,
    pub hashing: HashingConfig,
    pub reset: ResetConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("APP_PORT", 8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("APP_HOST {host:?} is not an address"))?;
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let hashing_defaults = HashingConfig::default();
        let hashing = HashingConfig {
            memory_kib: env_or("ARGON2_MEMORY_KIB", hashing_defaults.memory_kib),
            iterations: env_or("ARGON2_ITERATIONS", hashing_defaults.iterations),
            parallelism: env_or("ARGON2_PARALLELISM", hashing_defaults.parallelism),
        };
        let reset_defaults = ResetConfig::default();
        let reset = ResetConfig {
            ttl_minutes: env_or("RESET_TOKEN_TTL_MINUTES", reset_defaults.ttl_minutes),
            url_base: std::env::var("RESET_URL_BASE").unwrap_or(reset_defaults.url_base),
        };
        if reset.ttl_minutes <= 0 {
            anyhow::bail!("RESET_TOKEN_TTL_MINUTES must be positive");
        }
        Ok(Self {
            listen_addr,
            database_url,
            hashing,
            reset,
        })
    }
}
