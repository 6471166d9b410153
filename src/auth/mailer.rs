use async_trait::async_trait;
use tracing::{debug, info};

use crate::users::repo_types::User;

/// Out-of-band delivery of reset tokens.
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send_reset(&self, user: &User, token: &str) -> anyhow::Result<()>;
}

/// Writes the reset link to the log instead of sending mail.
#[derive(Debug, Clone)]
pub struct LogMailer {
    url_base: String,
}

impl LogMailer {
    pub fn new(url_base: impl Into<String>) -> Self {
        Self {
            url_base: url_base.into(),
        }
    }

    pub fn reset_url(&self, token: &str) -> String {
        format!("{}/{}", self.url_base.trim_end_matches('/'), token)
    }
}

#[async_trait]
impl ResetMailer for LogMailer {
    async fn send_reset(&self, user: &User, token: &str) -> anyhow::Result<()> {
        info!(user_id = %user.id, "password reset requested");
        debug!(user_id = %user.id, url = %self.reset_url(token), "reset link");
        Ok(())
    }
}

#[cfg(test)]
pub use capture::CapturingMailer;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_url_joins_base_and_token() {
        let mailer = LogMailer::new("http://localhost/reset/");
        assert_eq!(mailer.reset_url("abc"), "http://localhost/reset/abc");
    }
}
