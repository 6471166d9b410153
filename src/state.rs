use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::warn;

use crate::auth::mailer::LogMailer;
use crate::auth::services::AccountService;
use crate::config::AppConfig;
use crate::users::memory::InMemoryUserStore;
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
}

impl AppState {
    /// Connects the configured store and wires the account service.
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                    warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(PgUserStore::new(db))
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory user store");
                Arc::new(InMemoryUserStore::new())
            }
        };

        let accounts = AccountService::from_config(
            config,
            store,
            Arc::new(LogMailer::new(config.reset.url_base.clone())),
        )?;
        Ok(Self::from_parts(Arc::new(accounts)))
    }

    pub fn from_parts(accounts: Arc<AccountService>) -> Self {
        Self { accounts }
    }
}
