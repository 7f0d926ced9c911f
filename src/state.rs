use std::{sync::Arc, time::Duration};

use crate::auth::{
    jwt::JwtKeys, repo::CredentialStore, reset::PasswordResetManager, services::AccountService,
    tokens::TokenIssuer,
};
use crate::config::AppConfig;
use crate::db::PgStore;
use crate::groups::repo::GroupStore;
use crate::mail::{Mailer, SmtpMailer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub accounts: Arc<AccountService>,
    pub tokens: Arc<TokenIssuer>,
    pub resets: Arc<PasswordResetManager>,
    pub groups: Arc<dyn GroupStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = PgStore::open(&config.database_url).await?;

        let mailer = Arc::new(SmtpMailer::new(&config.smtp)?) as Arc<dyn Mailer>;
        let credentials = Arc::new(store.clone()) as Arc<dyn CredentialStore>;
        let groups = Arc::new(store) as Arc<dyn GroupStore>;

        Ok(Self::from_parts(config, credentials, groups, mailer))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        credentials: Arc<dyn CredentialStore>,
        groups: Arc<dyn GroupStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let io_timeout = Duration::from_secs(config.io_timeout_secs);
        let keys = JwtKeys::from_config(&config.jwt);

        let accounts = Arc::new(AccountService::new(credentials.clone(), io_timeout));
        let tokens = Arc::new(TokenIssuer::new(
            keys.clone(),
            credentials.clone(),
            time::Duration::days(config.jwt.refresh_ttl_days),
            io_timeout,
        ));
        let resets = Arc::new(PasswordResetManager::new(
            credentials,
            mailer,
            time::Duration::minutes(config.reset.ttl_minutes),
            config.reset.link_base.clone(),
            io_timeout,
        ));

        Self {
            config,
            keys,
            accounts,
            tokens,
            resets,
            groups,
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.config.io_timeout_secs)
    }

    /// State wired to in-memory collaborators, for handler tests.
    #[cfg(test)]
    pub fn fake() -> (
        Self,
        Arc<crate::memory::MemoryStore>,
        Arc<crate::mail::testing::RecordingMailer>,
    ) {
        let store = Arc::new(crate::memory::MemoryStore::new());
        let mailer = Arc::new(crate::mail::testing::RecordingMailer::default());
        let state = Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            store.clone(),
            store.clone(),
            mailer.clone(),
        );
        (state, store, mailer)
    }
}
