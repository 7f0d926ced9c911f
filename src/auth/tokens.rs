use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{
    jwt::JwtKeys,
    repo::CredentialStore,
    repo_types::{RefreshToken, User},
};
use crate::error::{bounded, AppError, AppResult};

const REFRESH_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues access JWTs and opaque, single-use refresh tokens.
pub struct TokenIssuer {
    keys: JwtKeys,
    store: Arc<dyn CredentialStore>,
    refresh_ttl: Duration,
    io_timeout: std::time::Duration,
}

impl TokenIssuer {
    pub fn new(
        keys: JwtKeys,
        store: Arc<dyn CredentialStore>,
        refresh_ttl: Duration,
        io_timeout: std::time::Duration,
    ) -> Self {
        Self {
            keys,
            store,
            refresh_ttl,
            io_timeout,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.keys.access_ttl()
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn issue_tokens(&self, user: &User) -> AppResult<TokenPair> {
        let access_token = self.keys.sign_access(user)?;

        let now = OffsetDateTime::now_utc();
        let record = RefreshToken {
            id: Uuid::new_v4(),
            token: generate_refresh_token(),
            user_id: user.id,
            expires_at: now + self.refresh_ttl,
            revoked: false,
            created_at: now,
        };
        bounded(self.io_timeout, self.store.insert_refresh_token(&record)).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: record.token,
        })
    }

    /// Exchanges a refresh token for a new pair. The presented token is
    /// revoked and can never be used again.
    #[instrument(skip_all)]
    pub async fn refresh_tokens(&self, presented: &str) -> AppResult<(User, TokenPair)> {
        let now = OffsetDateTime::now_utc();

        let record = bounded(self.io_timeout, self.store.find_refresh_token(presented))
            .await?
            .ok_or(AppError::Unauthorized)?;

        if !record.is_usable(now) {
            warn!(user_id = %record.user_id, revoked = record.revoked, "refresh with unusable token");
            return Err(AppError::Unauthorized);
        }

        let user = bounded(self.io_timeout, self.store.find_user_by_id(record.user_id))
            .await?
            .ok_or_else(|| {
                warn!(user_id = %record.user_id, "refresh token owner no longer exists");
                AppError::Unauthorized
            })?;

        let consumed = bounded(
            self.io_timeout,
            self.store.consume_refresh_token(presented, now),
        )
        .await?;
        if !consumed {
            warn!(user_id = %user.id, "refresh token already consumed");
            return Err(AppError::Unauthorized);
        }

        let pair = self.issue_tokens(&user).await?;
        info!(user_id = %user.id, "refresh token rotated");
        Ok((user, pair))
    }

    /// Revokes a refresh token on logout. Revoking twice is fine; an unknown
    /// token is a client error.
    #[instrument(skip_all)]
    pub async fn revoke_on_logout(&self, token: &str) -> AppResult<()> {
        let found = bounded(self.io_timeout, self.store.revoke_refresh_token(token)).await?;
        if !found {
            return Err(AppError::BadRequest("Invalid refresh token.".into()));
        }
        Ok(())
    }
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
