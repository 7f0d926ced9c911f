use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{
    password::{hash_secret, validate_password, verify_secret},
    repo::CredentialStore,
    repo_types::PasswordResetToken,
    services::normalize_email,
};
use crate::error::{bounded, AppResult};
use crate::mail::Mailer;

const RAW_TOKEN_BYTES: usize = 64;

pub const RESET_SUBJECT: &str = "Password reset";

/// Issues and redeems single-use password reset tokens.
pub struct PasswordResetManager {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    ttl: Duration,
    link_base: String,
    io_timeout: std::time::Duration,
}

impl PasswordResetManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        ttl: Duration,
        link_base: String,
        io_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            ttl,
            link_base,
            io_timeout,
        }
    }

    /// Creates a reset token and mails the link. Unknown emails succeed
    /// silently.
    #[instrument(skip_all)]
    pub async fn request_reset(&self, email: &str) -> AppResult<()> {
        let email = normalize_email(email);
        let Some(user) = bounded(self.io_timeout, self.store.find_user_by_email(&email)).await?
        else {
            debug!("password reset requested for unknown email");
            return Ok(());
        };

        let raw = generate_raw_token();
        let now = OffsetDateTime::now_utc();
        let record = PasswordResetToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            lookup_key: lookup_key(&raw),
            token_hash: hash_secret(&raw)?,
            expires_at: now + self.ttl,
            used: false,
            created_at: now,
        };
        bounded(self.io_timeout, self.store.insert_reset_token(&record)).await?;

        let body = format!(
            "Click the link below to reset your password:\n{}\n\nThe link expires in {} minutes. \
             If you did not request a reset, ignore this email.",
            self.reset_link(&raw),
            self.ttl.whole_minutes()
        );
        bounded(
            self.io_timeout,
            self.mailer.send(&user.email, RESET_SUBJECT, &body),
        )
        .await?;

        info!(user_id = %user.id, "password reset token issued");
        Ok(())
    }

    /// Redeems a raw reset token. Returns `false` when no valid token matches.
    #[instrument(skip_all)]
    pub async fn redeem_reset(&self, raw: &str, new_password: &str) -> AppResult<bool> {
        validate_password(new_password)?;

        let now = OffsetDateTime::now_utc();
        let Some(record) = bounded(
            self.io_timeout,
            self.store.find_valid_reset_token(&lookup_key(raw), now),
        )
        .await?
        else {
            warn!("reset attempted with unknown, used or expired token");
            return Ok(false);
        };

        if !verify_secret(raw, &record.token_hash)? {
            warn!(user_id = %record.user_id, "reset token failed hash verification");
            return Ok(false);
        }

        let password_hash = hash_secret(new_password)?;
        let redeemed = bounded(
            self.io_timeout,
            self.store
                .redeem_reset_token(record.id, record.user_id, &password_hash, now),
        )
        .await?;

        if redeemed {
            info!(user_id = %record.user_id, "password reset");
        }
        Ok(redeemed)
    }

    fn reset_link(&self, raw: &str) -> String {
        format!("{}?token={}", self.link_base, urlencoding::encode(raw))
    }
}

fn generate_raw_token() -> String {
    let mut bytes = [0u8; RAW_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// Deterministic key used to find the candidate row for a raw token.
fn lookup_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
