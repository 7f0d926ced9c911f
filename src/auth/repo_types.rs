use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,                // lower-cased, unique
    pub user_name: String,
    pub password_hash: String,        // Argon2 PHC string
    pub name: Option<String>,
    pub surname: Option<String>,
    pub birth_date: Option<Date>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub photo: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub user_name: String,
    pub password_hash: String,
    pub name: String,
    pub surname: String,
    pub birth_date: Option<Date>,
}

/// Opaque refresh token, stored as issued.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
    pub revoked: bool,
    pub created_at: OffsetDateTime,
}

impl RefreshToken {
    pub fn is_usable(&self, now: OffsetDateTime) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Password reset token. The raw token is never stored: `lookup_key` is its
/// SHA-256 and `token_hash` its Argon2 hash.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lookup_key: String,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub used: bool,
    pub created_at: OffsetDateTime,
}

impl PasswordResetToken {
    pub fn is_redeemable(&self, now: OffsetDateTime) -> bool {
        !self.used && now < self.expires_at
    }
}
