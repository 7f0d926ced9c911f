use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, PasswordResetToken, RefreshToken, User};
use crate::db::PgStore;

/// Persistence for users and their refresh/reset tokens.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Returns `None` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> anyhow::Result<Option<User>>;

    async fn insert_refresh_token(&self, token: &RefreshToken) -> anyhow::Result<()>;
    async fn find_refresh_token(&self, token: &str) -> anyhow::Result<Option<RefreshToken>>;
    /// Revokes the token only if it is still unrevoked and unexpired at `now`.
    /// Returns whether this call performed the revocation.
    async fn consume_refresh_token(&self, token: &str, now: OffsetDateTime)
        -> anyhow::Result<bool>;
    /// Unconditional revocation. Returns whether the token exists.
    async fn revoke_refresh_token(&self, token: &str) -> anyhow::Result<bool>;

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> anyhow::Result<()>;
    async fn find_valid_reset_token(
        &self,
        lookup_key: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<PasswordResetToken>>;
    /// Marks the token used and stores the new password hash atomically.
    /// Returns false if the token was no longer redeemable.
    async fn redeem_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool>;
}

const USER_COLUMNS: &str = "id, email, user_name, password_hash, name, surname, birth_date, \
                            status, description, photo, created_at";

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, user_name, password_hash, name, surname, birth_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.user_name)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(&user.surname)
            .bind(user.birth_date)
            .fetch_optional(self.pool())
            .await?;
        Ok(created)
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, token, user_id, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(token.revoked)
        .bind(token.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> anyhow::Result<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, token, user_id, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE
            WHERE token = $1 AND revoked = FALSE AND expires_at > $2
            "#,
        )
        .bind(token)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn revoke_refresh_token(&self, token: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE token = $1")
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens
                (id, user_id, lookup_key, token_hash, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.lookup_key)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.used)
        .bind(token.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn find_valid_reset_token(
        &self,
        lookup_key: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<PasswordResetToken>> {
        let row = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, lookup_key, token_hash, expires_at, used, created_at
            FROM password_reset_tokens
            WHERE lookup_key = $1 AND used = FALSE AND expires_at > $2
            "#,
        )
        .bind(lookup_key)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn redeem_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool().begin().await?;

        let marked = sqlx::query(
            r#"
            UPDATE password_reset_tokens
            SET used = TRUE
            WHERE id = $1 AND user_id = $2 AND used = FALSE AND expires_at > $3
            "#,
        )
        .bind(token_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if marked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let updated = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }
}
