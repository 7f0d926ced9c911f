//! In-memory `CredentialStore` / `GroupStore` used by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::CredentialStore;
use crate::auth::repo_types::{NewUser, PasswordResetToken, RefreshToken, User};
use crate::groups::repo::GroupStore;
use crate::groups::repo_types::GroupSummary;

#[derive(Debug, Clone)]
struct GroupRow {
    id: Uuid,
    name: String,
    code: String,
}

#[derive(Debug, Clone)]
struct MembershipRow {
    group_id: Uuid,
    user_id: Uuid,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    refresh_tokens: Vec<RefreshToken>,
    reset_tokens: Vec<PasswordResetToken>,
    groups: Vec<GroupRow>,
    memberships: Vec<MembershipRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_tokens(&self) -> Vec<RefreshToken> {
        self.inner.lock().unwrap().refresh_tokens.clone()
    }

    pub fn reset_tokens(&self) -> Vec<PasswordResetToken> {
        self.inner.lock().unwrap().reset_tokens.clone()
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.inner.lock().unwrap().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn remove_user(&self, id: Uuid) {
        self.inner.lock().unwrap().users.retain(|u| u.id != id);
    }

    pub fn expire_refresh_token(&self, token: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(t) = inner.refresh_tokens.iter_mut().find(|t| t.token == token) {
            t.expires_at = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        }
    }

    pub fn expire_reset_tokens(&self) {
        let past = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        for t in self.inner.lock().unwrap().reset_tokens.iter_mut() {
            t.expires_at = past;
        }
    }

    pub fn insert_group(&self, name: &str, code: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().unwrap();
        assert!(
            !inner.groups.iter().any(|g| g.code == code),
            "group code must be unique"
        );
        inner.groups.push(GroupRow {
            id,
            name: name.into(),
            code: code.into(),
        });
        id
    }

    /// Mirrors the `(user_id, group_id)` unique constraint: duplicates are ignored.
    pub fn add_member(&self, user_id: Uuid, group_id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .memberships
            .iter()
            .any(|m| m.user_id == user_id && m.group_id == group_id)
        {
            return;
        }
        inner.memberships.push(MembershipRow { group_id, user_id });
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.user(id))
    }

    async fn create_user(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.iter().any(|u| u.email == user.email) {
            return Ok(None);
        }
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            user_name: user.user_name,
            password_hash: user.password_hash,
            name: Some(user.name),
            surname: Some(user.surname),
            birth_date: user.birth_date,
            status: None,
            description: None,
            photo: None,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.push(created.clone());
        Ok(Some(created))
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        anyhow::ensure!(
            !inner.refresh_tokens.iter().any(|t| t.token == token.token),
            "duplicate refresh token"
        );
        inner.refresh_tokens.push(token.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> anyhow::Result<Option<RefreshToken>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.refresh_tokens.iter().find(|t| t.token == token).cloned())
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .refresh_tokens
            .iter_mut()
            .find(|t| t.token == token && t.is_usable(now))
        {
            Some(t) => {
                t.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_refresh_token(&self, token: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.refresh_tokens.iter_mut().find(|t| t.token == token) {
            Some(t) => {
                t.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_reset_token(&self, token: &PasswordResetToken) -> anyhow::Result<()> {
        self.inner.lock().unwrap().reset_tokens.push(token.clone());
        Ok(())
    }

    async fn find_valid_reset_token(
        &self,
        lookup_key: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<PasswordResetToken>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reset_tokens
            .iter()
            .find(|t| t.lookup_key == lookup_key && t.is_redeemable(now))
            .cloned())
    }

    async fn redeem_reset_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Inner {
            users,
            reset_tokens,
            ..
        } = &mut *inner;

        let Some(token) = reset_tokens
            .iter_mut()
            .find(|t| t.id == token_id && t.user_id == user_id && t.is_redeemable(now))
        else {
            return Ok(false);
        };
        let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(false);
        };
        token.used = true;
        user.password_hash = password_hash.to_string();
        Ok(true)
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn groups_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<GroupSummary>> {
        let inner = self.inner.lock().unwrap();
        let groups = inner
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| inner.groups.iter().find(|g| g.id == m.group_id))
            .map(|g| GroupSummary {
                id: g.id,
                name: g.name.clone(),
            })
            .collect();
        Ok(groups)
    }
}
