use async_trait::async_trait;
use uuid::Uuid;

use crate::db::PgStore;
use crate::groups::repo_types::GroupSummary;

#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Groups the user is a member of, joined through `group_users`.
    async fn groups_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<GroupSummary>>;
}

#[async_trait]
impl GroupStore for PgStore {
    async fn groups_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<GroupSummary>> {
        let rows = sqlx::query_as::<_, GroupSummary>(
            r#"
            SELECT g.id, g.name
            FROM group_users gu
            JOIN groups g ON g.id = gu.group_id
            WHERE gu.user_id = $1
            ORDER BY g.name
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
