use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A group as seen through one of its memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
}
