use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    error::{bounded, AppResult},
    groups::{dto::ApiResponse, repo::GroupStore, repo_types::GroupSummary},
    state::AppState,
};

pub fn group_routes() -> Router<AppState> {
    Router::new().route("/users/:user_id/groups", get(get_user_groups))
}

/// Groups of `user_id`. Ids that are not UUIDs cannot belong to any user and
/// yield an empty list.
pub async fn user_groups(
    store: &dyn GroupStore,
    user_id: &str,
    io_timeout: std::time::Duration,
) -> AppResult<Vec<GroupSummary>> {
    let Ok(user_id) = Uuid::parse_str(user_id) else {
        debug!(user_id, "groups requested for non-uuid user id");
        return Ok(Vec::new());
    };
    bounded(io_timeout, store.groups_for_user(user_id)).await
}

#[instrument(skip(state))]
pub async fn get_user_groups(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<GroupSummary>>>> {
    let groups = user_groups(state.groups.as_ref(), &user_id, state.io_timeout()).await?;
    Ok(Json(ApiResponse::ok(groups)))
}
