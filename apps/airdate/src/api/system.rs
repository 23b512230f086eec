//! Backlog and activity endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::services::activity::{self, Activity};
use crate::services::backlog::BacklogItem;
use crate::AppState;

/// GET /api/backlog
///
/// Backlog searches waiting for the worker.
pub async fn list_backlog(State(state): State<AppState>) -> Json<Vec<BacklogItem>> {
    Json(state.backlog.pending().await)
}

/// Query parameters for listing activity.
#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    /// Maximum number of entries (default: 50, max: 500).
    pub limit: Option<i64>,
}

/// GET /api/activity
pub async fn get_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<Activity>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let entries = activity::recent(&state.db, limit).await?;
    Ok(Json(entries))
}
