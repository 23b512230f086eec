//! Show and episode status endpoints.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::form::{parse_episode_list, Flag};
use crate::db::models::{BacklogSegment, Episode, EpisodeNumber, Show, StatusKind};
use crate::error::{AppError, Result};
use crate::services::activity::{ActivityBuilder, EventType};
use crate::services::status::{StatusChangeError, StatusChangeReport};
use crate::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request body for a status change.
#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub episodes: Vec<EpisodeNumber>,
    /// Composite status code.
    pub status: i64,
}

/// Form fields of the classic status change endpoint.
#[derive(Debug, Deserialize)]
pub struct SetStatusForm {
    pub show: Option<String>,
    /// Episodes as `SxE|SxE`.
    pub eps: Option<String>,
    pub status: Option<String>,
    /// Answer with JSON instead of redirecting.
    #[serde(default)]
    pub direct: Flag,
}

/// Result of a status change, with the segments sent to the backlog.
#[derive(Debug, Serialize)]
pub struct StatusChangeResponse {
    #[serde(flatten)]
    pub report: StatusChangeReport,
    /// Segments newly queued; segments already waiting are not repeated.
    pub queued: Vec<BacklogSegment>,
}

/// A season with its episodes grouped together.
#[derive(Debug, Serialize)]
pub struct SeasonWithEpisodes {
    pub season_number: i32,
    pub episodes: Vec<Episode>,
    /// Computed: episodes in the downloaded family
    pub downloaded_count: usize,
    /// Computed: episodes currently wanted
    pub wanted_count: usize,
    pub total_count: usize,
}

/// A show with all seasons and episodes grouped.
#[derive(Debug, Serialize)]
pub struct ShowWithSeasons {
    #[serde(flatten)]
    pub show: Show,
    pub seasons: Vec<SeasonWithEpisodes>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/shows/:id
pub async fn get_show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ShowWithSeasons>> {
    let show = state
        .store
        .find_show(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Show {}", id)))?;

    let episodes = state.store.list_episodes(id).await?;

    let mut by_season: BTreeMap<i32, Vec<Episode>> = BTreeMap::new();
    for episode in episodes {
        by_season.entry(episode.season).or_default().push(episode);
    }

    let seasons = by_season
        .into_iter()
        .map(|(season_number, episodes)| {
            let downloaded_count = episodes
                .iter()
                .filter(|e| e.status.kind().is_downloaded())
                .count();
            let wanted_count = episodes
                .iter()
                .filter(|e| e.status.kind() == StatusKind::Wanted)
                .count();
            SeasonWithEpisodes {
                season_number,
                total_count: episodes.len(),
                downloaded_count,
                wanted_count,
                episodes,
            }
        })
        .collect();

    Ok(Json(ShowWithSeasons { show, seasons }))
}

/// POST /api/shows/:id/episodes/status
///
/// Sets the status of several episodes. Episodes that cannot be changed are
/// listed in `errors`; the rest are saved.
pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusChangeRequest>,
) -> Result<Json<StatusChangeResponse>> {
    let response = apply_and_queue(&state, id, &body.episodes, body.status).await?;
    Ok(Json(response))
}

/// POST /home/setStatus
///
/// Form variant of the status change. With `direct` set the outcome is
/// reported as JSON with a `result` of `success` or `error`; otherwise the
/// client is redirected to the show.
pub async fn set_status_form(
    State(state): State<AppState>,
    Form(form): Form<SetStatusForm>,
) -> Response {
    let direct = bool::from(form.direct);

    match set_status_from_form(&state, &form).await {
        Ok((show_id, _)) if !direct => {
            Redirect::to(&format!("/api/shows/{}", show_id)).into_response()
        }
        Ok((_, response)) => Json(DirectResponse {
            result: "success",
            error: None,
            message: None,
            response: Some(response),
        })
        .into_response(),
        Err(e) if direct => {
            let (status, error, message) = e.parts();
            (
                status,
                Json(DirectResponse {
                    result: "error",
                    error: Some(error),
                    message,
                    response: None,
                }),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Serialize)]
struct DirectResponse {
    result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    response: Option<StatusChangeResponse>,
}

async fn set_status_from_form(
    state: &AppState,
    form: &SetStatusForm,
) -> Result<(i64, StatusChangeResponse)> {
    let episodes = parse_episode_list(form.eps.as_deref().unwrap_or(""))?;
    if episodes.is_empty() {
        return Err(StatusChangeError::NoEpisodesSpecified.into());
    }

    let status = form
        .status
        .as_deref()
        .map(str::trim)
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| AppError::BadRequest("Invalid status code".to_string()))?;

    let show_id = form
        .show
        .as_deref()
        .map(str::trim)
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| AppError::BadRequest("Invalid show ID".to_string()))?;

    let response = apply_and_queue(state, show_id, &episodes, status).await?;
    Ok((show_id, response))
}

/// Runs the status change and queues the resulting backlog segments.
async fn apply_and_queue(
    state: &AppState,
    show_id: i64,
    episodes: &[EpisodeNumber],
    status: i64,
) -> Result<StatusChangeResponse> {
    let report = state
        .engine
        .apply_status_change(show_id, episodes, status)
        .await?;

    let mut queued = Vec::new();
    if !report.segments.is_empty() {
        let show_name = state
            .store
            .find_show(show_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_else(|| format!("Show {}", show_id));

        for segment in &report.segments {
            if state.backlog.enqueue(show_id, &show_name, segment.clone()).await {
                queued.push(segment.clone());
            }
        }

        if !queued.is_empty() {
            let list: Vec<String> = queued.iter().map(ToString::to_string).collect();
            ActivityBuilder::new(
                EventType::BacklogQueued,
                format!("Backlog started for {}: {}", show_name, list.join(", ")),
            )
            .show(show_id)
            .metadata(&queued)
            .log(&state.db)
            .await;
        }
    }

    if report.applied_count > 0 {
        let code = crate::db::models::StatusCode(status);
        ActivityBuilder::new(
            EventType::StatusChanged,
            format!("{} episode(s) set to {}", report.applied_count, code),
        )
        .show(show_id)
        .metadata(&serde_json::json!({
            "status": status,
            "applied": report.applied_count,
            "failed": report.errors.len(),
        }))
        .log(&state.db)
        .await;
    }

    Ok(StatusChangeResponse { report, queued })
}
