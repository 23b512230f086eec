//! Coming episodes, display settings and the iCalendar feed.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::form::Flag;
use crate::error::{AppError, Result};
use crate::services::activity::{ActivityBuilder, EventType};
use crate::services::coming::{ComingEpisodeRow, ComingEpisodesSettings, ComingSort, ComingWindow};
use crate::AppState;

/// Per-request overrides of the stored display settings.
#[derive(Debug, Default, Deserialize)]
pub struct ComingQuery {
    pub sort: Option<String>,
    pub missed_range: Option<u32>,
    pub paused: Option<Flag>,
}

#[derive(Debug, Serialize)]
pub struct ComingResponse {
    pub sort: ComingSort,
    pub display_paused: bool,
    pub today: NaiveDate,
    pub next_week: NaiveDate,
    pub episodes: Vec<ComingEpisodeRow>,
}

#[derive(Debug, Deserialize)]
pub struct SetSortRequest {
    pub sort: String,
}

/// GET /api/coming
pub async fn get_coming(
    State(state): State<AppState>,
    Query(query): Query<ComingQuery>,
) -> Result<Json<ComingResponse>> {
    let settings = state.settings.read().await.clone();

    let sort = query
        .sort
        .as_deref()
        .map(ComingSort::parse_or_default)
        .unwrap_or(settings.sort);
    let missed_range = query.missed_range.unwrap_or(settings.missed_range_days);
    let display_paused = query.paused.map(bool::from).unwrap_or(settings.display_paused);

    let window = ComingWindow::week_from(state.display_zone().today());
    let episodes = state
        .coming
        .aggregate(window, missed_range, sort, display_paused)
        .await?;

    Ok(Json(ComingResponse {
        sort,
        display_paused,
        today: window.start,
        next_week: window.end,
        episodes,
    }))
}

/// GET /api/coming/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<ComingEpisodesSettings> {
    Json(state.settings.read().await.clone())
}

/// POST /api/coming/sort
///
/// Unknown sort keys fall back to `date`.
pub async fn set_sort(
    State(state): State<AppState>,
    Json(body): Json<SetSortRequest>,
) -> Json<ComingEpisodesSettings> {
    let sort = ComingSort::parse_or_default(&body.sort);
    let settings = {
        let mut settings = state.settings.write().await;
        settings.sort = sort;
        settings.clone()
    };

    tracing::info!(sort = sort.as_str(), "Coming episodes sort changed");
    ActivityBuilder::new(
        EventType::SettingsChanged,
        format!("Coming episodes sorted by {}", sort.as_str()),
    )
    .log(&state.db)
    .await;

    Json(settings)
}

/// POST /api/coming/toggle-paused
pub async fn toggle_paused(State(state): State<AppState>) -> Json<ComingEpisodesSettings> {
    let settings = {
        let mut settings = state.settings.write().await;
        settings.display_paused = !settings.display_paused;
        settings.clone()
    };

    tracing::info!(display_paused = settings.display_paused, "Coming episodes paused display toggled");
    ActivityBuilder::new(
        EventType::SettingsChanged,
        if settings.display_paused {
            "Showing paused shows in coming episodes"
        } else {
            "Hiding paused shows in coming episodes"
        },
    )
    .log(&state.db)
    .await;

    Json(settings)
}

/// GET /calendar
pub async fn calendar(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let today = state.display_zone().today();
    let config = &state.config.calendar;

    let body = state
        .calendar
        .render(today, config.past_weeks, config.future_weeks, Utc::now())
        .await
        .map_err(AppError::Database)?;

    Ok((
        [(header::CONTENT_TYPE, "text/calendar; charset=utf-8")],
        body,
    ))
}
