//! API endpoint handlers for Airdate.

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub mod coming;
pub mod episodes;
pub mod form;
pub mod system;

/// Build the complete application router.
pub fn router(state: AppState) -> Router {
    let show_routes = Router::new()
        .route("/:id", get(episodes::get_show))
        .route("/:id/episodes/status", post(episodes::change_status));

    let coming_routes = Router::new()
        .route("/", get(coming::get_coming))
        .route("/settings", get(coming::get_settings))
        .route("/sort", post(coming::set_sort))
        .route("/toggle-paused", post(coming::toggle_paused));

    Router::new()
        .route("/health", get(crate::health_check))
        .route("/home/setStatus", post(episodes::set_status_form))
        .route("/calendar", get(coming::calendar))
        .nest("/api/shows", show_routes)
        .nest("/api/coming", coming_routes)
        .route("/api/backlog", get(system::list_backlog))
        .route("/api/activity", get(system::get_activity))
        .with_state(state)
}
