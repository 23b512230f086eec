//! Airdate Library
//!
//! Episode status management and coming-episodes feed for a TV library.
//! This library exposes modules for use in integration tests.

use axum::response::Json;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;

use crate::config::Config;
use db::{EpisodeStore, SqliteStore};
use services::backlog::BacklogItem;
use services::coming::SharedSettings;
use services::{
    BacklogQueue, CalendarFeed, ComingEpisodesAggregator, EpisodeLocks, SharedTimezones,
    StatusTransitionEngine, Zone,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Mutex<Connection>>,
    pub store: Arc<dyn EpisodeStore>,
    pub engine: Arc<StatusTransitionEngine>,
    pub coming: Arc<ComingEpisodesAggregator>,
    pub calendar: Arc<CalendarFeed>,
    pub settings: SharedSettings,
    pub timezones: SharedTimezones,
    pub backlog: BacklogQueue,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire the services around an open database. The returned receiver is
    /// the backlog queue's consuming end, to be handed to the worker.
    pub fn new(
        config: Config,
        db: Arc<Mutex<Connection>>,
        timezones: SharedTimezones,
    ) -> (Self, mpsc::Receiver<BacklogItem>) {
        let display_zone = config.local_zone();
        let store: Arc<dyn EpisodeStore> = SqliteStore::new_shared(Arc::clone(&db));
        let (backlog, backlog_rx) = BacklogQueue::new(config.backlog.queue_capacity);

        let state = Self {
            engine: Arc::new(StatusTransitionEngine::new(
                Arc::clone(&store),
                Arc::new(EpisodeLocks::new()),
            )),
            coming: Arc::new(ComingEpisodesAggregator::new(
                Arc::clone(&store),
                Arc::clone(&timezones),
                display_zone,
            )),
            calendar: Arc::new(CalendarFeed::new(
                Arc::clone(&store),
                Arc::clone(&timezones),
                display_zone,
            )),
            settings: Arc::new(RwLock::new(config.coming_settings())),
            config: Arc::new(config),
            db,
            store,
            timezones,
            backlog,
            start_time: std::time::Instant::now(),
        };

        (state, backlog_rx)
    }

    /// Zone used to display air times.
    pub fn display_zone(&self) -> Zone {
        self.coming.display_zone()
    }

    /// Get the start time of the application.
    pub fn start_time(&self) -> std::time::Instant {
        self.start_time
    }
}

#[derive(Serialize)]
pub struct ApiResponse {
    pub message: String,
    pub version: String,
    pub uptime_secs: u64,
}

pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "Airdate is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time().elapsed().as_secs(),
    })
}
