//! Test infrastructure for Airdate integration tests.
//!
//! Provides a `TestApp` wrapper around `axum_test::TestServer` with helpers for
//! seeding shows and episodes relative to today.

use axum_test::TestServer;
use chrono::{Days, NaiveDate};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use airdate::config::{
    BacklogConfig, CalendarConfig, ComingEpisodesConfig, Config, DatabaseConfig, ServerConfig,
    TimezoneConfig,
};
use airdate::services::backlog::{spawn_worker, BacklogItem};
use airdate::services::{ActivitySegmentSearch, NetworkTimezones};
use airdate::{api, db, AppState};

/// Test application wrapper around axum_test::TestServer.
pub struct TestApp {
    server: TestServer,
    db: Arc<Mutex<Connection>>,
    state: AppState,
    backlog_rx: Option<mpsc::Receiver<BacklogItem>>,
    worker: Option<JoinHandle<()>>,
}

impl TestApp {
    /// Create a new test application with in-memory database.
    ///
    /// Air times are displayed in UTC and only NBC (New York) and BBC One
    /// (London) have a network timezone. The backlog worker is not running,
    /// so queued segments stay pending.
    pub async fn new() -> Self {
        let conn = db::init_db_memory().expect("Failed to initialize test database");
        let db = Arc::new(Mutex::new(conn));

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: Vec::new(),
            },
            database: DatabaseConfig {
                path: ":memory:".into(),
            },
            coming_episodes: ComingEpisodesConfig::default(),
            calendar: CalendarConfig::default(),
            timezones: TimezoneConfig {
                local: Some("UTC".to_string()),
                ..Default::default()
            },
            backlog: BacklogConfig::default(),
        };

        let timezones =
            NetworkTimezones::parse("NBC:America/New_York\nBBC One:Europe/London\n").into_shared();
        let (state, backlog_rx) = AppState::new(config, Arc::clone(&db), timezones);

        let server =
            TestServer::new(api::router(state.clone())).expect("Failed to create test server");

        Self {
            server,
            db,
            state,
            backlog_rx: Some(backlog_rx),
            worker: None,
        }
    }

    /// Same as `new`, with the backlog worker recording searches as activity.
    #[allow(dead_code)]
    pub async fn with_worker() -> Self {
        let mut app = Self::new().await;
        let rx = app.backlog_rx.take().expect("receiver already taken");
        let searcher = Arc::new(ActivitySegmentSearch::new(
            Arc::clone(&app.state.store),
            Arc::clone(&app.db),
        ));
        app.worker = Some(spawn_worker(app.state.backlog.clone(), rx, searcher));
        app
    }

    /// Get a reference to the test server.
    pub fn server(&self) -> &TestServer {
        &self.server
    }

    /// Get a reference to the database connection.
    #[allow(dead_code)]
    pub fn db(&self) -> &Arc<Mutex<Connection>> {
        &self.db
    }

    /// Get a reference to the application state.
    #[allow(dead_code)]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Today in the display zone.
    #[allow(dead_code)]
    pub fn today(&self) -> NaiveDate {
        self.state.display_zone().today()
    }

    /// Insert a show.
    #[allow(dead_code)]
    pub async fn create_show(&self, id: i64, name: &str, network: &str, airs: &str) {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO tv_shows (id, name, network, airs, status) VALUES (?1, ?2, ?3, ?4, 'Continuing')",
            rusqlite::params![id, name, network, airs],
        )
        .expect("Failed to create test show");
    }

    /// Insert an episode airing `offset_days` from today.
    #[allow(dead_code)]
    pub async fn create_episode(
        &self,
        show_id: i64,
        season: i32,
        episode: i32,
        offset_days: i64,
        status: i64,
    ) {
        let today = self.today();
        let air_date = if offset_days >= 0 {
            today + Days::new(offset_days as u64)
        } else {
            today - Days::new(offset_days.unsigned_abs())
        };

        let db = self.db.lock().await;
        db.execute(
            r#"
            INSERT INTO episodes (show_id, season, episode, name, air_date, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            rusqlite::params![
                show_id,
                season,
                episode,
                format!("Episode {}x{}", season, episode),
                air_date.format("%Y-%m-%d").to_string(),
                status
            ],
        )
        .expect("Failed to create test episode");
    }

    /// Run an arbitrary statement against the database.
    #[allow(dead_code)]
    pub async fn execute(&self, sql: &str) {
        self.db
            .lock()
            .await
            .execute_batch(sql)
            .expect("Failed to execute SQL");
    }

    /// Current status code of an episode.
    #[allow(dead_code)]
    pub async fn episode_status(&self, show_id: i64, season: i32, episode: i32) -> i64 {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT status FROM episodes WHERE show_id = ?1 AND season = ?2 AND episode = ?3",
            rusqlite::params![show_id, season, episode],
            |row| row.get(0),
        )
        .expect("Episode not found")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
