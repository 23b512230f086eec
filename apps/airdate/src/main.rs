use axum::http::{header, Method};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use airdate::config::Config;
use airdate::services::activity::{log_event, EventType};
use airdate::services::{backlog, ActivitySegmentSearch, NetworkTimezones, Scheduler};
use airdate::{api, db, AppState};

fn init_tracing() {
    // Initialize tracing with env-filter
    // RUST_LOG environment variable controls log levels
    // Default: debug for our crate, info for axum, warn for dependencies
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("airdate=debug,tower_http=debug,axum=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// CORS based on allowed origins from config. If no origins are configured,
/// only same-origin requests are allowed.
fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    if config.server.cors_origins.is_empty() {
        tracing::info!("CORS: No origins configured, same-origin only");
        return cors;
    }

    let origins: Vec<_> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    tracing::info!("CORS: Allowing origins {:?}", config.server.cors_origins);
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Network timezone table from the configured file, or the bundled one.
fn load_timezones(config: &Config) -> NetworkTimezones {
    match &config.timezones.network_file {
        Some(path) => match NetworkTimezones::load(path) {
            Ok(table) => {
                tracing::info!(networks = table.len(), path = ?path, "Loaded network timezones");
                table
            }
            Err(e) => {
                tracing::error!(error = %e, "Falling back to bundled network timezones");
                NetworkTimezones::bundled()
            }
        },
        None => NetworkTimezones::bundled(),
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing first so we can log configuration loading
    init_tracing();

    tracing::info!("Starting Airdate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match Config::load() {
        Ok(cfg) => {
            tracing::info!("Configuration loaded successfully");
            tracing::debug!("Server: {}:{}", cfg.server.host, cfg.server.port);
            tracing::debug!("Database: {:?}", cfg.database.path);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Ensure database directory exists
    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Initialize database
    let conn = match db::init_db(&config.database.path) {
        Ok(conn) => {
            tracing::info!("Database initialized at {:?}", config.database.path);
            conn
        }
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    let db = Arc::new(Mutex::new(conn));

    let timezones = load_timezones(&config).into_shared();
    tracing::info!(zone = ?config.local_zone(), "Display timezone");

    let scheduler =
        match Scheduler::from_config(&config.timezones, Arc::clone(&db), Arc::clone(&timezones))
            .await
        {
            Ok(scheduler) => scheduler,
            Err(e) => {
                tracing::error!("Failed to create scheduler: {}", e);
                None
            }
        };
    if let Some(scheduler) = &scheduler {
        if let Err(e) = scheduler.start().await {
            tracing::error!("Failed to start scheduler: {}", e);
        }
    }

    let addr = config.server_addr();
    let cors = cors_layer(&config);
    let (state, backlog_rx) = AppState::new(config, Arc::clone(&db), timezones);

    // Backlog worker
    let searcher = Arc::new(ActivitySegmentSearch::new(
        Arc::clone(&state.store),
        Arc::clone(&db),
    ));
    let _worker = backlog::spawn_worker(state.backlog.clone(), backlog_rx, searcher);

    log_event(&db, EventType::SystemStarted, "Airdate started").await;

    let app = api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Airdate listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }

    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!("Failed to shut down scheduler: {}", e);
        }
    }
}
