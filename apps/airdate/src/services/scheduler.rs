//! Scheduler service for running background jobs on a schedule.
//!
//! The only recurring job refreshes the network timezone table from the
//! configured URL.

use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::TimezoneConfig;
use crate::error::{AppError, Result};
use crate::services::activity::{ActivityBuilder, EventType};
use crate::services::timezones::{SharedTimezones, TimezoneUpdater};

/// Job execution context providing access to application services.
#[derive(Clone)]
pub struct JobContext {
    pub db: Arc<Mutex<Connection>>,
    pub timezones: SharedTimezones,
    pub updater: Arc<TimezoneUpdater>,
}

/// The scheduler service managing all background jobs.
pub struct Scheduler {
    scheduler: JobScheduler,
}

impl Scheduler {
    /// Create a scheduler with the jobs enabled by `config`. Returns `None`
    /// when no job is configured.
    pub async fn from_config(
        config: &TimezoneConfig,
        db: Arc<Mutex<Connection>>,
        timezones: SharedTimezones,
    ) -> Result<Option<Self>> {
        let Some(url) = config.update_url.as_deref() else {
            tracing::info!("No network timezone update URL configured, scheduler disabled");
            return Ok(None);
        };

        let ctx = JobContext {
            db,
            timezones,
            updater: Arc::new(TimezoneUpdater::new(url)?),
        };
        Ok(Some(Self::new(&config.update_schedule, ctx).await?))
    }

    pub async fn new(cron: &str, ctx: JobContext) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create scheduler: {}", e)))?;

        Self::add_refresh_timezones_job(&scheduler, cron, ctx).await?;

        Ok(Self { scheduler })
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start scheduler: {}", e)))
    }

    /// Shutdown the scheduler gracefully.
    pub async fn shutdown(mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to shutdown scheduler: {}", e)))
    }

    /// Add the network timezone refresh job.
    async fn add_refresh_timezones_job(
        scheduler: &JobScheduler,
        cron: &str,
        ctx: JobContext,
    ) -> Result<()> {
        let job = Job::new_async(cron, move |_uuid, _lock| {
            let ctx = ctx.clone();
            Box::pin(async move {
                run_refresh_timezones_job(&ctx).await;
            })
        })
        .map_err(map_scheduler_error)?;

        scheduler.add(job).await.map_err(map_scheduler_error)?;
        tracing::debug!(cron = cron, "Scheduled refresh_timezones job");
        Ok(())
    }
}

/// Map JobSchedulerError to AppError.
fn map_scheduler_error(e: JobSchedulerError) -> AppError {
    AppError::Internal(format!("Scheduler error: {}", e))
}

/// Download the network timezone table; the current one stays on failure.
pub async fn run_refresh_timezones_job(ctx: &JobContext) {
    tracing::info!("Running refresh_timezones job");

    match ctx.updater.refresh(&ctx.timezones).await {
        Ok(count) => {
            ActivityBuilder::new(
                EventType::TimezonesUpdated,
                format!("Network timezones updated: {} networks", count),
            )
            .metadata(&serde_json::json!({ "networks": count }))
            .log(&ctx.db)
            .await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to refresh network timezones");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db_memory;
    use crate::services::activity;
    use crate::services::timezones::NetworkTimezones;

    fn ctx(url: &str) -> JobContext {
        JobContext {
            db: Arc::new(Mutex::new(init_db_memory().unwrap())),
            timezones: NetworkTimezones::bundled().into_shared(),
            updater: Arc::new(TimezoneUpdater::new(url).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_disabled_without_url() {
        let config = TimezoneConfig::default();
        let db = Arc::new(Mutex::new(init_db_memory().unwrap()));
        let scheduler = Scheduler::from_config(&config, db, NetworkTimezones::default().into_shared())
            .await
            .unwrap();
        assert!(scheduler.is_none());
    }

    #[tokio::test]
    async fn test_invalid_cron_rejected() {
        let result = Scheduler::new("not a cron", ctx("http://127.0.0.1:9/tz")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refresh_records_activity() {
        use axum::{routing::get, Router};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = Router::new().route("/tz", get(|| async { "TF1:Europe/Paris\n" }));
            axum::serve(listener, app).await.unwrap();
        });

        let ctx = ctx(&format!("http://{}/tz", addr));
        run_refresh_timezones_job(&ctx).await;

        assert_eq!(ctx.timezones.read().await.len(), 1);
        let entries = activity::recent(&ctx.db, 5).await.unwrap();
        assert_eq!(entries[0].event_type, "timezones_updated");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_table() {
        // nothing listens on the discard port
        let ctx = ctx("http://127.0.0.1:9/tz");
        let before = ctx.timezones.read().await.len();
        run_refresh_timezones_job(&ctx).await;
        assert_eq!(ctx.timezones.read().await.len(), before);
        assert!(activity::recent(&ctx.db, 5).await.unwrap().is_empty());
    }
}
