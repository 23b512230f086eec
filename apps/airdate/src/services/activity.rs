//! Activity logging service for tracking system events.

use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Event types for activity logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Episode events
    StatusChanged,

    // Backlog events
    BacklogQueued,
    BacklogSearched,

    // System events
    SystemStarted,
    TimezonesUpdated,
    SettingsChanged,
}

impl EventType {
    /// Get the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StatusChanged => "status_changed",
            EventType::BacklogQueued => "backlog_queued",
            EventType::BacklogSearched => "backlog_searched",
            EventType::SystemStarted => "system_started",
            EventType::TimezonesUpdated => "timezones_updated",
            EventType::SettingsChanged => "settings_changed",
        }
    }
}

/// Builder for creating activity log entries.
pub struct ActivityBuilder {
    event_type: EventType,
    message: String,
    show_id: Option<i64>,
    metadata: Option<String>,
}

impl ActivityBuilder {
    /// Create a new activity builder.
    pub fn new(event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            show_id: None,
            metadata: None,
        }
    }

    /// Associate with a show.
    pub fn show(mut self, show_id: i64) -> Self {
        self.show_id = Some(show_id);
        self
    }

    /// Add metadata as JSON.
    pub fn metadata<T: Serialize>(mut self, data: &T) -> Self {
        self.metadata = serde_json::to_string(data).ok();
        self
    }

    /// Log the activity to the database. Failures are logged, never returned.
    pub async fn log(self, db: &Arc<Mutex<Connection>>) {
        let db = db.lock().await;

        if let Err(e) = db.execute(
            r#"
            INSERT INTO activity (event_type, message, show_id, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, datetime('now'))
            "#,
            rusqlite::params![
                self.event_type.as_str(),
                self.message,
                self.show_id,
                self.metadata
            ],
        ) {
            tracing::error!(error = %e, "Failed to log activity");
        }
    }
}

/// Convenience function to log a simple event.
pub async fn log_event(
    db: &Arc<Mutex<Connection>>,
    event_type: EventType,
    message: impl Into<String>,
) {
    ActivityBuilder::new(event_type, message).log(db).await;
}

/// A stored activity entry.
#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: i64,
    pub event_type: String,
    pub message: String,
    pub show_id: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}

/// Most recent activity entries, newest first.
pub async fn recent(
    db: &Arc<Mutex<Connection>>,
    limit: i64,
) -> Result<Vec<Activity>, rusqlite::Error> {
    let db = db.lock().await;
    let mut stmt = db.prepare(
        r#"
        SELECT id, event_type, message, show_id, metadata, created_at
        FROM activity
        ORDER BY id DESC
        LIMIT ?1
        "#,
    )?;

    let rows = stmt
        .query_map([limit], |row| {
            let metadata: Option<String> = row.get(4)?;
            Ok(Activity {
                id: row.get(0)?,
                event_type: row.get(1)?,
                message: row.get(2)?,
                show_id: row.get(3)?,
                metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
