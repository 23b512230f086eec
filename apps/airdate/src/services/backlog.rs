//! Backlog queue.
//!
//! Segments that became searchable after a status change are queued here and
//! handed one at a time to a [`SegmentSearch`] by a background worker. A
//! segment already waiting for the same show is not queued twice.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::db::models::{BacklogSegment, StatusKind};
use crate::db::{EpisodeQuery, EpisodeStore};
use crate::error::{AppError, Result};
use crate::services::activity::{ActivityBuilder, EventType};

/// A queued backlog search.
#[derive(Debug, Clone, Serialize)]
pub struct BacklogItem {
    pub show_id: i64,
    pub show_name: String,
    pub segment: BacklogSegment,
    pub queued_at: DateTime<Utc>,
}

impl BacklogItem {
    fn same_target(&self, show_id: i64, segment: &BacklogSegment) -> bool {
        self.show_id == show_id && &self.segment == segment
    }
}

/// Performs the search for one backlog segment.
#[async_trait]
pub trait SegmentSearch: Send + Sync {
    /// Returns the number of episodes the search covered.
    async fn search(&self, item: &BacklogItem) -> Result<usize>;
}

/// Sending half of the queue plus the list of items still waiting.
#[derive(Clone)]
pub struct BacklogQueue {
    tx: mpsc::Sender<BacklogItem>,
    pending: Arc<Mutex<Vec<BacklogItem>>>,
}

impl BacklogQueue {
    /// Creates a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BacklogItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            pending: Arc::new(Mutex::new(Vec::new())),
        };
        (queue, rx)
    }

    /// Queues a search for `segment` of a show. Returns `false` when the same
    /// segment is already waiting or the queue is full.
    pub async fn enqueue(&self, show_id: i64, show_name: &str, segment: BacklogSegment) -> bool {
        let mut pending = self.pending.lock().await;
        if pending.iter().any(|i| i.same_target(show_id, &segment)) {
            tracing::debug!(show_id, segment = %segment, "Backlog segment already queued");
            return false;
        }

        let item = BacklogItem {
            show_id,
            show_name: show_name.to_string(),
            segment,
            queued_at: Utc::now(),
        };

        match self.tx.try_send(item.clone()) {
            Ok(()) => {
                tracing::info!(show_id, segment = %item.segment, "Queued backlog search");
                pending.push(item);
                true
            }
            Err(e) => {
                tracing::warn!(show_id, segment = %item.segment, error = %e, "Backlog queue rejected item");
                false
            }
        }
    }

    /// Items queued and not yet picked up by the worker, oldest first.
    pub async fn pending(&self) -> Vec<BacklogItem> {
        self.pending.lock().await.clone()
    }

    async fn take(&self, item: &BacklogItem) {
        self.pending
            .lock()
            .await
            .retain(|i| !i.same_target(item.show_id, &item.segment));
    }
}

/// Spawns the worker draining `rx` into `searcher`. Search errors are logged
/// and the worker moves on to the next item.
pub fn spawn_worker(
    queue: BacklogQueue,
    mut rx: mpsc::Receiver<BacklogItem>,
    searcher: Arc<dyn SegmentSearch>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Backlog worker started");

        while let Some(item) = rx.recv().await {
            queue.take(&item).await;

            match searcher.search(&item).await {
                Ok(count) => {
                    tracing::info!(
                        show_id = item.show_id,
                        segment = %item.segment,
                        episodes = count,
                        "Backlog search finished"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        show_id = item.show_id,
                        segment = %item.segment,
                        error = %e,
                        "Backlog search failed"
                    );
                }
            }
        }

        tracing::info!("Backlog worker stopped");
    })
}

/// Records the wanted episodes of each segment in the activity log. Provider
/// searches hook in behind this.
pub struct ActivitySegmentSearch {
    store: Arc<dyn EpisodeStore>,
    db: Arc<Mutex<Connection>>,
}

impl ActivitySegmentSearch {
    pub fn new(store: Arc<dyn EpisodeStore>, db: Arc<Mutex<Connection>>) -> Self {
        Self { store, db }
    }
}

#[async_trait]
impl SegmentSearch for ActivitySegmentSearch {
    async fn search(&self, item: &BacklogItem) -> Result<usize> {
        let wanted = self
            .store
            .query_episodes(&EpisodeQuery::InSegment {
                show_id: item.show_id,
                segment: item.segment.clone(),
                kind: StatusKind::Wanted,
            })
            .await
            .map_err(AppError::Database)?;

        let episodes: Vec<String> = wanted
            .iter()
            .map(|r| r.episode.number().to_string())
            .collect();

        ActivityBuilder::new(
            EventType::BacklogSearched,
            format!(
                "Backlog search for {} {}: {} wanted episode(s)",
                item.show_name,
                item.segment,
                episodes.len()
            ),
        )
        .show(item.show_id)
        .metadata(&serde_json::json!({
            "segment": item.segment,
            "episodes": episodes,
        }))
        .log(&self.db)
        .await;

        Ok(wanted.len())
    }
}
