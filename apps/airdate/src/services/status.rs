//! Bulk episode status changes.
//!
//! The engine validates a request as a whole, then applies the new status to
//! each episode independently so one bad episode never blocks the others.
//! Episodes set to WANTED yield the backlog segments that became searchable;
//! queueing them is left to the caller.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::db::models::{BacklogSegment, Episode, EpisodeNumber, Show, StatusCode, StatusKind};
use crate::db::{DbError, EpisodeStore};
use crate::services::locks::EpisodeLocks;

/// Errors that reject a whole request before any episode is touched.
#[derive(Debug, Error)]
pub enum StatusChangeError {
    #[error("Show {0} not found")]
    ShowNotFound(i64),

    #[error("Invalid status code {0}")]
    InvalidStatus(i64),

    #[error("No episodes specified")]
    NoEpisodesSpecified,

    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

/// Why a single episode kept its previous status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EpisodeError {
    #[error("Episode {0} not found")]
    EpisodeNotFound(EpisodeNumber),

    #[error("Episode {0} has not aired yet, leaving it unaired")]
    Unaired(EpisodeNumber),

    #[error("Episode {number} has no file at its location, refusing to mark it {status}")]
    RejectedTransition {
        number: EpisodeNumber,
        status: StatusCode,
    },

    #[error("Failed to save episode {number}: {reason}")]
    PersistenceFailure {
        number: EpisodeNumber,
        reason: String,
    },
}

impl Serialize for EpisodeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of a status change request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusChangeReport {
    pub applied_count: usize,
    pub segments: BTreeSet<BacklogSegment>,
    pub errors: Vec<EpisodeError>,
}

/// Applies status changes to the episodes of one show.
pub struct StatusTransitionEngine {
    store: Arc<dyn EpisodeStore>,
    locks: Arc<EpisodeLocks>,
}

impl StatusTransitionEngine {
    pub fn new(store: Arc<dyn EpisodeStore>, locks: Arc<EpisodeLocks>) -> Self {
        Self { store, locks }
    }

    /// Sets `status` on every listed episode of `show_id`.
    ///
    /// Request-level problems are checked first, in this order: an empty
    /// episode list, a status code outside the vocabulary, an unknown show.
    /// After that each episode succeeds or fails on its own and failures are
    /// collected in the report.
    pub async fn apply_status_change(
        &self,
        show_id: i64,
        episodes: &[EpisodeNumber],
        status: i64,
    ) -> Result<StatusChangeReport, StatusChangeError> {
        if episodes.is_empty() {
            return Err(StatusChangeError::NoEpisodesSpecified);
        }

        let status = StatusCode(status);
        let Some((kind, _)) = status.split() else {
            return Err(StatusChangeError::InvalidStatus(status.0));
        };

        let show = self
            .store
            .find_show(show_id)
            .await?
            .ok_or(StatusChangeError::ShowNotFound(show_id))?;

        let mut report = StatusChangeReport::default();

        for &number in episodes {
            match self.apply_one(&show, number, status, kind).await {
                Ok(episode) => {
                    report.applied_count += 1;
                    if kind == StatusKind::Wanted {
                        if let Some(segment) = segment_for(&show, &episode) {
                            report.segments.insert(segment);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(show_id, episode = %number, error = %e, "Status change skipped");
                    report.errors.push(e);
                }
            }
        }

        tracing::info!(
            show_id,
            status = %status,
            applied = report.applied_count,
            failed = report.errors.len(),
            segments = report.segments.len(),
            "Applied status change"
        );

        Ok(report)
    }

    /// Changes one episode under its lock and returns the saved episode.
    async fn apply_one(
        &self,
        show: &Show,
        number: EpisodeNumber,
        status: StatusCode,
        kind: StatusKind,
    ) -> Result<Episode, EpisodeError> {
        let _guard = self.locks.lock(show.id, number).await;

        let mut episode = self
            .store
            .find_episode(show.id, number.season, number.episode)
            .await
            .map_err(|e| EpisodeError::PersistenceFailure {
                number,
                reason: e.to_string(),
            })?
            .ok_or(EpisodeError::EpisodeNotFound(number))?;

        let current = episode.status.kind();
        if current == StatusKind::Unaired {
            return Err(EpisodeError::Unaired(number));
        }

        if kind.is_downloaded()
            && !current.has_download_evidence()
            && !file_exists(episode.location.as_deref()).await
        {
            return Err(EpisodeError::RejectedTransition { number, status });
        }

        episode.status = status;
        self.store
            .persist_episode(&episode)
            .await
            .map_err(|e| EpisodeError::PersistenceFailure {
                number,
                reason: e.to_string(),
            })?;

        tracing::debug!(show_id = show.id, episode = %number, status = %status, "Episode status saved");
        Ok(episode)
    }
}

/// Backlog segment an episode belongs to: its air month for air-by-date
/// shows, its season otherwise.
pub fn segment_for(show: &Show, episode: &Episode) -> Option<BacklogSegment> {
    if !show.air_by_date {
        return Some(BacklogSegment::Season(episode.season));
    }

    match episode.air_date {
        Some(date) => Some(BacklogSegment::month_of(date)),
        None => {
            tracing::warn!(
                show_id = show.id,
                episode = %episode.number(),
                "Air-by-date episode has no air date, no backlog segment"
            );
            None
        }
    }
}

async fn file_exists(location: Option<&str>) -> bool {
    match location {
        Some(path) if !path.is_empty() => tokio::fs::metadata(Path::new(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db_memory, EpisodeQuery, SqliteStore};
    use crate::db::store::ShowEpisode;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    const SEED: &str = r#"
        INSERT INTO tv_shows (id, name, network, airs, status, air_by_date) VALUES
            (1, 'Regular', 'NBC', 'Monday 9:00 PM', 'Continuing', 0),
            (2, 'Daily', 'Comedy Central', '11:00 PM', 'Continuing', 1);
        INSERT INTO episodes (show_id, season, episode, air_date, status, location) VALUES
            (1, 1, 1, '2024-01-01', 5, NULL),
            (1, 1, 2, '2024-01-08', 1, NULL),
            (1, 2, 1, '2024-09-01', 5, NULL),
            (1, 2, 2, '2024-09-08', 2, NULL),
            (2, 2024, 1, '2024-03-04', 5, NULL),
            (2, 2024, 2, NULL, 5, NULL);
    "#;

    fn engine_with(seed: &str) -> (StatusTransitionEngine, Arc<SqliteStore>) {
        let conn = init_db_memory().unwrap();
        conn.execute_batch(seed).unwrap();
        let store = SqliteStore::new_shared(Arc::new(Mutex::new(conn)));
        let engine = StatusTransitionEngine::new(store.clone(), Arc::new(EpisodeLocks::new()));
        (engine, store)
    }

    fn eps(list: &[(i32, i32)]) -> Vec<EpisodeNumber> {
        list.iter().map(|&(s, e)| EpisodeNumber::new(s, e)).collect()
    }

    #[tokio::test]
    async fn test_validation_order() {
        let (engine, _) = engine_with(SEED);

        let err = engine.apply_status_change(99, &[], 8).await.unwrap_err();
        assert!(matches!(err, StatusChangeError::NoEpisodesSpecified));

        let err = engine
            .apply_status_change(99, &eps(&[(1, 1)]), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, StatusChangeError::InvalidStatus(8)));

        let err = engine
            .apply_status_change(99, &eps(&[(1, 1)]), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, StatusChangeError::ShowNotFound(99)));
    }

    #[tokio::test]
    async fn test_quality_on_other_kinds_is_invalid() {
        let (engine, store) = engine_with(SEED);

        for code in [203, 101] {
            let err = engine
                .apply_status_change(1, &eps(&[(1, 1)]), code)
                .await
                .unwrap_err();
            assert!(
                matches!(err, StatusChangeError::InvalidStatus(c) if c == code),
                "{code}: {err:?}"
            );
        }

        let ep = store.find_episode(1, 1, 1).await.unwrap().unwrap();
        assert_eq!(ep.status, StatusCode(5));

        let report = engine
            .apply_status_change(1, &eps(&[(1, 1)]), 7)
            .await
            .unwrap();
        assert_eq!(report.applied_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_changes_to_one_episode() {
        let (engine, store) = engine_with(SEED);
        let engine = Arc::new(engine);

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.apply_status_change(1, &eps(&[(1, 1)]), 3).await })
        };
        let second = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.apply_status_change(1, &eps(&[(1, 1)]), 7).await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first.applied_count, 1);
        assert_eq!(second.applied_count, 1);

        let ep = store.find_episode(1, 1, 1).await.unwrap().unwrap();
        assert!(
            ep.status == StatusCode(3) || ep.status == StatusCode(7),
            "unexpected status {}",
            ep.status.0
        );
    }

    #[tokio::test]
    async fn test_wanted_collects_season_segments() {
        let (engine, store) = engine_with(SEED);

        let report = engine
            .apply_status_change(1, &eps(&[(1, 1), (2, 1)]), 3)
            .await
            .unwrap();

        assert_eq!(report.applied_count, 2);
        assert!(report.errors.is_empty());
        assert_eq!(
            report.segments.into_iter().collect::<Vec<_>>(),
            vec![BacklogSegment::Season(1), BacklogSegment::Season(2)]
        );

        let ep = store.find_episode(1, 2, 1).await.unwrap().unwrap();
        assert_eq!(ep.status.kind(), StatusKind::Wanted);
    }

    #[tokio::test]
    async fn test_unaired_is_left_alone() {
        let (engine, store) = engine_with(SEED);

        let report = engine
            .apply_status_change(1, &eps(&[(1, 2)]), 3)
            .await
            .unwrap();

        assert_eq!(report.applied_count, 0);
        assert_eq!(report.errors, vec![EpisodeError::Unaired(EpisodeNumber::new(1, 2))]);
        assert!(report.segments.is_empty());

        let ep = store.find_episode(1, 1, 2).await.unwrap().unwrap();
        assert_eq!(ep.status.kind(), StatusKind::Unaired);
    }

    #[tokio::test]
    async fn test_missing_episode_does_not_block_others() {
        let (engine, _) = engine_with(SEED);

        let report = engine
            .apply_status_change(1, &eps(&[(9, 9), (1, 1)]), 5)
            .await
            .unwrap();

        assert_eq!(report.applied_count, 1);
        assert_eq!(
            report.errors,
            vec![EpisodeError::EpisodeNotFound(EpisodeNumber::new(9, 9))]
        );
        assert!(report.errors[0].to_string().contains("9x9"));
    }

    #[tokio::test]
    async fn test_downloaded_requires_file_or_evidence() {
        let (engine, store) = engine_with(SEED);
        let downloaded = StatusCode::new(StatusKind::Downloaded, crate::db::models::Quality::Hdtv);

        // skipped, no file
        let report = engine
            .apply_status_change(1, &eps(&[(1, 1)]), downloaded.0)
            .await
            .unwrap();
        assert_eq!(report.applied_count, 0);
        assert!(matches!(
            report.errors[0],
            EpisodeError::RejectedTransition { .. }
        ));

        // snatched counts as evidence
        let report = engine
            .apply_status_change(1, &eps(&[(2, 2)]), downloaded.0)
            .await
            .unwrap();
        assert_eq!(report.applied_count, 1);

        // a real file is accepted
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut ep = store.find_episode(1, 1, 1).await.unwrap().unwrap();
        ep.location = Some(file.path().to_string_lossy().into_owned());
        store.persist_episode(&ep).await.unwrap();

        let report = engine
            .apply_status_change(1, &eps(&[(1, 1)]), downloaded.0)
            .await
            .unwrap();
        assert_eq!(report.applied_count, 1);
        let ep = store.find_episode(1, 1, 1).await.unwrap().unwrap();
        assert_eq!(ep.status, downloaded);
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let (engine, store) = engine_with(SEED);
        let dir = tempfile::tempdir().unwrap();
        let mut ep = store.find_episode(1, 1, 1).await.unwrap().unwrap();
        ep.location = Some(dir.path().to_string_lossy().into_owned());
        store.persist_episode(&ep).await.unwrap();

        let report = engine
            .apply_status_change(1, &eps(&[(1, 1)]), 4)
            .await
            .unwrap();
        assert_eq!(report.applied_count, 0);
    }

    #[tokio::test]
    async fn test_air_by_date_segments_are_months() {
        let (engine, _) = engine_with(SEED);

        let report = engine
            .apply_status_change(2, &eps(&[(2024, 1), (2024, 2)]), 3)
            .await
            .unwrap();

        assert_eq!(report.applied_count, 2);
        assert_eq!(
            report.segments.into_iter().collect::<Vec<_>>(),
            vec![BacklogSegment::Month("2024-03".to_string())]
        );
    }

    #[tokio::test]
    async fn test_non_wanted_status_yields_no_segments() {
        let (engine, _) = engine_with(SEED);
        let report = engine
            .apply_status_change(1, &eps(&[(1, 1), (2, 1)]), 6)
            .await
            .unwrap();
        assert_eq!(report.applied_count, 2);
        assert!(report.segments.is_empty());
    }

    /// Store whose writes always fail.
    struct ReadOnlyStore(SqliteStore);

    #[async_trait]
    impl EpisodeStore for ReadOnlyStore {
        async fn find_show(&self, show_id: i64) -> Result<Option<Show>, DbError> {
            self.0.find_show(show_id).await
        }

        async fn find_episode(
            &self,
            show_id: i64,
            season: i32,
            episode: i32,
        ) -> Result<Option<Episode>, DbError> {
            self.0.find_episode(show_id, season, episode).await
        }

        async fn list_episodes(&self, show_id: i64) -> Result<Vec<Episode>, DbError> {
            self.0.list_episodes(show_id).await
        }

        async fn persist_episode(&self, _episode: &Episode) -> Result<(), DbError> {
            Err(DbError::Connection(rusqlite::Error::InvalidQuery))
        }

        async fn query_episodes(&self, query: &EpisodeQuery) -> Result<Vec<ShowEpisode>, DbError> {
            self.0.query_episodes(query).await
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_is_per_episode() {
        let conn = init_db_memory().unwrap();
        conn.execute_batch(SEED).unwrap();
        let store = ReadOnlyStore(SqliteStore::new(Arc::new(Mutex::new(conn))));
        let engine = StatusTransitionEngine::new(Arc::new(store), Arc::new(EpisodeLocks::new()));

        let report = engine
            .apply_status_change(1, &eps(&[(1, 1), (2, 1)]), 3)
            .await
            .unwrap();

        assert_eq!(report.applied_count, 0);
        assert_eq!(report.errors.len(), 2);
        assert!(report
            .errors
            .iter()
            .all(|e| matches!(e, EpisodeError::PersistenceFailure { .. })));
        assert!(report.segments.is_empty());
    }

    #[test]
    fn test_errors_serialize_as_strings() {
        let errors = vec![EpisodeError::Unaired(EpisodeNumber::new(2, 5))];
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!(["Episode 2x5 has not aired yet, leaving it unaired"])
        );
    }
}
