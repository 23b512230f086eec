//! Episode store: the only code that touches the `tv_shows` and `episodes`
//! tables on behalf of the services.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::models::{BacklogSegment, Episode, Show, StatusCode, StatusKind};
use super::DbError;

/// An episode together with the show it belongs to.
#[derive(Debug, Clone)]
pub struct ShowEpisode {
    pub show: Show,
    pub episode: Episode,
}

/// Episode selections used by the coming-episodes feed, the calendar and
/// the backlog worker. Only `ContinuingBetween` returns specials (season 0).
#[derive(Debug, Clone)]
pub enum EpisodeQuery {
    /// Episodes airing in `[from, until)` whose status kind is not in `exclude`.
    AiringBetween {
        from: NaiveDate,
        until: NaiveDate,
        exclude: Vec<StatusKind>,
    },
    /// Per show, the earliest episode airing on or after `from` whose status
    /// kind is not in `exclude`.
    NextAiring {
        from: NaiveDate,
        exclude: Vec<StatusKind>,
    },
    /// Episodes of status kind `kind` airing in `[from, until)`.
    WithStatusBetween {
        kind: StatusKind,
        from: NaiveDate,
        until: NaiveDate,
    },
    /// Episodes of continuing, unpaused shows airing in `[from, until)`.
    ContinuingBetween { from: NaiveDate, until: NaiveDate },
    /// Episodes of one show inside a backlog segment with status kind `kind`.
    InSegment {
        show_id: i64,
        segment: BacklogSegment,
        kind: StatusKind,
    },
}

/// Read/write access to shows and episodes.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    async fn find_show(&self, show_id: i64) -> Result<Option<Show>, DbError>;

    async fn find_episode(
        &self,
        show_id: i64,
        season: i32,
        episode: i32,
    ) -> Result<Option<Episode>, DbError>;

    /// All episodes of a show ordered by season and episode.
    async fn list_episodes(&self, show_id: i64) -> Result<Vec<Episode>, DbError>;

    /// Writes the mutable fields of an episode (status and location).
    async fn persist_episode(&self, episode: &Episode) -> Result<(), DbError>;

    async fn query_episodes(&self, query: &EpisodeQuery) -> Result<Vec<ShowEpisode>, DbError>;
}

const SHOW_COLUMNS: &str = "id, name, network, airs, status, air_by_date, paused, runtime, language";

const EPISODE_COLUMNS: &str =
    "id, show_id, season, episode, name, description, air_date, status, location";

const SHOW_EPISODE_COLUMNS: &str = r#"
    s.id, s.name, s.network, s.airs, s.status, s.air_by_date, s.paused, s.runtime, s.language,
    e.id, e.show_id, e.season, e.episode, e.name, e.description, e.air_date, e.status, e.location
"#;

/// SQLite-backed store sharing the application connection.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Create a new store wrapped in Arc for shared access.
    pub fn new_shared(db: Arc<Mutex<Connection>>) -> Arc<Self> {
        Arc::new(Self::new(db))
    }
}

#[async_trait]
impl EpisodeStore for SqliteStore {
    async fn find_show(&self, show_id: i64) -> Result<Option<Show>, DbError> {
        let db = self.db.lock().await;
        let show = db
            .query_row(
                &format!("SELECT {} FROM tv_shows WHERE id = ?1", SHOW_COLUMNS),
                [show_id],
                |row| map_show_row(row, 0),
            )
            .optional()?;
        Ok(show)
    }

    async fn find_episode(
        &self,
        show_id: i64,
        season: i32,
        episode: i32,
    ) -> Result<Option<Episode>, DbError> {
        let db = self.db.lock().await;
        let episode = db
            .query_row(
                &format!(
                    "SELECT {} FROM episodes WHERE show_id = ?1 AND season = ?2 AND episode = ?3",
                    EPISODE_COLUMNS
                ),
                rusqlite::params![show_id, season, episode],
                |row| map_episode_row(row, 0),
            )
            .optional()?;
        Ok(episode)
    }

    async fn list_episodes(&self, show_id: i64) -> Result<Vec<Episode>, DbError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {} FROM episodes WHERE show_id = ?1 ORDER BY season, episode",
            EPISODE_COLUMNS
        ))?;
        let episodes = stmt
            .query_map([show_id], |row| map_episode_row(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(episodes)
    }

    async fn persist_episode(&self, episode: &Episode) -> Result<(), DbError> {
        let db = self.db.lock().await;
        let changed = db.execute(
            r#"
            UPDATE episodes SET status = ?1, location = ?2, updated_at = datetime('now')
            WHERE id = ?3
            "#,
            rusqlite::params![episode.status.0, episode.location, episode.id],
        )?;

        if changed == 0 {
            return Err(DbError::Connection(rusqlite::Error::QueryReturnedNoRows));
        }
        Ok(())
    }

    async fn query_episodes(&self, query: &EpisodeQuery) -> Result<Vec<ShowEpisode>, DbError> {
        let (sql, params) = build_query(query);
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), map_show_episode_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Renders an `EpisodeQuery` to SQL with positional parameters.
fn build_query(query: &EpisodeQuery) -> (String, Vec<Value>) {
    let mut params = Vec::new();

    let sql = match query {
        EpisodeQuery::AiringBetween {
            from,
            until,
            exclude,
        } => {
            params.push(date_value(*from));
            params.push(date_value(*until));
            let excluded = kind_filter(exclude, &mut params);
            format!(
                r#"
                SELECT {SHOW_EPISODE_COLUMNS}
                FROM episodes e JOIN tv_shows s ON s.id = e.show_id
                WHERE e.season != 0 AND e.air_date >= ? AND e.air_date < ? AND {excluded}
                ORDER BY e.air_date, s.id, e.season, e.episode
                "#
            )
        }
        EpisodeQuery::NextAiring { from, exclude } => {
            params.push(date_value(*from));
            let excluded = kind_filter(exclude, &mut params);
            format!(
                r#"
                SELECT {SHOW_EPISODE_COLUMNS}
                FROM (
                    SELECT e.*, ROW_NUMBER() OVER (
                        PARTITION BY e.show_id ORDER BY e.air_date, e.season, e.episode
                    ) AS rn
                    FROM episodes e
                    WHERE e.season != 0 AND e.air_date >= ? AND {excluded}
                ) e
                JOIN tv_shows s ON s.id = e.show_id
                WHERE e.rn = 1
                ORDER BY e.air_date, s.id
                "#
            )
        }
        EpisodeQuery::WithStatusBetween { kind, from, until } => {
            params.push(date_value(*from));
            params.push(date_value(*until));
            params.push(Value::Integer(kind.code()));
            format!(
                r#"
                SELECT {SHOW_EPISODE_COLUMNS}
                FROM episodes e JOIN tv_shows s ON s.id = e.show_id
                WHERE e.season != 0 AND e.air_date >= ? AND e.air_date < ?
                  AND (e.status % 100) = ?
                ORDER BY e.air_date, s.id, e.season, e.episode
                "#
            )
        }
        EpisodeQuery::ContinuingBetween { from, until } => {
            params.push(date_value(*from));
            params.push(date_value(*until));
            format!(
                r#"
                SELECT {SHOW_EPISODE_COLUMNS}
                FROM episodes e JOIN tv_shows s ON s.id = e.show_id
                WHERE s.status = 'Continuing' AND s.paused = 0
                  AND e.air_date >= ? AND e.air_date < ?
                ORDER BY s.id, e.air_date, e.season, e.episode
                "#
            )
        }
        EpisodeQuery::InSegment {
            show_id,
            segment,
            kind,
        } => {
            params.push(Value::Integer(*show_id));
            let segment_filter = match segment {
                BacklogSegment::Season(season) => {
                    params.push(Value::Integer(i64::from(*season)));
                    "e.season = ?"
                }
                BacklogSegment::Month(month) => {
                    params.push(Value::Text(month.clone()));
                    "substr(e.air_date, 1, 7) = ?"
                }
            };
            params.push(Value::Integer(kind.code()));
            format!(
                r#"
                SELECT {SHOW_EPISODE_COLUMNS}
                FROM episodes e JOIN tv_shows s ON s.id = e.show_id
                WHERE e.show_id = ? AND e.season != 0 AND {segment_filter}
                  AND (e.status % 100) = ?
                ORDER BY e.season, e.episode
                "#
            )
        }
    };

    (sql, params)
}

/// `NOT IN` filter on the status kind of `e.status`.
fn kind_filter(exclude: &[StatusKind], params: &mut Vec<Value>) -> String {
    if exclude.is_empty() {
        return "1 = 1".to_string();
    }
    params.extend(exclude.iter().map(|k| Value::Integer(k.code())));
    let placeholders = vec!["?"; exclude.len()].join(", ");
    format!("(e.status % 100) NOT IN ({})", placeholders)
}

fn date_value(date: NaiveDate) -> Value {
    Value::Text(date.format("%Y-%m-%d").to_string())
}

/// Maps show columns starting at `offset`.
fn map_show_row(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Show> {
    Ok(Show {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        network: row.get(offset + 2)?,
        airs: row.get(offset + 3)?,
        status: row.get(offset + 4)?,
        air_by_date: row.get(offset + 5)?,
        paused: row.get(offset + 6)?,
        runtime: row.get(offset + 7)?,
        language: row.get(offset + 8)?,
    })
}

/// Maps episode columns starting at `offset`.
fn map_episode_row(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: row.get(offset)?,
        show_id: row.get(offset + 1)?,
        season: row.get(offset + 2)?,
        episode: row.get(offset + 3)?,
        name: row.get(offset + 4)?,
        description: row.get(offset + 5)?,
        air_date: row.get(offset + 6)?,
        status: StatusCode(row.get(offset + 7)?),
        location: row.get(offset + 8)?,
    })
}

fn map_show_episode_row(row: &rusqlite::Row) -> rusqlite::Result<ShowEpisode> {
    Ok(ShowEpisode {
        show: map_show_row(row, 0)?,
        episode: map_episode_row(row, 9)?,
    })
}
