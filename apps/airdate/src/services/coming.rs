//! Coming episodes feed.
//!
//! Three selections are merged into one list: what airs this week, the next
//! episode of every show with nothing this week, and recently missed episodes
//! that are still wanted. Every row gets its air time converted from the
//! network's zone to the display zone.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::db::models::{serialize_display, StatusCode, StatusKind};
use crate::db::store::ShowEpisode;
use crate::db::{DbError, EpisodeQuery, EpisodeStore};
use crate::services::airtime::air_time_or;
use crate::services::timezones::{SharedTimezones, Zone};

const WINDOW_DAYS: u64 = 7;

/// Ordering of the coming episodes list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComingSort {
    #[default]
    Date,
    Show,
    Network,
}

impl ComingSort {
    /// Parses a sort key, `None` if it is not one of `date`, `show`, `network`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "date" => Some(ComingSort::Date),
            "show" => Some(ComingSort::Show),
            "network" => Some(ComingSort::Network),
            _ => None,
        }
    }

    /// Parses a sort key, falling back to `date`.
    pub fn parse_or_default(value: &str) -> Self {
        Self::parse(value).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComingSort::Date => "date",
            ComingSort::Show => "show",
            ComingSort::Network => "network",
        }
    }
}

/// User-adjustable display settings for the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComingEpisodesSettings {
    pub sort: ComingSort,
    pub display_paused: bool,
    pub missed_range_days: u32,
}

pub type SharedSettings = Arc<RwLock<ComingEpisodesSettings>>;

/// Dates covered by "this week": `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ComingWindow {
    pub fn week_from(start: NaiveDate) -> Self {
        Self {
            start,
            end: start + Days::new(WINDOW_DAYS),
        }
    }
}

/// One line of the coming episodes feed.
#[derive(Debug, Clone, Serialize)]
pub struct ComingEpisodeRow {
    pub show_id: i64,
    pub show_name: String,
    pub network: Option<String>,
    pub airs: Option<String>,
    pub paused: bool,
    pub season: i32,
    pub episode: i32,
    pub episode_name: Option<String>,
    pub description: Option<String>,
    pub air_date: NaiveDate,
    pub status: StatusCode,
    #[serde(serialize_with = "serialize_display")]
    pub status_name: StatusCode,
    pub local_air_time: DateTime<FixedOffset>,
    pub local_time_label: String,
}

pub struct ComingEpisodesAggregator {
    store: Arc<dyn EpisodeStore>,
    timezones: SharedTimezones,
    display_zone: Zone,
}

impl ComingEpisodesAggregator {
    pub fn new(store: Arc<dyn EpisodeStore>, timezones: SharedTimezones, display_zone: Zone) -> Self {
        Self {
            store,
            timezones,
            display_zone,
        }
    }

    pub fn display_zone(&self) -> Zone {
        self.display_zone
    }

    /// Builds the feed for `window`.
    ///
    /// Missed episodes are those still WANTED that aired in the
    /// `missed_range_days` before the window. Rows of paused shows are kept
    /// only when `include_paused` is set.
    pub async fn aggregate(
        &self,
        window: ComingWindow,
        missed_range_days: u32,
        sort: ComingSort,
        include_paused: bool,
    ) -> Result<Vec<ComingEpisodeRow>, DbError> {
        let this_week = self
            .store
            .query_episodes(&EpisodeQuery::AiringBetween {
                from: window.start,
                until: window.end,
                exclude: StatusKind::family(StatusKind::is_resolved),
            })
            .await?;

        let shows_this_week: HashSet<i64> = this_week.iter().map(|r| r.show.id).collect();

        let later = self
            .store
            .query_episodes(&EpisodeQuery::NextAiring {
                from: window.end,
                exclude: StatusKind::family(|k| k.is_downloaded() || k.is_snatched()),
            })
            .await?
            .into_iter()
            .filter(|r| !shows_this_week.contains(&r.show.id));

        let missed_from = window
            .start
            .checked_sub_days(Days::new(u64::from(missed_range_days)))
            .unwrap_or(NaiveDate::MIN);
        let missed = self
            .store
            .query_episodes(&EpisodeQuery::WithStatusBetween {
                kind: StatusKind::Wanted,
                from: missed_from,
                until: window.start,
            })
            .await?;

        let timezones = self.timezones.read().await;
        let mut rows: Vec<ComingEpisodeRow> = this_week
            .into_iter()
            .chain(later)
            .chain(missed)
            .filter(|r| include_paused || !r.show.paused)
            .filter_map(|r| {
                let network_zone =
                    timezones.timezone_for(r.show.network.as_deref(), self.display_zone);
                self.to_row(r, network_zone)
            })
            .collect();
        drop(timezones);

        sort_rows(&mut rows, sort);

        tracing::debug!(
            rows = rows.len(),
            start = %window.start,
            sort = sort.as_str(),
            include_paused,
            "Built coming episodes"
        );
        Ok(rows)
    }

    fn to_row(&self, item: ShowEpisode, network_zone: Zone) -> Option<ComingEpisodeRow> {
        let ShowEpisode { show, episode } = item;
        let air_date = episode.air_date?;

        let time = air_time_or(show.airs.as_deref(), NaiveTime::MIN);
        let aired = network_zone.localize(air_date.and_time(time));
        let local_air_time = self.display_zone.convert(aired);

        Some(ComingEpisodeRow {
            show_id: show.id,
            show_name: show.name,
            network: show.network,
            airs: show.airs,
            paused: show.paused,
            season: episode.season,
            episode: episode.episode,
            episode_name: episode.name,
            description: episode.description,
            air_date,
            status: episode.status,
            status_name: episode.status,
            local_time_label: local_air_time.format("%A %I:%M %p").to_string(),
            local_air_time,
        })
    }
}

/// Show name as sorted: lowercase, without a leading "a " or "the ".
pub fn sort_name(name: &str) -> String {
    let lower = name.to_lowercase();
    ["the ", "a "]
        .iter()
        .find_map(|article| lower.strip_prefix(article))
        .map(str::to_string)
        .unwrap_or(lower)
}

/// Stable sort of the feed by `sort`, ties broken by local air time.
pub fn sort_rows(rows: &mut [ComingEpisodeRow], sort: ComingSort) {
    match sort {
        ComingSort::Date => rows.sort_by_key(|r| r.local_air_time),
        ComingSort::Show => rows.sort_by_cached_key(|r| (sort_name(&r.show_name), r.local_air_time)),
        ComingSort::Network => {
            rows.sort_by(|a, b| {
                (a.network.as_deref().unwrap_or(""), a.local_air_time)
                    .cmp(&(b.network.as_deref().unwrap_or(""), b.local_air_time))
            })
        }
    }
}
