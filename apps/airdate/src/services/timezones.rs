//! Timezones: the display zone and the network timezone table.
//!
//! Air times are published in the broadcasting network's local time. The
//! table maps network names to IANA zones so those times can be converted to
//! the zone the user sees.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use reqwest::Client;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};

const BUNDLED_TABLE: &str = include_str!("../../data/network_timezones.txt");
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A timezone: a named IANA zone or whatever the host is set to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Named(Tz),
    System,
}

impl Zone {
    /// Interprets a wall-clock time in this zone.
    ///
    /// Times skipped by a DST change are moved one hour forward; repeated
    /// times resolve to the earlier instant.
    pub fn localize(&self, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        match self {
            Zone::Named(tz) => resolve_local(tz, naive),
            Zone::System => resolve_local(&Local, naive),
        }
    }

    /// The same instant expressed in this zone.
    pub fn convert(&self, instant: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            Zone::Named(tz) => instant.with_timezone(tz).fixed_offset(),
            Zone::System => instant.with_timezone(&Local).fixed_offset(),
        }
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.convert(Utc::now().fixed_offset())
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

fn resolve_local<Z: TimeZone>(tz: &Z, naive: NaiveDateTime) -> DateTime<FixedOffset> {
    let resolved = match tz.from_local_datetime(&naive) {
        LocalResult::None => tz
            .from_local_datetime(&(naive + chrono::Duration::hours(1)))
            .earliest(),
        other => other.earliest(),
    };

    match resolved {
        Some(dt) => dt.fixed_offset(),
        None => {
            tracing::warn!(time = %naive, "Unresolvable local time, treating as UTC");
            Utc.from_utc_datetime(&naive).fixed_offset()
        }
    }
}

/// Case-insensitive map from network name to zone.
#[derive(Debug, Clone, Default)]
pub struct NetworkTimezones {
    zones: HashMap<String, Tz>,
}

pub type SharedTimezones = Arc<RwLock<NetworkTimezones>>;

impl NetworkTimezones {
    /// Parses `Network Name:Area/City` lines. Blank lines and `#` comments are
    /// ignored, entries naming an unknown zone are skipped.
    pub fn parse(text: &str) -> Self {
        let mut zones = HashMap::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((network, zone)) = line.rsplit_once(':') else {
                tracing::warn!(line = line_no + 1, "Malformed network timezone entry");
                continue;
            };

            match zone.trim().parse::<Tz>() {
                Ok(tz) => {
                    zones.insert(network.trim().to_lowercase(), tz);
                }
                Err(_) => {
                    tracing::warn!(
                        line = line_no + 1,
                        network = network.trim(),
                        zone = zone.trim(),
                        "Unknown timezone in network table, skipping"
                    );
                }
            }
        }

        Self { zones }
    }

    /// The table shipped with the service.
    pub fn bundled() -> Self {
        Self::parse(BUNDLED_TABLE)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::Internal(format!(
                "Failed to read network timezones from {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::parse(&text))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Zone of `network`, or `fallback` when the network is missing or unknown.
    pub fn timezone_for(&self, network: Option<&str>, fallback: Zone) -> Zone {
        network
            .map(|n| n.trim().to_lowercase())
            .and_then(|n| self.zones.get(&n).copied())
            .map(Zone::Named)
            .unwrap_or(fallback)
    }

    pub fn into_shared(self) -> SharedTimezones {
        Arc::new(RwLock::new(self))
    }
}

/// Downloads a fresh network table and swaps it into the shared one.
pub struct TimezoneUpdater {
    client: Client,
    url: String,
}

impl TimezoneUpdater {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fetches the table and replaces `shared` with it, returning the number
    /// of networks loaded. On any failure the current table is kept.
    pub async fn refresh(&self, shared: &SharedTimezones) -> Result<usize> {
        tracing::debug!(url = %self.url, "Fetching network timezones");

        let text = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Internal(format!("Network timezone download failed: {}", e)))?
            .text()
            .await
            .map_err(|e| AppError::Internal(format!("Network timezone download failed: {}", e)))?;

        let table = NetworkTimezones::parse(&text);
        if table.is_empty() {
            return Err(AppError::Internal(
                "Downloaded network timezone table has no usable entries".to_string(),
            ));
        }

        let count = table.len();
        *shared.write().await = table;
        tracing::info!(networks = count, "Network timezones updated");
        Ok(count)
    }
}
