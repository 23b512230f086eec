//! Configuration module for Airdate.
//!
//! Loads configuration from `config.toml` with environment variable overrides.

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::AppError;
use crate::services::coming::{ComingEpisodesSettings, ComingSort};
use crate::services::timezones::Zone;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub coming_episodes: ComingEpisodesConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub timezones: TimezoneConfig,
    #[serde(default)]
    pub backlog: BacklogConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed to call the API from a browser; same-origin only when empty.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/airdate.db")
}

/// Initial coming-episodes display settings
#[derive(Debug, Clone, Deserialize)]
pub struct ComingEpisodesConfig {
    /// One of `date`, `show` or `network`.
    #[serde(default = "default_sort")]
    pub sort: String,
    #[serde(default)]
    pub display_paused: bool,
    /// How many days back missed WANTED episodes are still listed.
    #[serde(default = "default_missed_range")]
    pub missed_range_days: u32,
}

impl Default for ComingEpisodesConfig {
    fn default() -> Self {
        Self {
            sort: default_sort(),
            display_paused: false,
            missed_range_days: default_missed_range(),
        }
    }
}

fn default_sort() -> String {
    "date".to_string()
}

fn default_missed_range() -> u32 {
    7
}

/// iCalendar feed window
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_past_weeks")]
    pub past_weeks: u32,
    #[serde(default = "default_future_weeks")]
    pub future_weeks: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            past_weeks: default_past_weeks(),
            future_weeks: default_future_weeks(),
        }
    }
}

fn default_past_weeks() -> u32 {
    2
}

fn default_future_weeks() -> u32 {
    52
}

/// Timezone configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TimezoneConfig {
    /// IANA name of the display timezone; the system zone when unset.
    #[serde(default)]
    pub local: Option<String>,
    /// File of `Network:Area/City` lines replacing the bundled table.
    #[serde(default)]
    pub network_file: Option<PathBuf>,
    /// URL of a network table to refresh from on `update_schedule`.
    #[serde(default)]
    pub update_url: Option<String>,
    #[serde(default = "default_update_schedule")]
    pub update_schedule: String,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            local: None,
            network_file: None,
            update_url: None,
            update_schedule: default_update_schedule(),
        }
    }
}

fn default_update_schedule() -> String {
    "0 0 4 * * *".to_string()
}

/// Backlog queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BacklogConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    100
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` in current directory (optional)
    /// 3. Environment variables with `AIRDATE_` prefix
    ///
    /// Environment variables use double underscore for nesting:
    /// - `AIRDATE_SERVER__PORT=9000` sets `server.port`
    /// - `AIRDATE_TIMEZONES__LOCAL=Europe/Paris` sets `timezones.local`
    pub fn load() -> Result<Self, AppError> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(config_path: &str) -> Result<Self, AppError> {
        let config = ConfigLoader::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("database.path", "./data/airdate.db")?
            .set_default("coming_episodes.sort", "date")?
            .set_default("coming_episodes.display_paused", false)?
            .set_default("coming_episodes.missed_range_days", 7)?
            .set_default("calendar.past_weeks", 2)?
            .set_default("calendar.future_weeks", 52)?
            .set_default("backlog.queue_capacity", 100)?
            .add_source(File::with_name(config_path).required(false))
            // AIRDATE_SERVER__PORT=9000 -> server.port = 9000
            .add_source(
                Environment::with_prefix("AIRDATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration, warning about values that will be replaced.
    fn validate(&self) -> Result<(), AppError> {
        if ComingSort::parse(&self.coming_episodes.sort).is_none() {
            tracing::warn!(
                sort = %self.coming_episodes.sort,
                "Unknown coming episodes sort, using 'date'"
            );
        }

        if let Some(name) = &self.timezones.local {
            if name.parse::<chrono_tz::Tz>().is_err() {
                tracing::warn!(timezone = %name, "Unknown local timezone, using system zone");
            }
        }

        if self.backlog.queue_capacity == 0 {
            return Err(config::ConfigError::Message(
                "backlog.queue_capacity must be greater than zero".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Zone coming episodes and the calendar are displayed in.
    pub fn local_zone(&self) -> Zone {
        self.timezones
            .local
            .as_deref()
            .and_then(|name| name.parse().ok())
            .map(Zone::Named)
            .unwrap_or(Zone::System)
    }

    /// Initial coming-episodes settings.
    pub fn coming_settings(&self) -> ComingEpisodesSettings {
        ComingEpisodesSettings {
            sort: ComingSort::parse(&self.coming_episodes.sort).unwrap_or_default(),
            display_paused: self.coming_episodes.display_paused,
            missed_range_days: self.coming_episodes.missed_range_days,
        }
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> std::net::SocketAddr {
        use std::net::{IpAddr, Ipv4Addr, SocketAddr};
        let ip: IpAddr = self.server.host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid host '{}', using 0.0.0.0", self.server.host);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.server.port)
    }
}
