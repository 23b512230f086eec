//! Typed parsing of loosely formatted request values.
//!
//! Browser forms send checkboxes as `on`, query strings use `1` or `true`,
//! and episode lists come as `SxE|SxE`. These are turned into real types here
//! so the services never see strings.

use serde::{de, Deserialize, Deserializer};

use crate::db::models::EpisodeNumber;
use crate::error::{AppError, Result};

/// A boolean flag accepting `on`/`off`, `true`/`false`, `yes`/`no` and `1`/`0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flag(pub bool);

impl Flag {
    pub fn parse(value: &str) -> Option<bool> {
        match value.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Some(true),
            "off" | "false" | "no" | "0" | "" => Some(false),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Flag::parse(&raw)
            .map(Flag)
            .ok_or_else(|| de::Error::custom(format!("invalid flag value '{}'", raw)))
    }
}

impl From<Flag> for bool {
    fn from(flag: Flag) -> Self {
        flag.0
    }
}

/// Parses `SxE|SxE|...`; empty entries are ignored.
pub fn parse_episode_list(eps: &str) -> Result<Vec<EpisodeNumber>> {
    eps.split('|')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| e.parse().map_err(AppError::BadRequest))
        .collect()
}
