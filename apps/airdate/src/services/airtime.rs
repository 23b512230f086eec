//! Parsing of the free-text `airs` field of a show ("Monday 9:00 PM").

use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref AIRS_TIME: Regex = Regex::new(r"(?i)(\d{1,2}):(\d{2})(?:\s*([AP]M))?\b").unwrap();
}

/// Extracts a 24-hour `(hour, minute)` from an `airs` string.
///
/// Times with an AM/PM suffix are read as 12-hour times, bare times as
/// 24-hour. Returns `None` when no time is present or it is out of range.
pub fn parse_airs_time(airs: &str) -> Option<(u32, u32)> {
    let caps = AIRS_TIME.captures(airs)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;

    if let Some(meridiem) = caps.get(3) {
        let pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        match (pm, hour) {
            (true, 12) => {}
            (true, _) => hour += 12,
            (false, 12) => hour = 0,
            (false, _) => {}
        }
    }

    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Air time of a show, or `default` when `airs` is missing or unparseable.
pub fn air_time_or(airs: Option<&str>, default: NaiveTime) -> NaiveTime {
    airs.and_then(parse_airs_time)
        .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0))
        .unwrap_or(default)
}
