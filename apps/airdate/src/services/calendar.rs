//! iCalendar (RFC 5545) feed of upcoming episodes.

use std::sync::Arc;

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Utc};

use crate::db::store::ShowEpisode;
use crate::db::{DbError, EpisodeQuery, EpisodeStore};
use crate::services::airtime::air_time_or;
use crate::services::timezones::{SharedTimezones, Zone};

const DEFAULT_RUNTIME_MINUTES: i64 = 30;
const MAX_LINE_OCTETS: usize = 75;
const DATE_TIME_UTC: &str = "%Y%m%dT%H%M%SZ";

pub struct CalendarFeed {
    store: Arc<dyn EpisodeStore>,
    timezones: SharedTimezones,
    display_zone: Zone,
}

impl CalendarFeed {
    pub fn new(store: Arc<dyn EpisodeStore>, timezones: SharedTimezones, display_zone: Zone) -> Self {
        Self {
            store,
            timezones,
            display_zone,
        }
    }

    /// Renders every episode of continuing, unpaused shows airing from
    /// `past_weeks` before `today` up to `future_weeks` after it.
    pub async fn render(
        &self,
        today: NaiveDate,
        past_weeks: u32,
        future_weeks: u32,
        generated_at: DateTime<Utc>,
    ) -> Result<String, DbError> {
        let from = today
            .checked_sub_days(Days::new(u64::from(past_weeks) * 7))
            .unwrap_or(NaiveDate::MIN);
        let until = today
            .checked_add_days(Days::new(u64::from(future_weeks) * 7))
            .unwrap_or(NaiveDate::MAX);

        let entries = self
            .store
            .query_episodes(&EpisodeQuery::ContinuingBetween { from, until })
            .await?;

        let timezones = self.timezones.read().await;
        let mut out = String::new();
        push_line(&mut out, "BEGIN:VCALENDAR");
        push_line(&mut out, "VERSION:2.0");
        push_line(&mut out, "PRODID:-//Airdate//Upcoming Episodes//EN");
        push_line(&mut out, "CALSCALE:GREGORIAN");

        for entry in &entries {
            let zone = timezones.timezone_for(entry.show.network.as_deref(), self.display_zone);
            render_event(&mut out, entry, zone, generated_at);
        }

        push_line(&mut out, "END:VCALENDAR");

        tracing::debug!(events = entries.len(), %from, %until, "Rendered calendar");
        Ok(out)
    }
}

fn render_event(out: &mut String, entry: &ShowEpisode, zone: Zone, generated_at: DateTime<Utc>) {
    let ShowEpisode { show, episode } = entry;
    let Some(air_date) = episode.air_date else {
        return;
    };

    let ten_pm = NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN);
    let time = air_time_or(show.airs.as_deref(), ten_pm);
    let start = zone.localize(air_date.and_time(time)).with_timezone(&Utc);
    let runtime = show
        .runtime
        .map(i64::from)
        .filter(|m| *m > 0)
        .unwrap_or(DEFAULT_RUNTIME_MINUTES);
    let end = start + Duration::minutes(runtime);

    let mut description = format!(
        "{} on {}",
        show.airs.as_deref().unwrap_or(""),
        show.network.as_deref().unwrap_or("")
    );
    if let Some(text) = episode.description.as_deref().filter(|d| !d.is_empty()) {
        description.push_str("\n\n");
        description.push_str(text);
    }

    push_line(out, "BEGIN:VEVENT");
    push_line(
        out,
        &format!(
            "UID:{}-{}-{}@airdate",
            show.id, episode.season, episode.episode
        ),
    );
    push_line(out, &format!("DTSTAMP:{}", generated_at.format(DATE_TIME_UTC)));
    push_line(out, &format!("DTSTART:{}", start.format(DATE_TIME_UTC)));
    push_line(out, &format!("DTEND:{}", end.format(DATE_TIME_UTC)));
    push_line(
        out,
        &format!(
            "SUMMARY:{}: {}",
            escape_text(&show.name),
            escape_text(episode.name.as_deref().unwrap_or("TBA"))
        ),
    );
    push_line(out, &format!("DESCRIPTION:{}", escape_text(&description)));
    push_line(
        out,
        &format!("LOCATION:Episode {} - Season {}", episode.episode, episode.season),
    );
    push_line(out, "END:VEVENT");
}

/// Escapes a TEXT value.
pub fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Appends a content line, folded at 75 octets, terminated by CRLF.
fn push_line(out: &mut String, line: &str) {
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out.push_str("\r\n");
}
