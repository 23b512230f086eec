use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// Base episode status, the low two digits of a stored status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Unknown,
    Unaired,
    Snatched,
    Wanted,
    Downloaded,
    Skipped,
    Archived,
    Ignored,
    SnatchedProper,
    Subtitled,
    SnatchedFrench,
}

impl StatusKind {
    pub const ALL: [StatusKind; 11] = [
        StatusKind::Unknown,
        StatusKind::Unaired,
        StatusKind::Snatched,
        StatusKind::Wanted,
        StatusKind::Downloaded,
        StatusKind::Skipped,
        StatusKind::Archived,
        StatusKind::Ignored,
        StatusKind::SnatchedProper,
        StatusKind::Subtitled,
        StatusKind::SnatchedFrench,
    ];

    pub fn code(self) -> i64 {
        match self {
            StatusKind::Unknown => -1,
            StatusKind::Unaired => 1,
            StatusKind::Snatched => 2,
            StatusKind::Wanted => 3,
            StatusKind::Downloaded => 4,
            StatusKind::Skipped => 5,
            StatusKind::Archived => 6,
            StatusKind::Ignored => 7,
            StatusKind::SnatchedProper => 9,
            StatusKind::Subtitled => 10,
            StatusKind::SnatchedFrench => 11,
        }
    }

    pub fn from_code(code: i64) -> Option<StatusKind> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    pub fn is_downloaded(self) -> bool {
        matches!(self, StatusKind::Downloaded)
    }

    pub fn is_snatched(self) -> bool {
        matches!(
            self,
            StatusKind::Snatched | StatusKind::SnatchedProper | StatusKind::SnatchedFrench
        )
    }

    /// Statuses that prove a file was fetched or the user opted out, so a
    /// jump to downloaded needs no file on disk.
    pub fn has_download_evidence(self) -> bool {
        self.is_snatched() || self.is_downloaded() || matches!(self, StatusKind::Ignored)
    }

    /// Statuses that no longer need attention in the coming-episodes feed.
    pub fn is_resolved(self) -> bool {
        self.is_snatched()
            || self.is_downloaded()
            || matches!(self, StatusKind::Archived | StatusKind::Ignored)
    }

    /// Kinds whose codes make up the given family, for SQL `IN` lists.
    pub fn family(pred: fn(StatusKind) -> bool) -> Vec<StatusKind> {
        Self::ALL.into_iter().filter(|k| pred(*k)).collect()
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusKind::Unknown => write!(f, "Unknown"),
            StatusKind::Unaired => write!(f, "Unaired"),
            StatusKind::Snatched => write!(f, "Snatched"),
            StatusKind::Wanted => write!(f, "Wanted"),
            StatusKind::Downloaded => write!(f, "Downloaded"),
            StatusKind::Skipped => write!(f, "Skipped"),
            StatusKind::Archived => write!(f, "Archived"),
            StatusKind::Ignored => write!(f, "Ignored"),
            StatusKind::SnatchedProper => write!(f, "Snatched (Proper)"),
            StatusKind::Subtitled => write!(f, "Subtitled"),
            StatusKind::SnatchedFrench => write!(f, "Snatched (French)"),
        }
    }
}

/// Quality flag folded into a composite status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    None,
    Sdtv,
    Sddvd,
    Hdtv,
    RawHdtv,
    FullHdtv,
    HdWebDl,
    FullHdWebDl,
    HdBluray,
    FullHdBluray,
    Unknown,
}

impl Quality {
    /// Highest flag first, the order used to split composite codes.
    const DESCENDING: [Quality; 11] = [
        Quality::Unknown,
        Quality::FullHdBluray,
        Quality::HdBluray,
        Quality::FullHdWebDl,
        Quality::HdWebDl,
        Quality::FullHdtv,
        Quality::RawHdtv,
        Quality::Hdtv,
        Quality::Sddvd,
        Quality::Sdtv,
        Quality::None,
    ];

    pub fn flag(self) -> i64 {
        match self {
            Quality::None => 0,
            Quality::Sdtv => 1,
            Quality::Sddvd => 1 << 1,
            Quality::Hdtv => 1 << 2,
            Quality::RawHdtv => 1 << 3,
            Quality::FullHdtv => 1 << 4,
            Quality::HdWebDl => 1 << 5,
            Quality::FullHdWebDl => 1 << 6,
            Quality::HdBluray => 1 << 7,
            Quality::FullHdBluray => 1 << 8,
            Quality::Unknown => 1 << 15,
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::None => write!(f, "N/A"),
            Quality::Sdtv => write!(f, "SD TV"),
            Quality::Sddvd => write!(f, "SD DVD"),
            Quality::Hdtv => write!(f, "HD TV"),
            Quality::RawHdtv => write!(f, "RawHD TV"),
            Quality::FullHdtv => write!(f, "1080p HD TV"),
            Quality::HdWebDl => write!(f, "720p WEB-DL"),
            Quality::FullHdWebDl => write!(f, "1080p WEB-DL"),
            Quality::HdBluray => write!(f, "720p BluRay"),
            Quality::FullHdBluray => write!(f, "1080p BluRay"),
            Quality::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A stored episode status: `kind + 100 * quality`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub i64);

impl StatusCode {
    pub fn new(kind: StatusKind, quality: Quality) -> Self {
        StatusCode(kind.code() + 100 * quality.flag())
    }

    pub fn of(kind: StatusKind) -> Self {
        Self::new(kind, Quality::None)
    }

    /// Splits the code into its kind and quality, `None` if the code is not
    /// part of the vocabulary. Only downloaded and snatched kinds carry a
    /// quality; every other kind is valid only as its bare code.
    pub fn split(self) -> Option<(StatusKind, Quality)> {
        let (base, quality) = Quality::DESCENDING
            .into_iter()
            .find(|q| self.0 > q.flag() * 100)
            .map(|q| (self.0 - q.flag() * 100, q))
            .unwrap_or((self.0, Quality::None));
        let kind = StatusKind::from_code(base)?;

        if quality != Quality::None && !(kind.is_downloaded() || kind.is_snatched()) {
            return None;
        }
        Some((kind, quality))
    }

    pub fn is_valid(self) -> bool {
        self.split().is_some()
    }

    /// Kind of the code; codes outside the vocabulary read as `Unknown`.
    pub fn kind(self) -> StatusKind {
        self.split().map(|(k, _)| k).unwrap_or(StatusKind::Unknown)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.split() {
            Some((kind, Quality::None)) => write!(f, "{}", kind),
            Some((kind, quality)) => write!(f, "{} ({})", kind, quality),
            None => write!(f, "status {}", self.0),
        }
    }
}

/// Season and episode number within a show, written `SxE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpisodeNumber {
    pub season: i32,
    pub episode: i32,
}

impl EpisodeNumber {
    pub fn new(season: i32, episode: i32) -> Self {
        Self { season, episode }
    }
}

impl std::fmt::Display for EpisodeNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.season, self.episode)
    }
}

impl std::str::FromStr for EpisodeNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (season, episode) = s
            .trim()
            .split_once(|c| c == 'x' || c == 'X')
            .ok_or_else(|| format!("expected SxE, got '{}'", s))?;
        let season = season
            .parse()
            .map_err(|_| format!("invalid season in '{}'", s))?;
        let episode = episode
            .parse()
            .map_err(|_| format!("invalid episode in '{}'", s))?;
        Ok(Self { season, episode })
    }
}

/// Unit of a backlog search: a season, or a calendar month for
/// air-by-date shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BacklogSegment {
    Season(i32),
    Month(String),
}

impl BacklogSegment {
    pub fn month_of(date: NaiveDate) -> Self {
        BacklogSegment::Month(date.format("%Y-%m").to_string())
    }
}

impl std::fmt::Display for BacklogSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BacklogSegment::Season(season) => write!(f, "Season {}", season),
            BacklogSegment::Month(month) => write!(f, "{}", month),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Show {
    pub id: i64,
    pub name: String,
    pub network: Option<String>,
    pub airs: Option<String>,
    pub status: String,
    pub air_by_date: bool,
    pub paused: bool,
    pub runtime: Option<i32>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub show_id: i64,
    pub season: i32,
    pub episode: i32,
    pub name: Option<String>,
    pub description: Option<String>,
    pub air_date: Option<NaiveDate>,
    pub status: StatusCode,
    pub location: Option<String>,
}

impl Episode {
    pub fn number(&self) -> EpisodeNumber {
        EpisodeNumber::new(self.season, self.episode)
    }
}

/// Serializes any `Display` value as a string.
pub fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: std::fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}
