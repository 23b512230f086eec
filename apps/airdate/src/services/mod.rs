//! Application services for Airdate.

pub mod activity;
pub mod airtime;
pub mod backlog;
pub mod calendar;
pub mod coming;
pub mod locks;
pub mod scheduler;
pub mod status;
pub mod timezones;

pub use backlog::{ActivitySegmentSearch, BacklogQueue, SegmentSearch};
pub use calendar::CalendarFeed;
pub use coming::{ComingEpisodesAggregator, ComingEpisodesSettings, ComingSort, ComingWindow};
pub use locks::EpisodeLocks;
pub use scheduler::Scheduler;
pub use status::{StatusChangeReport, StatusTransitionEngine};
pub use timezones::{NetworkTimezones, SharedTimezones, Zone};
