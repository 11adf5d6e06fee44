//! Observability: aggregate stats, accessibility announcements, event stream.
//!
//! Stats are recomputed from the registry after every mutation and published
//! on a `watch` channel; announcements are an append-only log; events are
//! broadcast for host UIs that prefer push over polling.

mod announce;
mod event;
mod stats;

pub use announce::{Announcement, AnnouncementLog};
pub use event::SchedulerEvent;
pub use stats::QueueStats;
