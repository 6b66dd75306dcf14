//! Separation and mashup job tracking
//!
//! `poller` drives a job to a terminal state; `materialize` turns the stems
//! of a finished job into editor tracks and `category` groups them.

pub mod category;
pub mod materialize;
pub mod poller;

pub use category::{auto_mashup_selection, group_by_category, stem_category, StemCategory};
pub use materialize::{materialize_tracks, track_color, TRACK_COLORS};
pub use poller::{JobPoller, PollGuard, PollHandle, PollOutcome, StatusSource};
