//! Story Mirror Engine - bulk loading, feed polling and activity reconciliation
//!
//! The engine keeps an in-memory mirror of remote tracker stories consistent
//! with the remote system:
//!
//! 1. [`BulkLoader`] fetches every block of every project into the
//!    [`MirrorStore`].
//! 2. [`Poller`] reads both activity feed generations from per-feed
//!    checkpoints with an overlapping window.
//! 3. [`MirrorState::process_activity`] applies each activity once,
//!    skipping duplicates and references to entities the mirror lacks.
//!
//! [`CycleDriver`] runs steps 2 and 3 on a fixed interval.

#![deny(unsafe_code)]

pub mod api;
pub mod checkpoint;
pub mod dedup;
pub mod driver;
pub mod error;
pub mod loader;
pub mod poller;
pub mod reconciler;
pub mod store;

pub use api::{fetch_feed, flatten_stories, MockTrackerApi, TrackerApi};
pub use checkpoint::Checkpoints;
pub use dedup::{DedupConfig, ProcessedActivities};
pub use driver::{CycleDriver, CycleReport};
pub use error::{ApiError, ApiResult, MirrorError, Result};
pub use loader::{BulkLoader, LoadSummary, LoaderConfig};
pub use poller::{FeedBatch, FeedOutcome, PollConfig, Poller};
pub use reconciler::{ApplyReport, UnknownReference};
pub use store::{MirrorState, MirrorStore};
