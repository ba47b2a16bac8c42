//! Story Mirror Daemon
//!
//! Wires the mirror engine to the remote tracker: configuration, the HTTP
//! adapter and logging setup. The `mirrord` binary loads the mirror and then
//! reconciles it forever.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;

pub use client::{HttpTrackerApi, StorySearch};
pub use config::MirrorConfig;
pub use error::{DaemonError, DaemonResult};
