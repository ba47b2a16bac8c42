//! Workflow blocks of a tracker project
//!
//! A project's stories are partitioned into workflow stages:
//! - Current: the iteration in progress
//! - Backlog: scheduled future iterations
//! - Icebox: unscheduled stories
//! - Done: completed iterations

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Workflow partition of a project's stories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    /// The current iteration
    Current,

    /// Upcoming iterations
    Backlog,

    /// Unscheduled stories
    ///
    /// The remote API has no iteration listing for the icebox, so it is
    /// fetched through a state-filtered search and arrives as a flat list.
    Icebox,

    /// Completed iterations
    Done,
}

impl Block {
    /// Every block, in load order.
    pub const ALL: [Block; 4] = [Block::Current, Block::Backlog, Block::Icebox, Block::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Block::Current => "current",
            Block::Backlog => "backlog",
            Block::Icebox => "icebox",
            Block::Done => "done",
        }
    }

    /// Does the remote API serve this block as iterations grouping stories?
    pub fn is_iteration_listing(&self) -> bool {
        !matches!(self, Block::Icebox)
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a block name is not one of the supported partitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported block '{0}', expected one of current, backlog, icebox, done")]
pub struct UnknownBlock(pub String);

impl FromStr for Block {
    type Err = UnknownBlock;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(Block::Current),
            "backlog" => Ok(Block::Backlog),
            "icebox" => Ok(Block::Icebox),
            "done" => Ok(Block::Done),
            _ => Err(UnknownBlock(s.to_string())),
        }
    }
}
