//! Story Mirror Types - entity model and wire records
//!
//! The mirror tracks the stories of one or more remote tracker projects.
//! Each story owns tasks and notes; changes arrive as activities read from
//! two generations of the remote activity feed.
//!
//! ## Key Concepts
//!
//! - **Story / Task / Note**: mirrored entities with create and patch semantics
//! - **Records**: typed wire payloads, every attribute optional
//! - **Activity**: one remote event touching one or more stories
//! - **Block**: workflow partition used when bulk-loading a project
//! - **FeedGeneration**: which activity feed an event was read from

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod block;
pub mod entity;
pub mod event;
pub mod ids;
pub mod record;

pub use block::{Block, UnknownBlock};
pub use entity::{split_labels, FieldChange, Note, Story, Task};
pub use event::{EventKind, FeedGeneration};
pub use ids::{ActivityId, NoteId, ProjectId, StoryId, TaskId};
pub use record::{
    Activity, CommentRef, FeedActivity, IterationRecord, NoteRecord, StoryNode, StoryRecord,
    TaskRecord,
};
