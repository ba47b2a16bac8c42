//! Wire records consumed from the remote tracker API
//!
//! Every attribute except identity is optional on the wire. Records are
//! decoded once at the collaborator boundary; the entity model only ever
//! sees these typed structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{EventKind, FeedGeneration};
use crate::ids::{ActivityId, NoteId, ProjectId, StoryId, TaskId};

/// A story as it appears in listings and activity payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub id: StoryId,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub story_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub estimate: Option<i64>,
    #[serde(default)]
    pub current_state: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub owned_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    /// Comma-joined label names.
    #[serde(default)]
    pub labels: Option<String>,
    #[serde(default)]
    pub notes: Option<Vec<NoteRecord>>,
    #[serde(default)]
    pub tasks: Option<Vec<TaskRecord>>,
    /// Comment references carried by `comment_delete` activities.
    #[serde(default)]
    pub comments: Option<Vec<CommentRef>>,
}

impl StoryRecord {
    /// A record carrying only the story id.
    pub fn new(id: StoryId) -> Self {
        Self {
            id,
            project_id: None,
            story_type: None,
            url: None,
            estimate: None,
            current_state: None,
            description: None,
            name: None,
            requested_by: None,
            owned_by: None,
            created_at: None,
            accepted_at: None,
            labels: None,
            notes: None,
            tasks: None,
            comments: None,
        }
    }

    pub fn notes(&self) -> &[NoteRecord] {
        self.notes.as_deref().unwrap_or_default()
    }

    pub fn tasks(&self) -> &[TaskRecord] {
        self.tasks.as_deref().unwrap_or_default()
    }

    pub fn comments(&self) -> &[CommentRef] {
        self.comments.as_deref().unwrap_or_default()
    }
}

/// A task payload nested in a story record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub complete: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            description: None,
            position: None,
            complete: None,
            created_at: None,
        }
    }
}

/// A note payload nested in a story record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: NoteId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub noted_at: Option<DateTime<Utc>>,
}

/// Reference to a note being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRef {
    pub id: NoteId,
}

/// One remote event describing a change to one or more stories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub event_type: EventKind,
    pub occurred_at: DateTime<Utc>,
    pub project_id: ProjectId,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub stories: Vec<StoryRecord>,
}

/// An activity tagged with the feed generation it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedActivity {
    pub feed: FeedGeneration,
    pub activity: Activity,
}

impl FeedActivity {
    pub fn new(feed: FeedGeneration, activity: Activity) -> Self {
        Self { feed, activity }
    }
}

/// An iteration grouping stories in an iteration listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub number: Option<u64>,
    pub stories: Vec<StoryNode>,
}

/// A node of an irregularly nested story listing.
///
/// Iteration listings group stories per iteration while searches return a
/// flat list; both decode into this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoryNode {
    Iteration(IterationRecord),
    Story(StoryRecord),
    List(Vec<StoryNode>),
}
