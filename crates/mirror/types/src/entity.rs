//! Mirrored tracker entities
//!
//! Stories own their tasks and notes. Entities are built from wire records
//! and patched in place by later records; an attribute missing from a record
//! never erases what the mirror already holds. A note or task list that is
//! present replaces the story's children wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::ids::{NoteId, ProjectId, StoryId, TaskId};
use crate::record::{Activity, NoteRecord, StoryRecord, TaskRecord};

/// One attribute overwritten by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: Option<String>,
    pub new: String,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.old {
            Some(old) => write!(f, "{} changed from {} to {}", self.field, old, self.new),
            None => write!(f, "{} set to {}", self.field, self.new),
        }
    }
}

/// Overwrite `current` when `incoming` is present and different.
fn patch<T>(
    field: &'static str,
    current: &mut Option<T>,
    incoming: Option<&T>,
    changes: &mut Vec<FieldChange>,
) where
    T: PartialEq + Clone + fmt::Debug,
{
    let Some(new) = incoming else {
        return;
    };
    if current.as_ref() == Some(new) {
        return;
    }
    changes.push(FieldChange {
        field,
        old: current.as_ref().map(|v| format!("{:?}", v)),
        new: format!("{:?}", new),
    });
    *current = Some(new.clone());
}

/// Split a comma-joined label field into label names.
pub fn split_labels(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

fn notes_from(records: &[NoteRecord]) -> HashMap<NoteId, Note> {
    records.iter().map(|n| (n.id, Note::from_record(n))).collect()
}

fn tasks_from(records: &[TaskRecord]) -> HashMap<TaskId, Task> {
    records.iter().map(|t| (t.id, Task::from_record(t))).collect()
}

/// Sorted, comma-joined ids of a child map.
fn id_list<K: Ord + fmt::Display, V>(children: &HashMap<K, V>) -> String {
    let mut ids: Vec<&K> = children.keys().collect();
    ids.sort();
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// A note attached to a story. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub text: Option<String>,
    pub author: Option<String>,
    pub noted_at: Option<DateTime<Utc>>,
}

impl Note {
    pub fn new(
        id: NoteId,
        text: Option<String>,
        author: Option<String>,
        noted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            text,
            author,
            noted_at,
        }
    }

    pub fn from_record(record: &NoteRecord) -> Self {
        Self::new(
            record.id,
            record.text.clone(),
            record.author.clone(),
            record.noted_at,
        )
    }
}

/// A task belonging to a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: Option<String>,
    /// Ordering within the story, [`Task::NO_POSITION`] when unset.
    pub position: i64,
    pub complete: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Task {
    pub const NO_POSITION: i64 = -1;

    /// Build a task, defaulting missing optional fields.
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            id: record.id,
            description: record.description.clone(),
            position: record.position.unwrap_or(Self::NO_POSITION),
            complete: record.complete.unwrap_or(false),
            created_at: record.created_at,
        }
    }

    pub fn has_position(&self) -> bool {
        self.position != Self::NO_POSITION
    }

    /// Patch the fields present in `record`, each independently.
    pub fn update(&mut self, record: &TaskRecord) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        patch(
            "description",
            &mut self.description,
            record.description.as_ref(),
            &mut changes,
        );

        if let Some(complete) = record.complete {
            if complete != self.complete {
                changes.push(FieldChange {
                    field: "complete",
                    old: Some(self.complete.to_string()),
                    new: complete.to_string(),
                });
                self.complete = complete;
            }
        }

        if let Some(position) = record.position {
            if position != self.position {
                changes.push(FieldChange {
                    field: "position",
                    old: self.has_position().then(|| self.position.to_string()),
                    new: position.to_string(),
                });
                self.position = position;
            }
        }

        changes
    }
}

/// A mirrored story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub project_id: ProjectId,
    pub story_type: Option<String>,
    pub url: Option<String>,
    pub estimate: Option<i64>,
    pub current_state: Option<String>,
    pub description: Option<String>,
    pub name: Option<String>,
    pub requested_by: Option<String>,
    pub owned_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    pub notes: HashMap<NoteId, Note>,
    pub tasks: HashMap<TaskId, Task>,
}

impl Story {
    /// Build a story owned by `project_id` from a raw record.
    pub fn create(project_id: ProjectId, record: &StoryRecord) -> Self {
        Self {
            id: record.id,
            project_id,
            story_type: record.story_type.clone(),
            url: record.url.clone(),
            estimate: record.estimate,
            current_state: record.current_state.clone(),
            description: record.description.clone(),
            name: record.name.clone(),
            requested_by: record.requested_by.clone(),
            owned_by: record.owned_by.clone(),
            created_at: record.created_at,
            accepted_at: record.accepted_at,
            labels: record
                .labels
                .as_deref()
                .map(split_labels)
                .unwrap_or_default(),
            notes: notes_from(record.notes()),
            tasks: tasks_from(record.tasks()),
        }
    }

    /// Apply the attributes present in `record` and migrate the story to the
    /// activity's project when it differs.
    ///
    /// Embedded notes and tasks, when present, replace the story's children.
    ///
    /// Returns the changes made, in attribute order.
    pub fn update(&mut self, activity: &Activity, record: &StoryRecord) -> Vec<FieldChange> {
        let mut changes = Vec::new();

        patch("story_type", &mut self.story_type, record.story_type.as_ref(), &mut changes);
        patch("url", &mut self.url, record.url.as_ref(), &mut changes);
        patch("estimate", &mut self.estimate, record.estimate.as_ref(), &mut changes);
        patch(
            "current_state",
            &mut self.current_state,
            record.current_state.as_ref(),
            &mut changes,
        );
        patch(
            "description",
            &mut self.description,
            record.description.as_ref(),
            &mut changes,
        );
        patch("name", &mut self.name, record.name.as_ref(), &mut changes);
        patch(
            "requested_by",
            &mut self.requested_by,
            record.requested_by.as_ref(),
            &mut changes,
        );
        patch("owned_by", &mut self.owned_by, record.owned_by.as_ref(), &mut changes);
        patch("created_at", &mut self.created_at, record.created_at.as_ref(), &mut changes);
        patch("accepted_at", &mut self.accepted_at, record.accepted_at.as_ref(), &mut changes);

        if let Some(raw) = record.labels.as_deref() {
            let labels = split_labels(raw);
            if labels != self.labels {
                changes.push(FieldChange {
                    field: "labels",
                    old: Some(self.labels.join(",")),
                    new: labels.join(","),
                });
                self.labels = labels;
            }
        }

        if let Some(records) = record.notes.as_deref() {
            let notes = notes_from(records);
            if notes != self.notes {
                changes.push(FieldChange {
                    field: "notes",
                    old: Some(id_list(&self.notes)),
                    new: id_list(&notes),
                });
                self.notes = notes;
            }
        }

        if let Some(records) = record.tasks.as_deref() {
            let tasks = tasks_from(records);
            if tasks != self.tasks {
                changes.push(FieldChange {
                    field: "tasks",
                    old: Some(id_list(&self.tasks)),
                    new: id_list(&tasks),
                });
                self.tasks = tasks;
            }
        }

        if self.project_id != activity.project_id {
            changes.push(FieldChange {
                field: "project_id",
                old: Some(self.project_id.to_string()),
                new: activity.project_id.to_string(),
            });
            self.project_id = activity.project_id;
        }

        changes
    }
}
