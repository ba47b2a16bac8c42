//! Activity reconciliation.
//!
//! [`MirrorState::process_activity`] applies one feed activity to the mirror.
//! It runs under the mirror lock, so an activity is either fully applied or
//! not observed at all. References to entities the mirror has never seen are
//! reported and skipped; nothing here fails.

use std::fmt;

use mirror_types::{
    Activity, EventKind, FeedActivity, Note, NoteId, Story, StoryId, Task, TaskId, TaskRecord,
};
use tracing::{debug, warn};

use crate::store::MirrorState;

/// A reference to an entity absent from the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnknownReference {
    Story(StoryId),
    Task { story: StoryId, task: TaskId },
    Comment { story: StoryId, note: NoteId },
}

impl fmt::Display for UnknownReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReference::Story(story) => write!(f, "unknown {}", story),
            UnknownReference::Task { story, task } => write!(f, "unknown {} in {}", task, story),
            UnknownReference::Comment { story, note } => {
                write!(f, "unknown comment {} in {}", note, story)
            }
        }
    }
}

/// Outcome of applying one activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// The activity had already been applied; nothing changed.
    pub duplicate: bool,
    /// References that resolved and were applied.
    pub applied: usize,
    /// References that did not resolve.
    pub unknown: Vec<UnknownReference>,
    /// The event kind has no handler.
    pub ignored: bool,
}

impl ApplyReport {
    fn duplicate() -> Self {
        Self {
            duplicate: true,
            ..Self::default()
        }
    }

    fn record_unknown(&mut self, reference: UnknownReference, activity: &Activity) {
        warn!(
            activity_id = %activity.id,
            event_type = %activity.event_type,
            reference = %reference,
            "Activity references an entity not in the mirror"
        );
        self.unknown.push(reference);
    }
}

impl MirrorState {
    /// Apply `entry` unless it was already processed.
    pub fn process_activity(&mut self, entry: &FeedActivity) -> ApplyReport {
        let activity = &entry.activity;

        if !self.processed.record(entry.feed, &activity.id, activity.occurred_at) {
            debug!(
                activity_id = %activity.id,
                feed = ?entry.feed,
                "Skipping already processed activity"
            );
            return ApplyReport::duplicate();
        }

        debug!(
            activity_id = %activity.id,
            event_type = %activity.event_type,
            project_id = %activity.project_id,
            stories = activity.stories.len(),
            "Processing activity"
        );

        let mut report = ApplyReport::default();
        match &activity.event_type {
            EventKind::StoryUpdate | EventKind::MoveIntoProject => {
                self.update_stories(activity, &mut report)
            }
            EventKind::StoryCreate => self.create_stories(activity, &mut report),
            EventKind::StoryDelete | EventKind::MultiStoryDelete => {
                self.delete_stories(activity, &mut report)
            }
            EventKind::NoteCreate => self.create_notes(activity, &mut report),
            EventKind::TaskCreate => self.create_tasks(activity, &mut report),
            EventKind::TaskEdit => self.edit_tasks(activity, &mut report),
            EventKind::TaskDelete => self.delete_tasks(activity, &mut report),
            EventKind::CommentDelete => self.delete_comments(activity, &mut report),
            EventKind::MoveFromProject => {
                // The paired move_into_project re-homes the story.
                debug!(activity_id = %activity.id, "Ignoring move_from_project");
            }
            EventKind::Other(kind) => {
                warn!(
                    activity_id = %activity.id,
                    event_type = %kind,
                    "Unhandled activity type"
                );
                report.ignored = true;
            }
        }
        report
    }

    fn update_stories(&mut self, activity: &Activity, report: &mut ApplyReport) {
        for raw in &activity.stories {
            match self.get_story(raw.id) {
                Ok(story) => {
                    for change in story.update(activity, raw) {
                        debug!(story_id = %raw.id, "{}", change);
                    }
                    report.applied += 1;
                }
                Err(unknown) => report.record_unknown(unknown, activity),
            }
        }
    }

    fn create_stories(&mut self, activity: &Activity, report: &mut ApplyReport) {
        for raw in &activity.stories {
            let story = Story::create(activity.project_id, raw);
            if self.stories.insert(raw.id, story).is_some() {
                debug!(story_id = %raw.id, "Replaced existing story on create");
            }
            report.applied += 1;
        }
    }

    fn delete_stories(&mut self, activity: &Activity, report: &mut ApplyReport) {
        for raw in &activity.stories {
            match self.stories.remove(&raw.id) {
                Some(_) => report.applied += 1,
                None => report.record_unknown(UnknownReference::Story(raw.id), activity),
            }
        }
    }

    fn create_notes(&mut self, activity: &Activity, report: &mut ApplyReport) {
        for raw in &activity.stories {
            let story = match self.get_story(raw.id) {
                Ok(story) => story,
                Err(unknown) => {
                    report.record_unknown(unknown, activity);
                    continue;
                }
            };
            for note in raw.notes() {
                story.notes.insert(
                    note.id,
                    Note::new(
                        note.id,
                        note.text.clone(),
                        activity.author.clone(),
                        Some(activity.occurred_at),
                    ),
                );
                report.applied += 1;
            }
        }
    }

    fn create_tasks(&mut self, activity: &Activity, report: &mut ApplyReport) {
        self.for_each_task(activity, report, |story, record, report| {
            story.tasks.insert(record.id, Task::from_record(record));
            report.applied += 1;
        });
    }

    fn edit_tasks(&mut self, activity: &Activity, report: &mut ApplyReport) {
        self.for_each_task(activity, report, |story, record, report| {
            let story_id = story.id;
            match MirrorState::get_task(story, record.id) {
                Ok(task) => {
                    for change in task.update(record) {
                        debug!(story_id = %story_id, task_id = %record.id, "{}", change);
                    }
                    report.applied += 1;
                }
                Err(unknown) => report.record_unknown(unknown, activity),
            }
        });
    }

    fn delete_tasks(&mut self, activity: &Activity, report: &mut ApplyReport) {
        self.for_each_task(activity, report, |story, record, report| {
            match story.tasks.remove(&record.id) {
                Some(_) => report.applied += 1,
                None => report.record_unknown(
                    UnknownReference::Task {
                        story: story.id,
                        task: record.id,
                    },
                    activity,
                ),
            }
        });
    }

    fn delete_comments(&mut self, activity: &Activity, report: &mut ApplyReport) {
        for raw in &activity.stories {
            let story = match self.get_story(raw.id) {
                Ok(story) => story,
                Err(unknown) => {
                    report.record_unknown(unknown, activity);
                    continue;
                }
            };
            for comment in raw.comments() {
                match story.notes.remove(&comment.id) {
                    Some(_) => report.applied += 1,
                    None => report.record_unknown(
                        UnknownReference::Comment {
                            story: raw.id,
                            note: comment.id,
                        },
                        activity,
                    ),
                }
            }
        }
    }

    /// Visit every task payload of every known story in `activity`.
    fn for_each_task<F>(&mut self, activity: &Activity, report: &mut ApplyReport, mut visit: F)
    where
        F: FnMut(&mut Story, &TaskRecord, &mut ApplyReport),
    {
        for raw in &activity.stories {
            match self.get_story(raw.id) {
                Ok(story) => {
                    for task in raw.tasks() {
                        visit(story, task, report);
                    }
                }
                Err(unknown) => report.record_unknown(unknown, activity),
            }
        }
    }
}
