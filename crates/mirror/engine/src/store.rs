//! Mirror store.
//!
//! The mirror is an owned map of stories guarded by one mutex. Bulk loading
//! and every activity application run under that lock; readers receive
//! owned copies, never references into the guarded state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mirror_types::{FeedActivity, ProjectId, Story, StoryId, StoryRecord, Task, TaskId};
use tokio::sync::{Mutex, MutexGuard};

use crate::dedup::{DedupConfig, ProcessedActivities};
use crate::reconciler::{ApplyReport, UnknownReference};

/// State guarded by the mirror lock.
#[derive(Debug)]
pub struct MirrorState {
    pub(crate) stories: HashMap<StoryId, Story>,
    pub(crate) processed: ProcessedActivities,
}

impl MirrorState {
    pub fn new(dedup: DedupConfig) -> Self {
        Self {
            stories: HashMap::new(),
            processed: ProcessedActivities::new(dedup),
        }
    }

    pub fn stories(&self) -> &HashMap<StoryId, Story> {
        &self.stories
    }

    pub fn processed(&self) -> &ProcessedActivities {
        &self.processed
    }

    pub fn len(&self) -> usize {
        self.stories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    /// Forget processed ids that occurred a retention margin before
    /// `horizon`.
    pub fn expire_processed(&mut self, horizon: DateTime<Utc>) -> usize {
        self.processed.expire(horizon)
    }

    /// Resolve a story reference.
    pub fn get_story(&mut self, id: StoryId) -> Result<&mut Story, UnknownReference> {
        self.stories
            .get_mut(&id)
            .ok_or(UnknownReference::Story(id))
    }

    /// Resolve a task reference within a story.
    pub fn get_task(story: &mut Story, id: TaskId) -> Result<&mut Task, UnknownReference> {
        let story_id = story.id;
        story.tasks.get_mut(&id).ok_or(UnknownReference::Task {
            story: story_id,
            task: id,
        })
    }

    /// Index loaded records by story id, replacing earlier copies.
    ///
    /// Returns the number of stories merged.
    pub fn merge(&mut self, project_id: ProjectId, records: &[StoryRecord]) -> usize {
        for record in records {
            self.stories
                .insert(record.id, Story::create(project_id, record));
        }
        records.len()
    }
}

/// The authoritative mirror of remote stories.
#[derive(Debug)]
pub struct MirrorStore {
    state: Mutex<MirrorState>,
}

impl Default for MirrorStore {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl MirrorStore {
    pub fn new(dedup: DedupConfig) -> Self {
        Self {
            state: Mutex::new(MirrorState::new(dedup)),
        }
    }

    /// Apply one activity under the mirror lock.
    pub async fn apply(&self, activity: &FeedActivity) -> ApplyReport {
        self.state.lock().await.process_activity(activity)
    }

    /// Forget processed ids no feed polled from `horizon` onwards can
    /// deliver again.
    pub async fn expire_processed(&self, horizon: DateTime<Utc>) -> usize {
        self.state.lock().await.expire_processed(horizon)
    }

    /// Copy of one story.
    pub async fn story(&self, id: StoryId) -> Option<Story> {
        self.state.lock().await.stories.get(&id).cloned()
    }

    /// Copy of the whole mirror.
    pub async fn snapshot(&self) -> HashMap<StoryId, Story> {
        self.state.lock().await.stories.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    /// Exclusive access for bulk loading.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, MirrorState> {
        self.state.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_types::TaskRecord;

    fn record(id: u64, name: &str) -> StoryRecord {
        StoryRecord {
            name: Some(name.to_string()),
            ..StoryRecord::new(StoryId::new(id))
        }
    }

    #[tokio::test]
    async fn test_merge_and_read_copies() {
        let store = MirrorStore::default();
        {
            let mut state = store.lock().await;
            let merged = state.merge(ProjectId::new(1), &[record(1, "a"), record(2, "b")]);
            assert_eq!(merged, 2);
        }

        assert_eq!(store.len().await, 2);
        let mut copy = store.story(StoryId::new(1)).await.unwrap();
        copy.name = Some("changed".into());
        assert_eq!(
            store.story(StoryId::new(1)).await.unwrap().name.as_deref(),
            Some("a")
        );
    }

    #[tokio::test]
    async fn test_merge_replaces_existing() {
        let store = MirrorStore::default();
        let mut state = store.lock().await;
        state.merge(ProjectId::new(1), &[record(1, "a")]);
        state.merge(ProjectId::new(2), &[record(1, "b")]);

        let story = &state.stories()[&StoryId::new(1)];
        assert_eq!(story.name.as_deref(), Some("b"));
        assert_eq!(story.project_id, ProjectId::new(2));
    }

    #[test]
    fn test_unknown_references() {
        let mut state = MirrorState::new(DedupConfig::default());
        assert_eq!(
            state.get_story(StoryId::new(9)).unwrap_err(),
            UnknownReference::Story(StoryId::new(9))
        );

        state.merge(
            ProjectId::new(1),
            &[StoryRecord {
                tasks: Some(vec![TaskRecord::new(TaskId::new(1))]),
                ..StoryRecord::new(StoryId::new(9))
            }],
        );
        let story = state.get_story(StoryId::new(9)).unwrap();
        assert!(MirrorState::get_task(story, TaskId::new(1)).is_ok());
        assert_eq!(
            MirrorState::get_task(story, TaskId::new(2)).unwrap_err(),
            UnknownReference::Task {
                story: StoryId::new(9),
                task: TaskId::new(2)
            }
        );
    }
}
