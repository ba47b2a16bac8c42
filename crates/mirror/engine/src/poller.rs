//! Activity feed poller.
//!
//! Each poll reads both feed generations of every tracked project from its
//! checkpoint. Windows overlap on purpose so late-indexed events are not
//! missed; the reconciler discards the resulting duplicates.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mirror_types::{FeedActivity, FeedGeneration, ProjectId};
use tracing::{debug, error, warn};

use crate::api::{fetch_feed, TrackerApi};
use crate::checkpoint::Checkpoints;

/// Poll window configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// How far each window reaches back before the previous poll.
    pub overlap: Duration,

    /// Whether the legacy feed is polled at all.
    pub legacy_feed: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            overlap: Duration::from_secs(60),
            legacy_feed: true,
        }
    }
}

/// How a feed fetch went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Fetched,
    /// The payload could not be parsed; treated as empty.
    Malformed,
    /// The fetch failed; the checkpoint was kept.
    Failed,
}

/// The activities read from one feed of one project.
#[derive(Debug, Clone)]
pub struct FeedBatch {
    pub project_id: ProjectId,
    pub feed: FeedGeneration,
    /// Admitted activities, ascending by occurrence time.
    pub activities: Vec<FeedActivity>,
    pub outcome: FeedOutcome,
}

fn polled_feeds(legacy_feed: bool) -> &'static [FeedGeneration] {
    if legacy_feed {
        &FeedGeneration::ALL
    } else {
        &[FeedGeneration::Current]
    }
}

/// Polls the activity feeds of a fixed set of projects.
pub struct Poller {
    api: Arc<dyn TrackerApi>,
    projects: Vec<ProjectId>,
    config: PollConfig,
    checkpoints: Checkpoints,
}

impl Poller {
    /// Create a poller whose first windows start at `start - overlap`.
    ///
    /// Construct this before bulk loading so activity during the load is
    /// picked up by the first poll.
    pub fn new(
        api: Arc<dyn TrackerApi>,
        projects: Vec<ProjectId>,
        config: PollConfig,
        start: DateTime<Utc>,
    ) -> Self {
        let checkpoints = Checkpoints::new(
            &projects,
            polled_feeds(config.legacy_feed),
            start,
            config.overlap,
        );
        Self {
            api,
            projects,
            config,
            checkpoints,
        }
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    pub fn projects(&self) -> &[ProjectId] {
        &self.projects
    }

    /// Fetch every feed of every project once.
    pub async fn poll(&mut self, now: DateTime<Utc>) -> Vec<FeedBatch> {
        let next = self.checkpoints.next(now);
        let mut batches = Vec::new();

        for project_id in self.projects.clone() {
            for &feed in polled_feeds(self.config.legacy_feed) {
                batches.push(self.poll_feed(project_id, feed, next).await);
            }
        }

        batches
    }

    async fn poll_feed(
        &mut self,
        project_id: ProjectId,
        feed: FeedGeneration,
        next: DateTime<Utc>,
    ) -> FeedBatch {
        let since = self.checkpoints.since(project_id, feed).unwrap_or(next);

        let (activities, outcome) =
            match fetch_feed(self.api.as_ref(), feed, project_id, since).await {
                Ok(Some(activities)) => (activities, FeedOutcome::Fetched),
                Ok(None) => {
                    warn!(
                        project_id = %project_id,
                        feed = %feed,
                        "Malformed activity feed payload, treating as empty"
                    );
                    (Vec::new(), FeedOutcome::Malformed)
                }
                Err(e) => {
                    error!(
                        project_id = %project_id,
                        feed = %feed,
                        since = %since,
                        error = %e,
                        "Activity feed fetch failed, retrying window next cycle"
                    );
                    return FeedBatch {
                        project_id,
                        feed,
                        activities: Vec::new(),
                        outcome: FeedOutcome::Failed,
                    };
                }
            };

        self.checkpoints.advance(project_id, feed, next);

        let fetched = activities.len();
        let mut activities: Vec<FeedActivity> = activities
            .into_iter()
            .filter(|activity| feed.admits(&activity.event_type))
            .map(|activity| FeedActivity::new(feed, activity))
            .collect();
        activities.sort_by_key(|entry| entry.activity.occurred_at);

        debug!(
            project_id = %project_id,
            feed = %feed,
            since = %since,
            fetched,
            admitted = activities.len(),
            "Polled activity feed"
        );

        FeedBatch {
            project_id,
            feed,
            activities,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockTrackerApi;
    use crate::error::ApiError;
    use chrono::TimeZone;
    use mirror_types::{Activity, ActivityId, EventKind};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn activity(id: &str, kind: EventKind, secs: i64) -> Activity {
        Activity {
            id: ActivityId::new(id),
            event_type: kind,
            occurred_at: at(secs),
            project_id: ProjectId::new(1),
            author: None,
            stories: vec![],
        }
    }

    fn poller(api: Arc<MockTrackerApi>, config: PollConfig) -> Poller {
        Poller::new(api, vec![ProjectId::new(1)], config, at(0))
    }

    fn ids(batch: &FeedBatch) -> Vec<&str> {
        batch
            .activities
            .iter()
            .map(|entry| entry.activity.id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_batches_are_sorted_by_occurrence() {
        let api = Arc::new(MockTrackerApi::new());
        api.push_feed(
            ProjectId::new(1),
            FeedGeneration::Current,
            Ok(Some(vec![
                activity("late", EventKind::StoryUpdate, 30),
                activity("early", EventKind::StoryUpdate, 10),
                activity("tie", EventKind::StoryUpdate, 30),
            ])),
        );
        let mut poller = poller(api, PollConfig::default());

        let batches = poller.poll(at(60)).await;
        assert_eq!(batches.len(), 2);
        assert_eq!(ids(&batches[0]), vec!["early", "late", "tie"]);
    }

    #[tokio::test]
    async fn test_legacy_feed_is_filtered() {
        let api = Arc::new(MockTrackerApi::new());
        api.push_feed(
            ProjectId::new(1),
            FeedGeneration::Legacy,
            Ok(Some(vec![
                activity("s", EventKind::StoryUpdate, 1),
                activity("t", EventKind::TaskEdit, 2),
                activity("c", EventKind::CommentDelete, 3),
            ])),
        );
        let mut poller = poller(api, PollConfig::default());

        let batches = poller.poll(at(60)).await;
        let legacy = &batches[1];
        assert_eq!(legacy.feed, FeedGeneration::Legacy);
        assert_eq!(ids(legacy), vec!["t", "c"]);
        assert!(legacy
            .activities
            .iter()
            .all(|entry| entry.feed == FeedGeneration::Legacy));
    }

    #[tokio::test]
    async fn test_checkpoints_advance_with_overlap() {
        let api = Arc::new(MockTrackerApi::new());
        let mut poller = poller(
            api.clone(),
            PollConfig {
                overlap: Duration::from_secs(5),
                legacy_feed: false,
            },
        );

        poller.poll(at(100)).await;
        poller.poll(at(200)).await;

        let calls = api.feed_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].2, at(-5));
        assert_eq!(calls[1].2, at(95));
    }

    #[tokio::test]
    async fn test_failed_feed_keeps_checkpoint() {
        let api = Arc::new(MockTrackerApi::new());
        api.push_feed(
            ProjectId::new(1),
            FeedGeneration::Current,
            Err(ApiError::Transport("connection reset".into())),
        );
        api.push_feed(ProjectId::new(1), FeedGeneration::Legacy, Ok(None));
        let mut poller = poller(api.clone(), PollConfig::default());

        let batches = poller.poll(at(100)).await;
        assert_eq!(batches[0].outcome, FeedOutcome::Failed);
        assert_eq!(batches[1].outcome, FeedOutcome::Malformed);

        let checkpoints = poller.checkpoints();
        assert_eq!(
            checkpoints.since(ProjectId::new(1), FeedGeneration::Current),
            Some(at(-60))
        );
        assert_eq!(
            checkpoints.since(ProjectId::new(1), FeedGeneration::Legacy),
            Some(at(40))
        );
    }
}
