//! Remote tracker API seam.
//!
//! The engine consumes the tracker through [`TrackerApi`] so it does not
//! depend on any particular transport. Story listings arrive irregularly
//! nested; [`flatten_stories`] is the single place that normalizes them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirror_types::{Activity, Block, FeedGeneration, ProjectId, StoryNode, StoryRecord};

use crate::error::{ApiError, ApiResult};

/// Typed fetch functions of the remote tracker.
///
/// Activity fetches return `Ok(None)` when the payload could not be parsed.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Fetch the stories of one workflow block of a project.
    async fn fetch_stories(&self, project_id: ProjectId, block: Block)
        -> ApiResult<Vec<StoryNode>>;

    /// Fetch current-feed activities that occurred since `since`.
    async fn fetch_activities(
        &self,
        project_id: ProjectId,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<Activity>>>;

    /// Fetch legacy-feed activities that occurred since `since`.
    async fn fetch_legacy_activities(
        &self,
        project_id: ProjectId,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<Activity>>>;
}

/// Fetch from the feed of the given generation.
pub async fn fetch_feed(
    api: &dyn TrackerApi,
    feed: FeedGeneration,
    project_id: ProjectId,
    since: DateTime<Utc>,
) -> ApiResult<Option<Vec<Activity>>> {
    match feed {
        FeedGeneration::Current => api.fetch_activities(project_id, since).await,
        FeedGeneration::Legacy => api.fetch_legacy_activities(project_id, since).await,
    }
}

/// Flatten a nested story listing into its story records, in listing order.
pub fn flatten_stories(nodes: Vec<StoryNode>) -> Vec<StoryRecord> {
    fn walk(node: StoryNode, out: &mut Vec<StoryRecord>) {
        match node {
            StoryNode::Story(story) => out.push(story),
            StoryNode::Iteration(iteration) => {
                for child in iteration.stories {
                    walk(child, out);
                }
            }
            StoryNode::List(children) => {
                for child in children {
                    walk(child, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    for node in nodes {
        walk(node, &mut out);
    }
    out
}

type FeedKey = (ProjectId, FeedGeneration);

/// Scripted tracker API for tests and local runs.
///
/// Story listings are served per (project, block). Activity responses are
/// queued per (project, feed) and consumed one per call; an exhausted queue
/// answers with an empty feed.
#[derive(Default)]
pub struct MockTrackerApi {
    stories: Mutex<HashMap<(ProjectId, Block), Vec<StoryNode>>>,
    failing_blocks: Mutex<HashSet<(ProjectId, Block)>>,
    feeds: Mutex<HashMap<FeedKey, VecDeque<ApiResult<Option<Vec<Activity>>>>>>,
    feed_calls: Mutex<Vec<(ProjectId, FeedGeneration, DateTime<Utc>)>>,
    story_calls: Mutex<Vec<(ProjectId, Block)>>,
}

impl MockTrackerApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `nodes` for the given block.
    pub fn with_stories(self, project_id: ProjectId, block: Block, nodes: Vec<StoryNode>) -> Self {
        lock(&self.stories).insert((project_id, block), nodes);
        self
    }

    /// Make fetches of the given block fail with a transport error.
    pub fn with_failing_block(self, project_id: ProjectId, block: Block) -> Self {
        lock(&self.failing_blocks).insert((project_id, block));
        self
    }

    /// Queue one feed response.
    pub fn push_feed(
        &self,
        project_id: ProjectId,
        feed: FeedGeneration,
        response: ApiResult<Option<Vec<Activity>>>,
    ) {
        lock(&self.feeds)
            .entry((project_id, feed))
            .or_default()
            .push_back(response);
    }

    /// Every activity fetch made so far, with the `since` it was made with.
    pub fn feed_calls(&self) -> Vec<(ProjectId, FeedGeneration, DateTime<Utc>)> {
        lock(&self.feed_calls).clone()
    }

    /// Every story fetch made so far.
    pub fn story_calls(&self) -> Vec<(ProjectId, Block)> {
        lock(&self.story_calls).clone()
    }

    fn next_feed(
        &self,
        project_id: ProjectId,
        feed: FeedGeneration,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<Activity>>> {
        lock(&self.feed_calls).push((project_id, feed, since));
        lock(&self.feeds)
            .get_mut(&(project_id, feed))
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(Some(Vec::new())))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl TrackerApi for MockTrackerApi {
    async fn fetch_stories(
        &self,
        project_id: ProjectId,
        block: Block,
    ) -> ApiResult<Vec<StoryNode>> {
        lock(&self.story_calls).push((project_id, block));
        if lock(&self.failing_blocks).contains(&(project_id, block)) {
            return Err(ApiError::Transport(format!(
                "simulated failure for {} {}",
                project_id, block
            )));
        }
        Ok(lock(&self.stories)
            .get(&(project_id, block))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_activities(
        &self,
        project_id: ProjectId,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<Activity>>> {
        self.next_feed(project_id, FeedGeneration::Current, since)
    }

    async fn fetch_legacy_activities(
        &self,
        project_id: ProjectId,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<Activity>>> {
        self.next_feed(project_id, FeedGeneration::Legacy, since)
    }
}
