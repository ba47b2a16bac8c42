//! Per-feed poll checkpoints.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mirror_types::{FeedGeneration, ProjectId};

/// `at - overlap`, saturating at the earliest representable instant.
fn reach_back(at: DateTime<Utc>, overlap: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(overlap)
        .ok()
        .and_then(|overlap| at.checked_sub_signed(overlap))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Last-polled timestamp per (project, feed generation).
#[derive(Debug, Clone)]
pub struct Checkpoints {
    overlap: Duration,
    since: HashMap<(ProjectId, FeedGeneration), DateTime<Utc>>,
}

impl Checkpoints {
    /// Initialize every polled (project, feed) pair to `start - overlap`.
    pub fn new(
        projects: &[ProjectId],
        feeds: &[FeedGeneration],
        start: DateTime<Utc>,
        overlap: Duration,
    ) -> Self {
        let initial = reach_back(start, overlap);
        let since = projects
            .iter()
            .flat_map(|project| feeds.iter().map(move |feed| ((*project, *feed), initial)))
            .collect();
        Self { overlap, since }
    }

    /// The timestamp the next fetch of this feed starts from.
    pub fn since(&self, project_id: ProjectId, feed: FeedGeneration) -> Option<DateTime<Utc>> {
        self.since.get(&(project_id, feed)).copied()
    }

    /// The earliest checkpoint of any polled feed. Nothing that occurred
    /// before it will be fetched again.
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.since.values().min().copied()
    }

    /// The checkpoint a poll made at `now` will store on success.
    pub fn next(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        reach_back(now, self.overlap)
    }

    pub fn advance(&mut self, project_id: ProjectId, feed: FeedGeneration, to: DateTime<Utc>) {
        self.since.insert((project_id, feed), to);
    }
}
