//! Bulk loader.
//!
//! Builds the baseline mirror by fetching every (project, block) listing with
//! a bounded number of requests in flight. The mirror lock is held for the
//! whole load so no activity is applied against a half-built mirror.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use mirror_types::{Block, ProjectId};
use tracing::{debug, info};

use crate::api::{flatten_stories, TrackerApi};
use crate::error::{MirrorError, Result};
use crate::store::MirrorStore;

/// Bulk loader configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Maximum concurrent listing fetches.
    pub workers: usize,
    /// Blocks fetched per project.
    pub blocks: Vec<Block>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            blocks: Block::ALL.to_vec(),
        }
    }
}

impl LoaderConfig {
    /// Build a configuration from block names, rejecting unsupported ones.
    pub fn from_names<S: AsRef<str>>(workers: usize, names: &[S]) -> Result<Self> {
        let blocks = names
            .iter()
            .map(|name| name.as_ref().parse::<Block>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let config = Self { workers, blocks };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(MirrorError::InvalidConfiguration(
                "loader workers must be at least 1".to_string(),
            ));
        }
        if self.blocks.is_empty() {
            return Err(MirrorError::InvalidConfiguration(
                "at least one block must be loaded".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a bulk load produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Listings fetched.
    pub listings: usize,
    /// Story records merged, counting records seen in more than one listing.
    pub records: usize,
    /// Distinct stories in the mirror after the load.
    pub stories: usize,
}

pub struct BulkLoader {
    api: Arc<dyn TrackerApi>,
    config: LoaderConfig,
}

impl BulkLoader {
    pub fn new(api: Arc<dyn TrackerApi>, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { api, config })
    }

    /// Load every configured block of `projects` into `store`.
    ///
    /// Any failed fetch fails the whole load.
    pub async fn load(&self, store: &MirrorStore, projects: &[ProjectId]) -> Result<LoadSummary> {
        let mut state = store.lock().await;

        let pairs: Vec<(ProjectId, Block)> = projects
            .iter()
            .flat_map(|project| self.config.blocks.iter().map(move |block| (*project, *block)))
            .collect();

        info!(
            projects = projects.len(),
            listings = pairs.len(),
            workers = self.config.workers,
            "Starting bulk load"
        );

        let mut results = stream::iter(pairs)
            .map(|(project_id, block)| {
                let api = Arc::clone(&self.api);
                async move {
                    let nodes = api.fetch_stories(project_id, block).await;
                    (project_id, block, nodes)
                }
            })
            .buffer_unordered(self.config.workers);

        let mut summary = LoadSummary::default();
        while let Some((project_id, block, nodes)) = results.next().await {
            let nodes = nodes.map_err(|source| MirrorError::LoadFailed {
                project_id,
                block,
                source,
            })?;
            let records = flatten_stories(nodes);
            let merged = state.merge(project_id, &records);
            debug!(project_id = %project_id, block = %block, stories = merged, "Loaded block");
            summary.listings += 1;
            summary.records += merged;
        }
        summary.stories = state.len();

        info!(
            listings = summary.listings,
            stories = summary.stories,
            "Bulk load complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockTrackerApi;
    use mirror_types::{IterationRecord, StoryId, StoryNode, StoryRecord};

    fn story(id: u64) -> StoryNode {
        StoryNode::Story(StoryRecord::new(StoryId::new(id)))
    }

    #[test]
    fn test_from_names_rejects_unknown_block() {
        let err = LoaderConfig::from_names(10, &["current", "archive"]).unwrap_err();
        assert!(matches!(err, MirrorError::UnknownBlock(_)));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = LoaderConfig::from_names(0, &["done"]).unwrap_err();
        assert!(matches!(err, MirrorError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_load_flattens_every_block() {
        let project = ProjectId::new(1);
        let api = MockTrackerApi::new()
            .with_stories(
                project,
                Block::Current,
                vec![StoryNode::Iteration(IterationRecord {
                    id: Some(1),
                    number: Some(1),
                    stories: vec![story(1), story(2)],
                })],
            )
            .with_stories(project, Block::Icebox, vec![story(3)])
            .with_stories(
                project,
                Block::Done,
                vec![StoryNode::List(vec![StoryNode::List(vec![story(4)])])],
            );
        let api = Arc::new(api);
        let loader = BulkLoader::new(api.clone(), LoaderConfig::default()).unwrap();
        let store = MirrorStore::default();

        let summary = loader.load(&store, &[project]).await.unwrap();
        assert_eq!(summary.listings, 4);
        assert_eq!(summary.stories, 4);
        assert_eq!(api.story_calls().len(), 4);

        let story = store.story(StoryId::new(4)).await.unwrap();
        assert_eq!(story.project_id, project);
    }

    #[tokio::test]
    async fn test_load_fails_on_transport_error() {
        let project = ProjectId::new(1);
        let api = Arc::new(MockTrackerApi::new().with_failing_block(project, Block::Backlog));
        let loader = BulkLoader::new(api, LoaderConfig::default()).unwrap();

        let err = loader
            .load(&MirrorStore::default(), &[project])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MirrorError::LoadFailed {
                block: Block::Backlog,
                ..
            }
        ));
    }
}
