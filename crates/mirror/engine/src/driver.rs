//! Cycle driver: poll, then reconcile, on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::poller::{FeedOutcome, Poller};
use crate::store::MirrorStore;

/// Counters for one poll-and-apply cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub batches: usize,
    pub failed_feeds: usize,
    pub activities: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub unknown: usize,
    pub ignored: usize,
    /// Processed ids forgotten after the cycle.
    pub expired: usize,
}

pub struct CycleDriver {
    store: Arc<MirrorStore>,
    poller: Poller,
    interval: Duration,
}

impl CycleDriver {
    pub fn new(store: Arc<MirrorStore>, poller: Poller, interval: Duration) -> Self {
        Self {
            store,
            poller,
            interval,
        }
    }

    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.store
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Run one cycle as of `now`.
    ///
    /// Every activity takes the mirror lock separately; batches are applied
    /// in the order the poller returned them. Processed ids are expired only
    /// afterwards, against the oldest checkpoint left by this poll, so a
    /// window retried after an outage still finds its ids recorded.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleReport {
        let batches = self.poller.poll(now).await;
        let mut report = CycleReport {
            batches: batches.len(),
            ..CycleReport::default()
        };

        for batch in &batches {
            if batch.outcome == FeedOutcome::Failed {
                report.failed_feeds += 1;
            }
            for entry in &batch.activities {
                let applied = self.store.apply(entry).await;
                report.activities += 1;
                report.applied += applied.applied;
                report.unknown += applied.unknown.len();
                if applied.duplicate {
                    report.duplicates += 1;
                }
                if applied.ignored {
                    report.ignored += 1;
                }
            }
        }

        if let Some(horizon) = self.poller.checkpoints().oldest() {
            report.expired = self.store.expire_processed(horizon).await;
        }

        debug!(
            batches = report.batches,
            failed_feeds = report.failed_feeds,
            activities = report.activities,
            applied = report.applied,
            duplicates = report.duplicates,
            unknown = report.unknown,
            expired = report.expired,
            "Cycle complete"
        );
        report
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run cycles until the process exits.
    pub async fn run(mut self) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            projects = self.poller.projects().len(),
            "Starting cycle driver"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockTrackerApi;
    use crate::dedup::DedupConfig;
    use crate::error::ApiError;
    use crate::poller::PollConfig;
    use chrono::TimeZone;
    use mirror_types::{
        Activity, ActivityId, EventKind, FeedGeneration, ProjectId, StoryId, StoryRecord,
        TaskId, TaskRecord,
    };

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn activity(id: &str, kind: EventKind, secs: i64, story: StoryRecord) -> Activity {
        Activity {
            id: ActivityId::new(id),
            event_type: kind,
            occurred_at: at(secs),
            project_id: ProjectId::new(1),
            author: None,
            stories: vec![story],
        }
    }

    #[tokio::test]
    async fn test_overlapping_windows_apply_once() {
        let project = ProjectId::new(1);
        let create = Activity {
            id: ActivityId::new("create-1"),
            event_type: EventKind::StoryCreate,
            occurred_at: at(5),
            project_id: project,
            author: None,
            stories: vec![StoryRecord::new(StoryId::new(1))],
        };

        let api = Arc::new(MockTrackerApi::new());
        api.push_feed(project, FeedGeneration::Current, Ok(Some(vec![create.clone()])));
        api.push_feed(project, FeedGeneration::Current, Ok(Some(vec![create])));

        let poller = Poller::new(api, vec![project], PollConfig::default(), at(0));
        let mut driver = CycleDriver::new(
            Arc::new(MirrorStore::default()),
            poller,
            Duration::from_secs(1),
        );

        let first = driver.run_cycle_at(at(10)).await;
        assert_eq!(first.applied, 1);
        assert_eq!(first.batches, 2);

        let second = driver.run_cycle_at(at(11)).await;
        assert_eq!(second.duplicates, 1);
        assert_eq!(second.applied, 0);
        assert_eq!(driver.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_window_retried_after_long_outage_is_not_reapplied() {
        let project = ProjectId::new(1);
        let overlap = Duration::from_secs(10);
        let create = activity(
            "c",
            EventKind::StoryCreate,
            5,
            StoryRecord::new(StoryId::new(1)),
        );
        let add_task = activity(
            "t",
            EventKind::TaskCreate,
            6,
            StoryRecord {
                tasks: Some(vec![TaskRecord::new(TaskId::new(9))]),
                ..StoryRecord::new(StoryId::new(1))
            },
        );

        let api = Arc::new(MockTrackerApi::new());
        api.push_feed(project, FeedGeneration::Current, Ok(Some(vec![create.clone()])));
        api.push_feed(project, FeedGeneration::Legacy, Ok(Some(vec![add_task])));
        for _ in 0..9 {
            api.push_feed(
                project,
                FeedGeneration::Current,
                Err(ApiError::Transport("connection refused".into())),
            );
        }
        api.push_feed(project, FeedGeneration::Current, Ok(Some(vec![create])));

        let poller = Poller::new(
            api,
            vec![project],
            PollConfig {
                overlap,
                legacy_feed: true,
            },
            at(0),
        );
        let store = Arc::new(MirrorStore::new(DedupConfig::for_overlap(overlap)));
        let mut driver = CycleDriver::new(store.clone(), poller, Duration::from_secs(10));

        driver.run_cycle_at(at(10)).await;
        let once = store.snapshot().await;
        assert!(once[&StoryId::new(1)].tasks.contains_key(&TaskId::new(9)));

        // The outage outlasts the retention of four overlap windows.
        for cycle in 2..=10 {
            let report = driver.run_cycle_at(at(cycle * 10)).await;
            assert_eq!(report.failed_feeds, 1);
        }

        let replay = driver.run_cycle_at(at(110)).await;
        assert_eq!(replay.failed_feeds, 0);
        assert_eq!(replay.duplicates, 1);
        assert_eq!(replay.applied, 0);
        assert_eq!(store.snapshot().await, once);
    }

    #[tokio::test]
    async fn test_ids_expire_once_every_feed_has_moved_on() {
        let project = ProjectId::new(1);
        let create = activity(
            "c",
            EventKind::StoryCreate,
            5,
            StoryRecord::new(StoryId::new(1)),
        );

        let api = Arc::new(MockTrackerApi::new());
        api.push_feed(project, FeedGeneration::Current, Ok(Some(vec![create])));

        let overlap = Duration::from_secs(10);
        let poller = Poller::new(
            api,
            vec![project],
            PollConfig {
                overlap,
                legacy_feed: true,
            },
            at(0),
        );
        let store = Arc::new(MirrorStore::new(DedupConfig::for_overlap(overlap)));
        let mut driver = CycleDriver::new(store, poller, Duration::from_secs(10));

        assert_eq!(driver.run_cycle_at(at(10)).await.expired, 0);
        // Oldest checkpoint at 90, cutoff 50: the id from t=5 can no longer
        // be delivered.
        assert_eq!(driver.run_cycle_at(at(100)).await.expired, 1);
    }
}
