//! Processed-activity record.
//!
//! Every poll re-reads an overlap window, so the same activity is delivered
//! several times. The record remembers applied activity ids until no feed can
//! deliver them again: an id is only forgotten once its occurrence time falls
//! a retention margin behind the oldest poll checkpoint. A capacity bound
//! keeps a long-running process from growing without limit.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use mirror_types::{ActivityId, FeedGeneration};

/// Bounds of the processed-activity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupConfig {
    /// How far behind the oldest poll checkpoint an applied id is still
    /// remembered. Covers activities a feed reports slightly before the
    /// window it was asked for.
    pub retention: Duration,

    /// Maximum number of ids remembered; the earliest occurring are evicted
    /// first.
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(4 * 60),
            capacity: 50_000,
        }
    }
}

impl DedupConfig {
    /// Retention of four overlap windows.
    pub fn for_overlap(overlap: Duration) -> Self {
        Self {
            retention: overlap.saturating_mul(4),
            ..Self::default()
        }
    }
}

type Key = (FeedGeneration, ActivityId);

/// Checkpoint- and capacity-bounded set of applied activity ids.
#[derive(Debug, Clone)]
pub struct ProcessedActivities {
    config: DedupConfig,
    seen: HashMap<Key, DateTime<Utc>>,
    by_occurrence: BTreeSet<(DateTime<Utc>, Key)>,
}

impl ProcessedActivities {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            seen: HashMap::new(),
            by_occurrence: BTreeSet::new(),
        }
    }

    pub fn contains(&self, feed: FeedGeneration, id: &ActivityId) -> bool {
        self.seen.contains_key(&(feed, id.clone()))
    }

    /// Record `id`, which occurred at `occurred_at`, as applied.
    ///
    /// Returns `false` if it was already recorded.
    pub fn record(
        &mut self,
        feed: FeedGeneration,
        id: &ActivityId,
        occurred_at: DateTime<Utc>,
    ) -> bool {
        let key = (feed, id.clone());
        if self.seen.contains_key(&key) {
            return false;
        }

        self.seen.insert(key.clone(), occurred_at);
        self.by_occurrence.insert((occurred_at, key));

        while self.seen.len() > self.config.capacity {
            match self.by_occurrence.pop_first() {
                Some((_, earliest)) => {
                    self.seen.remove(&earliest);
                }
                None => break,
            }
        }

        true
    }

    /// Forget ids that occurred more than the retention margin before
    /// `horizon`, the oldest checkpoint any feed will be polled from.
    ///
    /// Returns the number of ids forgotten.
    pub fn expire(&mut self, horizon: DateTime<Utc>) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(self.config.retention)
            .ok()
            .and_then(|retention| horizon.checked_sub_signed(retention))
        else {
            return 0;
        };

        let mut expired = 0;
        while let Some((occurred_at, _)) = self.by_occurrence.first() {
            if *occurred_at >= cutoff {
                break;
            }
            if let Some((_, key)) = self.by_occurrence.pop_first() {
                self.seen.remove(&key);
                expired += 1;
            }
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
