//! Configuration for mirror-daemon

use std::time::Duration;

use mirror_engine::{DedupConfig, LoaderConfig, MirrorError, PollConfig};
use mirror_types::{Block, ProjectId};
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

/// Longest accepted poll overlap: one week.
pub const MAX_OVERLAP_SECS: u64 = 7 * 24 * 60 * 60;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Remote tracker configuration
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Activity polling configuration
    #[serde(default)]
    pub poll: PollSettings,

    /// Bulk loader configuration
    #[serde(default)]
    pub loader: LoaderSettings,

    /// Processed-activity record bounds
    #[serde(default)]
    pub dedup: DedupSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// API token sent with every request
    #[serde(default)]
    pub token: String,

    /// Base URL of the current API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL of the legacy API, serving the legacy activity feed
    #[serde(default = "default_legacy_api_url")]
    pub legacy_api_url: String,

    /// Tracked project ids
    #[serde(default)]
    pub projects: Vec<u64>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            legacy_api_url: default_legacy_api_url(),
            projects: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Activity polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Seconds each poll window reaches back before the previous one
    #[serde(default = "default_overlap")]
    pub overlap_secs: u64,

    /// Milliseconds between poll cycles
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Poll the legacy feed for task and comment events
    #[serde(default = "default_true")]
    pub legacy_feed: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            overlap_secs: default_overlap(),
            interval_ms: default_interval(),
            legacy_feed: true,
        }
    }
}

/// Bulk loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Maximum concurrent listing fetches
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Blocks loaded per project
    #[serde(default = "default_blocks")]
    pub blocks: Vec<String>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            blocks: default_blocks(),
        }
    }
}

/// Processed-activity record bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSettings {
    /// Seconds an applied activity id is still remembered once the oldest
    /// poll checkpoint has passed it; four overlap windows when unset
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// Maximum remembered ids
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            retention_secs: None,
            capacity: default_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,

    /// Append logs to this file instead of stdout
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_api_url() -> String {
    "https://www.pivotaltracker.com/services/v5".to_string()
}

fn default_legacy_api_url() -> String {
    "https://www.pivotaltracker.com/services/v3".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_overlap() -> u64 {
    60
}

fn default_interval() -> u64 {
    1000
}

fn default_workers() -> usize {
    10
}

fn default_blocks() -> Vec<String> {
    Block::ALL.iter().map(|block| block.as_str().to_string()).collect()
}

fn default_capacity() -> usize {
    DedupConfig::default().capacity
}

fn default_log_level() -> String {
    "info".to_string()
}

impl MirrorConfig {
    /// Load configuration from defaults, an optional file and `MIRROR__*`
    /// environment variables, in that order of precedence.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&MirrorConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Nested keys use a double underscore: MIRROR__POLL__OVERLAP_SECS
        builder = builder.add_source(
            config::Environment::with_prefix("MIRROR")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("tracker.projects")
                .with_list_parse_key("loader.blocks")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> DaemonResult<()> {
        if self.tracker.token.trim().is_empty() {
            return Err(DaemonError::Config("tracker token is required".into()));
        }
        if self.tracker.projects.is_empty() {
            return Err(DaemonError::Config(
                "at least one project id is required".into(),
            ));
        }
        if self.poll.interval_ms == 0 {
            return Err(DaemonError::Config("poll interval must be positive".into()));
        }
        if self.poll.overlap_secs > MAX_OVERLAP_SECS {
            return Err(DaemonError::Config(format!(
                "poll overlap ({}s) exceeds the maximum of {}s",
                self.poll.overlap_secs, MAX_OVERLAP_SECS
            )));
        }
        let retention = self.dedup.retention_for(self.poll.overlap());
        if retention < self.poll.overlap() {
            return Err(DaemonError::Config(format!(
                "dedup retention ({}s) must cover the poll overlap ({}s)",
                retention.as_secs(),
                self.poll.overlap_secs
            )));
        }
        self.loader_config()?;
        Ok(())
    }

    pub fn project_ids(&self) -> Vec<ProjectId> {
        self.tracker.projects.iter().copied().map(ProjectId::new).collect()
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            overlap: self.poll.overlap(),
            legacy_feed: self.poll.legacy_feed,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms)
    }

    pub fn loader_config(&self) -> Result<LoaderConfig, MirrorError> {
        LoaderConfig::from_names(self.loader.workers, self.loader.blocks.as_slice())
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            retention: self.dedup.retention_for(self.poll.overlap()),
            capacity: self.dedup.capacity,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.tracker.request_timeout_secs)
    }
}

impl PollSettings {
    pub fn overlap(&self) -> Duration {
        Duration::from_secs(self.overlap_secs)
    }
}

impl DedupSettings {
    /// Retention given the configured poll overlap.
    pub fn retention_for(&self, overlap: Duration) -> Duration {
        match self.retention_secs {
            Some(secs) => Duration::from_secs(secs),
            None => DedupConfig::for_overlap(overlap).retention,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable() -> MirrorConfig {
        let mut config = MirrorConfig::default();
        config.tracker.token = "token".into();
        config.tracker.projects = vec![1, 2];
        config
    }

    #[test]
    fn test_default_config() {
        let config = MirrorConfig::default();
        assert_eq!(config.poll.overlap_secs, 60);
        assert_eq!(config.poll.interval_ms, 1000);
        assert_eq!(config.loader.workers, 10);
        assert_eq!(config.loader.blocks.len(), 4);
        assert!(config.poll.legacy_feed);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_dedup_retention_follows_overlap() {
        let mut config = runnable();
        config.poll.overlap_secs = 30;
        assert_eq!(config.dedup_config().retention, Duration::from_secs(120));

        config.dedup.retention_secs = Some(600);
        assert_eq!(config.dedup_config().retention, Duration::from_secs(600));
    }

    #[test]
    fn test_validate() {
        assert!(runnable().validate().is_ok());
        assert!(MirrorConfig::default().validate().is_err());

        let mut config = runnable();
        config.loader.blocks = vec!["current".into(), "archive".into()];
        assert!(matches!(
            config.validate(),
            Err(DaemonError::Engine(MirrorError::UnknownBlock(_)))
        ));
    }

    #[test]
    fn test_validate_rejects_excessive_overlap() {
        let mut config = runnable();
        config.poll.overlap_secs = MAX_OVERLAP_SECS;
        assert!(config.validate().is_ok());

        config.poll.overlap_secs = 100_000_000_000_000;
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = MirrorConfig::load(None).unwrap();
        assert_eq!(config.tracker.request_timeout_secs, 30);
        assert_eq!(config.project_ids().len(), config.tracker.projects.len());
    }
}
