//! Story Mirror Daemon
//!
//! Loads every configured project into the in-memory mirror, then polls the
//! activity feeds and reconciles the mirror until the process is stopped.

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use mirror_engine::{BulkLoader, CycleDriver, MirrorStore, Poller, TrackerApi};
use tracing::info;

use mirror_daemon::config::MirrorConfig;
use mirror_daemon::error::{DaemonError, DaemonResult};
use mirror_daemon::{logging, HttpTrackerApi};

/// Story Mirror Daemon CLI
#[derive(Parser)]
#[command(name = "mirrord")]
#[command(about = "Story Mirror - keeps an in-memory mirror of tracker stories", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MIRROR_CONFIG")]
    config: Option<String>,

    /// Tracker API token
    #[arg(long, env = "MIRROR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Comma-separated project ids
    #[arg(long, value_delimiter = ',')]
    projects: Vec<u64>,

    /// Seconds each poll window overlaps the previous one
    #[arg(long)]
    overlap_secs: Option<u64>,

    /// Append logs to this file
    #[arg(long)]
    log_file: Option<String>,

    /// Log level
    #[arg(long, env = "MIRROR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MIRROR_LOG_JSON")]
    json: bool,
}

impl Cli {
    fn apply(self, config: &mut MirrorConfig) {
        if let Some(token) = self.token {
            config.tracker.token = token;
        }
        if !self.projects.is_empty() {
            config.tracker.projects = self.projects;
        }
        if let Some(overlap) = self.overlap_secs {
            config.poll.overlap_secs = overlap;
        }
        if let Some(path) = self.log_file {
            config.logging.file = Some(path);
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.json {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = MirrorConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    cli.apply(&mut config);

    logging::init(&config.logging)?;
    config.validate()?;

    let projects = config.project_ids();
    let api: Arc<dyn TrackerApi> =
        Arc::new(HttpTrackerApi::new(&config.tracker, config.request_timeout())?);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        projects = ?config.tracker.projects,
        overlap_secs = config.poll.overlap_secs,
        legacy_feed = config.poll.legacy_feed,
        "Starting story mirror"
    );

    // Checkpoints start before the load so activity during it is polled.
    let poller = Poller::new(api.clone(), projects.clone(), config.poll_config(), Utc::now());

    let store = Arc::new(MirrorStore::new(config.dedup_config()));
    let loader = BulkLoader::new(api, config.loader_config()?)?;
    loader.load(&store, &projects).await?;

    CycleDriver::new(store, poller, config.poll_interval())
        .run()
        .await;

    Ok(())
}
