//! Engine Module
//!
//! Owns the store and the services around it.
//!
//! ## Responsibilities
//! - Validate config and build the store
//! - Run job directories through the scheduler
//! - Hand out a session server sharing the same store and registry
//! - Wait for outstanding backups on close

use std::path::Path;
use std::sync::Arc;

use crate::backup::BackupManager;
use crate::config::Config;
use crate::error::Result;
use crate::jobs::{JobReport, JobScheduler};
use crate::network::{ChannelOpener, Server, SessionRegistry};
use crate::store::Store;

/// The key-value engine
///
/// ## Sharing
/// - The store and session registry are shared (`Arc`) with every
///   [`Server`] created from this engine
/// - Jobs borrow the store for the duration of a directory run
/// - Backups copy out of the store and never hold its locks while writing
pub struct Engine {
    config: Config,

    store: Arc<Store>,

    /// Background backup writers (bounded by `max_backups`)
    backups: BackupManager,

    /// Live client sessions
    registry: Arc<SessionRegistry>,
}

impl Engine {
    /// Build an engine from a validated config
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(Store::new(config.max_sessions));
        let backups = BackupManager::new(config.max_backups);
        tracing::info!(
            "Engine ready: {} job workers, {} max backups, {} max sessions",
            config.max_job_workers,
            config.max_backups,
            config.max_sessions
        );

        Ok(Self {
            config,
            store,
            backups,
            registry: Arc::new(SessionRegistry::new()),
        })
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Scheduler over this engine's store and backup pool
    pub fn scheduler(&self) -> JobScheduler<'_> {
        JobScheduler::new(
            &self.store,
            &self.backups,
            self.config.max_job_workers,
            self.config.job_stack_capacity,
        )
    }

    /// Run every job in the configured jobs directory
    pub fn run_jobs(&self) -> Result<JobReport> {
        self.run_jobs_in(&self.config.jobs_dir)
    }

    /// Run every job in `dir`
    pub fn run_jobs_in(&self, dir: &Path) -> Result<JobReport> {
        self.scheduler().run_directory(dir)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Session server sharing this engine's store. Not started.
    pub fn server(&self, opener: Arc<dyn ChannelOpener>) -> Server {
        Server::new(
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            opener,
        )
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Wait for outstanding backups and release the engine
    pub fn close(self) {
        self.backups.wait_all();
        tracing::info!(
            "Engine closed: {} backups written, {} failed",
            self.backups.completed(),
            self.backups.failed()
        );
    }
}
