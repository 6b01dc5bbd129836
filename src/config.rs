//! Configuration for pipekv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvsError, Result};

/// Default admission ceiling (pending + active sessions)
pub const DEFAULT_MAX_SESSIONS: usize = 8;

/// Default number of keys a single session may subscribe to
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 10;

/// Default job stack capacity
pub const DEFAULT_JOB_STACK_CAPACITY: usize = 10_000;

/// Main configuration for a pipekv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Job Configuration
    // -------------------------------------------------------------------------
    /// Directory scanned for `*.job` scripts. Outputs (`*.out`) and
    /// backups (`*-N.bck`) are written next to their job file.
    pub jobs_dir: PathBuf,

    /// Number of job worker threads
    pub max_job_workers: usize,

    /// Capacity of the job stack
    pub job_stack_capacity: usize,

    // -------------------------------------------------------------------------
    // Backup Configuration
    // -------------------------------------------------------------------------
    /// Max concurrently running backups (0 disables BACKUP)
    pub max_backups: usize,

    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// Name of the well-known registration channel
    pub registration_channel: PathBuf,

    /// Admission queue capacity, session worker count, and per-key
    /// subscriber capacity
    pub max_sessions: usize,

    /// Max keys one session may be subscribed to
    pub max_subscriptions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("./jobs"),
            max_job_workers: 4,
            job_stack_capacity: DEFAULT_JOB_STACK_CAPACITY,
            max_backups: 2,
            registration_channel: PathBuf::from("/tmp/pipekv"),
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings that would leave a pool or queue without capacity
    pub fn validate(&self) -> Result<()> {
        if self.max_job_workers == 0 {
            return Err(KvsError::Config("max_job_workers must be at least 1".into()));
        }
        if self.max_sessions == 0 {
            return Err(KvsError::Config("max_sessions must be at least 1".into()));
        }
        if self.max_subscriptions == 0 {
            return Err(KvsError::Config("max_subscriptions must be at least 1".into()));
        }
        if self.job_stack_capacity == 0 {
            return Err(KvsError::Config("job_stack_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the directory scanned for job files
    pub fn jobs_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.jobs_dir = path.into();
        self
    }

    /// Set the number of job worker threads
    pub fn max_job_workers(mut self, count: usize) -> Self {
        self.config.max_job_workers = count;
        self
    }

    /// Set the job stack capacity
    pub fn job_stack_capacity(mut self, capacity: usize) -> Self {
        self.config.job_stack_capacity = capacity;
        self
    }

    /// Set the backup concurrency ceiling
    pub fn max_backups(mut self, count: usize) -> Self {
        self.config.max_backups = count;
        self
    }

    /// Set the registration channel name
    pub fn registration_channel(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.registration_channel = path.into();
        self
    }

    /// Set the admission ceiling
    pub fn max_sessions(mut self, count: usize) -> Self {
        self.config.max_sessions = count;
        self
    }

    /// Set the per-session subscription limit
    pub fn max_subscriptions(mut self, count: usize) -> Self {
        self.config.max_subscriptions = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
