//! Error types for pipekv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvsError
pub type Result<T> = std::result::Result<T, KvsError>;

/// Unified error type for pipekv operations
#[derive(Debug, Error)]
pub enum KvsError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key {0:?}: keys must start with a letter or digit")]
    InvalidKey(String),

    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Subscription Errors
    // -------------------------------------------------------------------------
    #[error("Subscriber set for key {0:?} is full")]
    SubscribersFull(String),

    #[error("Session subscription list is full ({0} keys)")]
    SubscriptionLimit(usize),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Field too long for frame: {len} bytes (max {max})")]
    FrameTooLong { len: usize, max: usize },

    #[error("Admission queue is closed")]
    AdmissionClosed,

    // -------------------------------------------------------------------------
    // Job Errors
    // -------------------------------------------------------------------------
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Job stack is full ({0} jobs)")]
    JobStackFull(usize),

    #[error("Job stack is closed")]
    SchedulerClosed,

    // -------------------------------------------------------------------------
    // Backup Errors
    // -------------------------------------------------------------------------
    #[error("Backup failed: {0}")]
    Backup(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
