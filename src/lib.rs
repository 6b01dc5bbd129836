//! # PipeKV
//!
//! A sharded in-memory key-value store with:
//! - Batched job scripts run by a fixed worker pool
//! - Background point-in-time backups
//! - Key-change subscriptions over named-pipe client sessions
//! - Deadlock-free multi-key locking (ascending shard order)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────────┐
//! │      Job Scheduler       │        │   Registration channel       │
//! │ (*.job → worker pool)    │        │  (connect frames)            │
//! └────────────┬─────────────┘        └──────────────┬───────────────┘
//!              │                                     │
//!              │                      ┌──────────────▼───────────────┐
//!              │                      │  Admission queue → sessions  │
//!              │                      │  (SUBSCRIBE / UNSUBSCRIBE)   │
//!              │                      └──────────────┬───────────────┘
//!              │                                     │
//! ┌────────────▼─────────────────────────────────────▼───────────────┐
//! │                     Store (26 shards, RwLock)                    │
//! │            entries + per-key subscriber sets                     │
//! └────────────┬─────────────────────────────────────┬───────────────┘
//!              │                                     │
//!              ▼                                     ▼
//!   ┌────────────────────┐              ┌────────────────────────────┐
//!   │  Backup writers    │              │  Notification channels     │
//!   │  (<job>-<n>.bck)   │              │  (k,v) / (k,DELETED)       │
//!   └────────────────────┘              └────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod protocol;
pub mod network;
pub mod jobs;
pub mod backup;
pub mod engine;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvsError, Result};
pub use config::Config;
pub use engine::Engine;
pub use store::Store;
pub use client::{Client, NotificationReader};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of PipeKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
