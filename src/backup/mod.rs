//! Backup Module
//!
//! Point-in-time copies of the store, written by background threads.
//!
//! ## Isolation
//! The requesting job takes a consistent copy of every pair (all shard
//! read locks, ascending) before the writer thread starts. Writes issued
//! after the BACKUP command never appear in that backup.
//!
//! ## Ceiling
//! At most `max_backups` writer threads run at once. A BACKUP issued at the
//! ceiling blocks its job until a writer finishes. A ceiling of zero
//! disables backups.

mod writer;

pub use writer::{backup_path, BackupWriter, BACKUP_EXTENSION};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::error::{KvsError, Result};
use crate::store::Store;

#[derive(Debug, Default)]
struct BackupState {
    outstanding: usize,
    peak: usize,
    completed: usize,
    failed: usize,
    handles: Vec<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BackupState>,
    finished: Condvar,
}

/// Bounded pool of backup writers
#[derive(Debug)]
pub struct BackupManager {
    ceiling: usize,
    shared: Arc<Shared>,
}

impl BackupManager {
    pub fn new(max_backups: usize) -> Self {
        Self {
            ceiling: max_backups,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Copy the store and write it to `<base>-<sequence>.bck` in the
    /// background.
    ///
    /// Blocks while `max_backups` writers are already running. Returns the
    /// path the backup will land at, or `None` when backups are disabled.
    pub fn backup(&self, store: &Store, base: &Path, sequence: u32) -> Result<Option<PathBuf>> {
        if self.ceiling == 0 {
            return Ok(None);
        }

        {
            let mut state = self.shared.state.lock();
            while state.outstanding >= self.ceiling {
                self.shared.finished.wait(&mut state);
            }
            state.outstanding += 1;
            state.peak = state.peak.max(state.outstanding);
            state.handles.retain(|h| !h.is_finished());
        }

        let pairs = store.enumerate();
        let path = backup_path(base, sequence);
        tracing::debug!("Backing up {} pairs to {}", pairs.len(), path.display());

        let shared = Arc::clone(&self.shared);
        let target = path.clone();
        let spawned = thread::Builder::new()
            .name(format!("backup-{}", sequence))
            .spawn(move || {
                let result = write_backup(&target, &pairs);
                let mut state = shared.state.lock();
                state.outstanding -= 1;
                match result {
                    Ok(()) => state.completed += 1,
                    Err(e) => {
                        tracing::error!("Backup {} failed: {}", target.display(), e);
                        state.failed += 1;
                    }
                }
                shared.finished.notify_all();
            });

        match spawned {
            Ok(handle) => {
                self.shared.state.lock().handles.push(handle);
                Ok(Some(path))
            }
            Err(e) => {
                let mut state = self.shared.state.lock();
                state.outstanding -= 1;
                self.shared.finished.notify_all();
                Err(KvsError::Backup(format!("Failed to start backup writer: {}", e)))
            }
        }
    }

    /// Block until every running backup has finished
    pub fn wait_all(&self) {
        let handles = {
            let mut state = self.shared.state.lock();
            while state.outstanding > 0 {
                self.shared.finished.wait(&mut state);
            }
            std::mem::take(&mut state.handles)
        };
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Backup writer panicked");
            }
        }
    }

    /// Writers currently running
    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().outstanding
    }

    /// Most writers ever running at once
    pub fn peak_outstanding(&self) -> usize {
        self.shared.state.lock().peak
    }

    pub fn completed(&self) -> usize {
        self.shared.state.lock().completed
    }

    pub fn failed(&self) -> usize {
        self.shared.state.lock().failed
    }

    pub fn max_backups(&self) -> usize {
        self.ceiling
    }
}

fn write_backup(path: &Path, pairs: &[(String, String)]) -> Result<()> {
    let mut writer = BackupWriter::create(path)?;
    for (key, value) in pairs {
        writer.write_pair(key, value)?;
    }
    writer.finish()?;
    Ok(())
}
