//! Job executor
//!
//! Runs one job's commands, in order, against the store and writes their
//! results to the job's output.

use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::backup::BackupManager;
use crate::error::Result;
use crate::store::Store;

use super::JobCommand;

/// Marker for a key that READ could not find
pub const READ_MISSING: &str = "KVSERROR";

/// Marker for a key that DELETE could not find
pub const DELETE_MISSING: &str = "KVSMISSING";

pub const HELP_TEXT: &str = "Available commands:\n  \
WRITE [(key,value)(key2,value2),...]\n  \
READ [key,key2,...]\n  \
DELETE [key,key2,...]\n  \
SHOW\n  \
WAIT <delay_ms>\n  \
BACKUP\n  \
HELP\n";

/// Executes commands for a single job
pub struct JobExecutor<'a> {
    store: &'a Store,
    backups: &'a BackupManager,

    /// Backups are written to `<backup_base>-<n>.bck`
    backup_base: PathBuf,

    /// Backups requested so far by this job
    backups_taken: u32,
}

impl<'a> JobExecutor<'a> {
    pub fn new(store: &'a Store, backups: &'a BackupManager, backup_base: impl Into<PathBuf>) -> Self {
        Self {
            store,
            backups,
            backup_base: backup_base.into(),
            backups_taken: 0,
        }
    }

    /// Run every command in order. Store-level rejections are logged and
    /// skipped; only a failure to write the output aborts the job.
    pub fn execute<W: Write>(&mut self, commands: &[JobCommand], out: &mut W) -> Result<()> {
        for command in commands {
            self.execute_one(command, out)?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn execute_one<W: Write>(&mut self, command: &JobCommand, out: &mut W) -> Result<()> {
        match command {
            JobCommand::Write(pairs) => {
                if let Err(e) = self.store.write_batch(pairs) {
                    tracing::warn!("Failed to write pairs: {}", e);
                }
            }
            JobCommand::Read(keys) => match self.store.read_batch(keys) {
                Ok(results) => {
                    let mut line = String::from("[");
                    for (key, value) in &results {
                        let value = value.as_deref().unwrap_or(READ_MISSING);
                        line.push_str(&format!("({},{})", key, value));
                    }
                    line.push_str("]\n");
                    out.write_all(line.as_bytes())?;
                }
                Err(e) => tracing::warn!("Failed to read keys: {}", e),
            },
            JobCommand::Delete(keys) => match self.store.delete_batch(keys) {
                Ok(results) => {
                    let missing: String = results
                        .iter()
                        .filter(|(_, deleted)| !deleted)
                        .map(|(key, _)| format!("({},{})", key, DELETE_MISSING))
                        .collect();
                    if !missing.is_empty() {
                        out.write_all(format!("[{}]\n", missing).as_bytes())?;
                    }
                }
                Err(e) => tracing::warn!("Failed to delete keys: {}", e),
            },
            JobCommand::Show => {
                for (key, value) in self.store.enumerate() {
                    writeln!(out, "({}, {})", key, value)?;
                }
            }
            JobCommand::Wait(delay_ms) => {
                if *delay_ms > 0 {
                    out.write_all(b"Waiting...\n")?;
                    // Push "Waiting..." out before blocking this worker
                    out.flush()?;
                    thread::sleep(Duration::from_millis(*delay_ms));
                }
            }
            JobCommand::Backup => {
                let sequence = self.backups_taken + 1;
                match self.backups.backup(self.store, &self.backup_base, sequence) {
                    Ok(Some(path)) => {
                        self.backups_taken = sequence;
                        tracing::debug!("Backup started: {}", path.display());
                    }
                    Ok(None) => tracing::debug!("Backups disabled; BACKUP ignored"),
                    Err(e) => tracing::error!("Failed to perform backup: {}", e),
                }
            }
            JobCommand::Help => out.write_all(HELP_TEXT.as_bytes())?,
            JobCommand::Invalid { line, reason } => {
                tracing::warn!("Invalid command on line {} ({}). See HELP for usage", line, reason);
            }
        }
        Ok(())
    }

    /// Backups this job has started so far
    pub fn backups_taken(&self) -> u32 {
        self.backups_taken
    }
}
