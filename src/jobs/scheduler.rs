//! Job scheduler
//!
//! Runs every `.job` file in a directory across a fixed pool of workers.
//!
//! ```text
//!   read_dir ──push──► ┌───────────┐ ◄──pop── worker-0 ──► <name>.out
//!                      │ JobStack  │ ◄──pop── worker-1 ──► <name>.out
//!                      └───────────┘ ◄──pop── worker-N ──► <name>.out
//! ```
//!
//! The directory is listed before any worker starts, so a missing or
//! unreadable directory fails the whole run without spawning threads.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::backup::BackupManager;
use crate::error::{KvsError, Result};
use crate::store::Store;

use super::executor::JobExecutor;
use super::parser::parse_script;
use super::stack::JobStack;

pub const JOB_EXTENSION: &str = "job";
pub const OUTPUT_EXTENSION: &str = "out";

/// A single job file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub name: String,
    pub dir: PathBuf,
}

impl Job {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    /// `<dir>/<name>.job`
    pub fn input_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, JOB_EXTENSION))
    }

    /// `<dir>/<name>.out`
    pub fn output_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, OUTPUT_EXTENSION))
    }

    /// `<dir>/<name>`; backups append `-<n>.bck`
    pub fn backup_base(&self) -> PathBuf {
        self.dir.join(&self.name)
    }
}

/// Outcome of a directory run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobReport {
    pub completed: usize,
    pub failed: usize,
}

impl JobReport {
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }
}

pub struct JobScheduler<'a> {
    store: &'a Store,
    backups: &'a BackupManager,
    workers: usize,
    stack_capacity: usize,
}

impl<'a> JobScheduler<'a> {
    pub fn new(
        store: &'a Store,
        backups: &'a BackupManager,
        workers: usize,
        stack_capacity: usize,
    ) -> Self {
        Self {
            store,
            backups,
            workers: workers.max(1),
            stack_capacity,
        }
    }

    /// Names of the `.job` files in `dir`, sorted
    pub fn discover(dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(JOB_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Run every job in `dir` and wait for all of them.
    ///
    /// Jobs are independent: one failing job is logged and counted, the
    /// rest still run. Backups a job started may still be running when
    /// this returns.
    pub fn run_directory(&self, dir: &Path) -> Result<JobReport> {
        let names = Self::discover(dir)?;
        tracing::info!("Found {} jobs in {}", names.len(), dir.display());

        let stack = JobStack::new(self.stack_capacity);
        let completed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        thread::scope(|scope| -> Result<()> {
            let mut handles = Vec::with_capacity(self.workers);
            for i in 0..self.workers {
                let worker = thread::Builder::new()
                    .name(format!("job-worker-{}", i))
                    .spawn_scoped(scope, || {
                        while let Some(name) = stack.pop() {
                            let job = Job::new(dir, name);
                            match self.run_job(&job) {
                                Ok(()) => {
                                    completed.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(e) => {
                                    tracing::error!("Job {} failed: {}", job.name, e);
                                    failed.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                    });
                match worker {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        stack.close();
                        return Err(e.into());
                    }
                }
            }

            let mut pushed = Ok(());
            for name in names {
                if let Err(e) = stack.push(name) {
                    pushed = Err(e);
                    break;
                }
            }
            stack.close();

            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("Job worker panicked");
                }
            }
            pushed
        })?;

        let report = JobReport {
            completed: completed.into_inner(),
            failed: failed.into_inner(),
        };
        tracing::info!(
            "Jobs finished: {} completed, {} failed",
            report.completed,
            report.failed
        );
        Ok(report)
    }

    /// Parse and execute one job, writing its results to `<name>.out`
    pub fn run_job(&self, job: &Job) -> Result<()> {
        let script = fs::read_to_string(job.input_path())?;
        let output = File::create(job.output_path()).map_err(|e| {
            KvsError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", job.output_path().display(), e),
            ))
        })?;
        let mut out = BufWriter::new(output);

        let commands = parse_script(&script);
        tracing::debug!("Running job {} ({} commands)", job.name, commands.len());

        let mut executor = JobExecutor::new(self.store, self.backups, job.backup_base());
        executor.execute(&commands, &mut out)
    }
}
