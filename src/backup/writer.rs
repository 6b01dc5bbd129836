//! Backup file writer
//!
//! One `(key, value)` line per pair, in store enumeration order. The file
//! is written as `<path>.tmp` and renamed into place on
//! [`finish`](BackupWriter::finish), so a reader never observes a
//! half-written backup.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{KvsError, Result};

pub const BACKUP_EXTENSION: &str = "bck";

/// `<base>-<seq>.bck`
pub fn backup_path(base: &Path, sequence: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!("-{}.{}", sequence, BACKUP_EXTENSION));
    PathBuf::from(name)
}

pub struct BackupWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    finished: bool,
}

impl BackupWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let final_path = path.into();
        let mut tmp = final_path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);

        let file = File::create(&tmp_path)
            .map_err(|e| KvsError::Backup(format!("{}: {}", final_path.display(), e)))?;
        Ok(Self {
            final_path,
            tmp_path,
            writer: BufWriter::new(file),
            finished: false,
        })
    }

    pub fn write_pair(&mut self, key: &str, value: &str) -> Result<()> {
        writeln!(self.writer, "({}, {})", key, value)?;
        Ok(())
    }

    /// Flush, sync, and move the file to its final name. Returns the path.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        fs::rename(&self.tmp_path, &self.final_path)?;
        self.finished = true;
        Ok(self.final_path.clone())
    }
}

impl Drop for BackupWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}
