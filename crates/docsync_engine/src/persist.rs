use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// Path of the rolling backup kept next to `target`.
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    target.with_file_name(name)
}

/// Atomically writes files below `dir`: content goes to a temp file in the
/// target's directory, is synced, and is then renamed over the target. The
/// target is never opened for writing, so it is either the old or the new file.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
    keep_backup: bool,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            keep_backup: false,
        }
    }

    /// Copy the previous target to `{name}.bak` right before each rename.
    pub fn with_backup(mut self) -> Self {
        self.keep_backup = true;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `content` to a synced temp file without touching the target.
    /// `relative` may contain `/`-separated subdirectories, created on demand.
    pub fn stage(&self, relative: &str, content: &[u8]) -> Result<StagedWrite, PersistError> {
        let target = self.dir.join(relative);
        let parent = target.parent().unwrap_or(&self.dir).to_path_buf();
        ensure_output_dir(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(content)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        Ok(StagedWrite {
            tmp,
            backup: self.keep_backup.then(|| backup_path(&target)),
            target,
        })
    }

    pub fn write(&self, relative: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        self.stage(relative, content)?.commit()
    }
}

/// A fully written temp file waiting to replace its target. Dropping it without
/// calling [`StagedWrite::commit`] deletes the temp file and leaves the target as it was.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: NamedTempFile,
    target: PathBuf,
    backup: Option<PathBuf>,
}

impl StagedWrite {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(self) -> Result<PathBuf, PersistError> {
        if let Some(backup) = &self.backup {
            if self.target.exists() {
                fs::copy(&self.target, backup)?;
            }
        }
        self.tmp
            .persist(&self.target)
            .map_err(|e| PersistError::Io(e.error))?;
        Ok(self.target)
    }
}
