// src/lock.rs
//! Single-instance guard. Two engines polling the same store would double the
//! fetch load and race on scheduling, so startup takes an exclusive advisory
//! lock on a well-known file and holds it for the process lifetime.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another instance holds the lock at {path}")]
    AlreadyRunning { path: PathBuf },
    #[error("lock io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// RAII guard; dropping it releases the lock.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the exclusive lock or fail immediately. Acquisition failure is
    /// fatal at startup by design; there is no waiting.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| LockError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LockError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(LockError::AlreadyRunning {
                path: path.to_path_buf(),
            });
        }

        tracing::debug!(path = %path.display(), "instance lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Explicit release; also happens automatically on drop.
    pub fn release(self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
