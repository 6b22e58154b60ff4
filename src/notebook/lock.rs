//! Advisory locking of notebook paths.
//!
//! Tool invocations read, execute and rewrite the whole file, so two calls
//! against the same notebook would otherwise race and the last save would
//! win. [`NotebookLock`] serializes such calls through an exclusive `flock`
//! on a sidecar `<notebook>.lock` file. The lock is advisory: it only
//! orders writers that take it, not editors such as JupyterLab.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use fs2::FileExt;
use tracing::{debug, instrument};

use crate::error::NotebookError;

/// Exclusive lock on a notebook path, released on drop.
#[derive(Debug)]
pub struct NotebookLock {
    file: File,
    path: PathBuf,
}

impl NotebookLock {
    /// Blocks until the lock for `notebook` is held.
    ///
    /// # Errors
    ///
    /// Returns `NotebookError::Lock` if the lock file cannot be opened or locked.
    #[instrument(fields(notebook = %notebook.display()))]
    pub fn acquire(notebook: &Path) -> Result<Self, NotebookError> {
        let path = Self::lock_path(notebook);
        let file = open_lock_file(&path)?;

        if try_lock(&file, &path)? {
            debug!("Notebook lock acquired");
            return Ok(Self { file, path });
        }

        debug!("Notebook is locked by another call, waiting");
        let start = Instant::now();
        file.lock_exclusive().map_err(|e| NotebookError::Lock {
            context: format!("failed to lock {}", path.display()),
            source: e,
        })?;

        debug!(wait_ms = %start.elapsed().as_millis(), "Notebook lock acquired");
        Ok(Self { file, path })
    }

    /// Takes the lock only if nobody else holds it.
    ///
    /// Returns `Ok(None)` when the lock is busy.
    ///
    /// # Errors
    ///
    /// Returns `NotebookError::Lock` if the lock file cannot be opened or
    /// locking fails for any reason other than contention.
    pub fn try_acquire(notebook: &Path) -> Result<Option<Self>, NotebookError> {
        let path = Self::lock_path(notebook);
        let file = open_lock_file(&path)?;

        if try_lock(&file, &path)? {
            Ok(Some(Self { file, path }))
        } else {
            Ok(None)
        }
    }

    /// Sidecar lock file used for `notebook`.
    #[must_use]
    pub fn lock_path(notebook: &Path) -> PathBuf {
        let mut name = notebook
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        notebook.with_file_name(name)
    }

    /// Path of the lock file held.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File, NotebookError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| NotebookError::Lock {
            context: format!("failed to open lock file {}", path.display()),
            source: e,
        })
}

/// `Ok(false)` means another holder has the lock.
fn try_lock(file: &File, path: &Path) -> Result<bool, NotebookError> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(e) if is_contended(&e) => Ok(false),
        Err(e) => Err(NotebookError::Lock {
            context: format!("failed to lock {}", path.display()),
            source: e,
        }),
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    let contended = fs2::lock_contended_error();
    err.raw_os_error().is_some() && err.raw_os_error() == contended.raw_os_error()
}

impl Drop for NotebookLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
