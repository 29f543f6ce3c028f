//! Scratch files for downloaded blobs and packed outputs
//!
//! Scratch files are named `<project>-<random><extension>`. Deleting them is
//! best effort: a file that cannot be removed is queued on
//! [`DeferredCleanup`] and retried later instead of failing the transfer.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile, TempPath};

use crate::logging::LOG_TAG;

/// Create a scratch file in `dir` (or the system temp dir).
pub fn scratch_file(
    dir: Option<&Path>,
    project_name: &str,
    extension: &str,
) -> io::Result<NamedTempFile> {
    let prefix = format!("{}-", project_name);
    let mut builder = Builder::new();
    builder.prefix(&prefix).suffix(extension);
    match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

/// Paths whose deletion failed and should be retried
#[derive(Debug, Default)]
pub struct DeferredCleanup {
    pending: Mutex<Vec<PathBuf>>,
}

impl DeferredCleanup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, path: PathBuf) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path);
    }

    pub fn pending(&self) -> Vec<PathBuf> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Delete a scratch file now, or queue it for later.
    pub fn dispose(&self, path: TempPath) {
        let target = path.to_path_buf();
        if let Err(err) = path.close() {
            if err.kind() == io::ErrorKind::NotFound {
                return;
            }
            tracing::warn!(path = %target.display(), error = %err, "{LOG_TAG} scratch file not removed, deferring");
            self.schedule(target);
        }
    }

    /// Retry every queued deletion. Returns the number still pending.
    pub fn sweep(&self) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|path| match std::fs::remove_file(path) {
            Ok(()) => false,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "{LOG_TAG} deferred cleanup failed");
                true
            }
        });
        pending.len()
    }
}
