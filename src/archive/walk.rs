//! Symlink-following directory walk

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::logging::LOG_TAG;

use super::ArchiveError;

/// A regular file found by the walk
#[derive(Debug, Clone)]
pub struct WalkedFile {
    /// Path as traversed (through any followed links)
    pub path: PathBuf,
    /// Entry name: path relative to the walk root, `/`-separated
    pub name: String,
    /// File size in bytes
    pub size: u64,
}

/// Collect every regular file below `root`, following symbolic links.
///
/// Entries are sorted by file name at each level so archives are stable.
/// A link that points back at one of its ancestors yields
/// `ArchiveError::SymlinkCycle` instead of looping. Dangling links are
/// not regular files and are skipped.
pub fn collect_files(root: &Path) -> Result<Vec<WalkedFile>, ArchiveError> {
    if !root.is_dir() {
        return Err(ArchiveError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if is_dangling_link(&err) => {
                tracing::warn!(
                    path = ?err.path(),
                    "{LOG_TAG} skipping dangling symlink"
                );
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| ArchiveError::UnsafeEntry {
                name: entry.path().display().to_string(),
            })?;

        files.push(WalkedFile {
            name: entry_name(rel_path),
            size: entry.metadata()?.len(),
            path: entry.path().to_path_buf(),
        });
    }

    Ok(files)
}

/// A link whose target does not exist, as opposed to a cycle or a real
/// read failure.
fn is_dangling_link(err: &walkdir::Error) -> bool {
    if err.loop_ancestor().is_some() {
        return false;
    }
    let not_found = err
        .io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound);
    not_found
        && err
            .path()
            .and_then(|p| fs::symlink_metadata(p).ok())
            .is_some_and(|m| m.file_type().is_symlink())
}

/// Archive entry name for a relative path.
fn entry_name(rel_path: &Path) -> String {
    rel_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
