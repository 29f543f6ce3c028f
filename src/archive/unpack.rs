//! Archive extraction

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::logging::LOG_TAG;

use super::kind::CompressionKind;
use super::ArchiveError;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Result of extracting an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Regular files written
    pub files: usize,
    /// Directory entries created
    pub directories: usize,
    /// Bytes written to regular files
    pub bytes: u64,
    /// Entries of other types (links, devices) that were skipped
    pub skipped: usize,
}

/// Extract `archive` into `destination`.
///
/// `CompressionKind::None` is read as zip. Entry names are not assumed to
/// follow the scheme `compress` produces: leading `./` segments and explicit
/// directory entries are accepted, absolute names and `..` are rejected.
pub fn extract(
    archive: &Path,
    kind: CompressionKind,
    destination: &Path,
) -> Result<UnpackSummary, ArchiveError> {
    fs::create_dir_all(destination)?;
    let input = File::open(archive)?;

    let summary = match kind {
        CompressionKind::None | CompressionKind::Zip => extract_zip(input, destination)?,
        CompressionKind::Tar => extract_tar(input, destination)?,
        CompressionKind::TarGz => extract_tar(flate2::read::GzDecoder::new(input), destination)?,
    };

    tracing::debug!(
        archive = %archive.display(),
        kind = %kind,
        files = summary.files,
        directories = summary.directories,
        "{LOG_TAG} extracted archive"
    );
    Ok(summary)
}

fn extract_zip(input: File, destination: &Path) -> Result<UnpackSummary, ArchiveError> {
    let mut archive = ZipArchive::new(input)?;
    let mut summary = UnpackSummary::default();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let Some(rel_path) = sanitize_entry_name(&name)? else {
            continue;
        };
        let target = destination.join(rel_path);

        if entry.unix_mode().is_some_and(is_symlink_mode) {
            tracing::debug!(
                entry = %name,
                entry_type = "symlink",
                "{LOG_TAG} skipping non-file entry"
            );
            summary.skipped += 1;
        } else if entry.is_dir() {
            fs::create_dir_all(&target)?;
            summary.directories += 1;
        } else {
            summary.bytes += write_entry(&mut entry, &target)?;
            summary.files += 1;
        }
    }

    Ok(summary)
}

/// File type bits of a unix mode denote a symbolic link
fn is_symlink_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

fn extract_tar<R: Read>(input: R, destination: &Path) -> Result<UnpackSummary, ArchiveError> {
    let mut archive = tar::Archive::new(input);
    let mut summary = UnpackSummary::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        let Some(rel_path) = sanitize_entry_name(&name)? else {
            continue;
        };
        let target = destination.join(rel_path);

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&target)?;
                summary.directories += 1;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                summary.bytes += write_entry(&mut entry, &target)?;
                summary.files += 1;
            }
            other => {
                tracing::debug!(entry = %name, entry_type = ?other, "{LOG_TAG} skipping non-file entry");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// Create parent directories and write the entry bytes to a new file.
fn write_entry<R: Read>(entry: &mut R, target: &Path) -> Result<u64, ArchiveError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(target)?;
    Ok(io::copy(entry, &mut out)?)
}

/// Turn an entry name into a relative path below the destination.
///
/// Returns `Ok(None)` for names that denote the root itself (`./`, empty).
fn sanitize_entry_name(name: &str) -> Result<Option<PathBuf>, ArchiveError> {
    let unsafe_entry = || ArchiveError::UnsafeEntry {
        name: name.to_string(),
    };

    // Zip tools on Windows sometimes write backslash separators
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(unsafe_entry());
    }

    let mut rel_path = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => rel_path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_entry())
            }
        }
    }

    if rel_path.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(rel_path))
    }
}
