//! Archive packing

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tar::{Builder, Header};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::logging::LOG_TAG;

use super::kind::CompressionKind;
use super::walk::collect_files;
use super::ArchiveError;

/// Files at or above this size need zip64 extensions.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Result of packing a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    /// Format actually written (`None` packs as zip)
    pub kind: CompressionKind,
    /// Number of file entries
    pub entries: usize,
    /// Sum of the packed files' sizes
    pub source_bytes: u64,
    /// Size of the archive file
    pub archive_bytes: u64,
}

/// Format-specific archive entry construction.
pub(crate) trait EntryWriter {
    /// Append the file at `source` under entry `name`.
    fn append_file(&mut self, name: &str, source: &Path, size: u64) -> Result<(), ArchiveError>;

    /// Write trailers and flush the underlying file.
    fn finish(self: Box<Self>) -> Result<(), ArchiveError>;
}

/// Zip entry writer
pub(crate) struct ZipEntryWriter {
    zip: ZipWriter<File>,
}

impl ZipEntryWriter {
    pub(crate) fn new(out: File) -> Self {
        Self {
            zip: ZipWriter::new(out),
        }
    }
}

impl EntryWriter for ZipEntryWriter {
    fn append_file(&mut self, name: &str, source: &Path, size: u64) -> Result<(), ArchiveError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= ZIP64_THRESHOLD);
        self.zip.start_file(name, options)?;
        let mut input = File::open(source)?;
        io::copy(&mut input, &mut self.zip)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), ArchiveError> {
        let mut out = self.zip.finish()?;
        out.flush()?;
        Ok(())
    }
}

/// Streams that need an explicit end-of-stream step.
pub(crate) trait FinishStream: Write {
    fn finish_stream(self) -> io::Result<()>;
}

impl FinishStream for File {
    fn finish_stream(mut self) -> io::Result<()> {
        self.flush()
    }
}

impl FinishStream for flate2::write::GzEncoder<File> {
    fn finish_stream(self) -> io::Result<()> {
        let mut file = self.finish()?;
        file.flush()
    }
}

/// Tar entry writer over a plain or gzip stream
pub(crate) struct TarEntryWriter<W: FinishStream> {
    builder: Builder<W>,
}

impl<W: FinishStream> TarEntryWriter<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            builder: Builder::new(out),
        }
    }
}

impl<W: FinishStream> EntryWriter for TarEntryWriter<W> {
    fn append_file(&mut self, name: &str, source: &Path, size: u64) -> Result<(), ArchiveError> {
        let input = File::open(source)?;
        let metadata = input.metadata()?;

        let mut header = Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(size);
        header.set_mode(file_mode(&metadata));
        header.set_mtime(
            metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0),
        );

        // append_data handles names longer than the 100-byte header field
        self.builder.append_data(&mut header, name, input)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), ArchiveError> {
        let inner = self.builder.into_inner()?;
        inner.finish_stream()?;
        Ok(())
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

/// Pack every regular file under `source` into a new archive at `output`.
///
/// `CompressionKind::None` packs as zip. The file list is collected before
/// `output` is opened, so an output inside the source tree is never packed
/// into itself.
pub fn compress(
    source: &Path,
    kind: CompressionKind,
    output: &Path,
) -> Result<PackSummary, ArchiveError> {
    let files = collect_files(source)?;
    let packed_kind = kind.for_packing();

    let out = File::create(output)?;
    let mut writer = packed_kind.entry_writer(out)?;

    let mut source_bytes = 0u64;
    for file in &files {
        writer.append_file(&file.name, &file.path, file.size)?;
        source_bytes += file.size;
    }
    writer.finish()?;

    let archive_bytes = std::fs::metadata(output)?.len();
    tracing::debug!(
        source = %source.display(),
        kind = %packed_kind,
        entries = files.len(),
        archive_bytes,
        "{LOG_TAG} packed archive"
    );

    Ok(PackSummary {
        kind: packed_kind,
        entries: files.len(),
        source_bytes,
        archive_bytes,
    })
}
