//! Compression kinds and format detection

use std::fmt;
use std::fs::File;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::pack::{EntryWriter, TarEntryWriter, ZipEntryWriter};
use super::ArchiveError;

/// Packaging format of an artifact blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionKind {
    /// Unlabeled; packs and extracts as zip, uploads without a content type.
    #[default]
    None,
    Zip,
    Tar,
    TarGz,
}

impl CompressionKind {
    /// The format actually written when packing with this kind.
    pub fn for_packing(self) -> CompressionKind {
        match self {
            CompressionKind::None => CompressionKind::Zip,
            other => other,
        }
    }

    /// File extension for packed archives of this kind.
    pub fn pack_extension(self) -> &'static str {
        match self.for_packing() {
            CompressionKind::Tar => ".tar",
            CompressionKind::TarGz => ".tar.gz",
            CompressionKind::None | CompressionKind::Zip => ".zip",
        }
    }

    /// Content type sent with uploads. `None` uploads carry no content type.
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            CompressionKind::None => None,
            CompressionKind::Zip => Some("application/zip"),
            CompressionKind::Tar => Some("application/tar"),
            CompressionKind::TarGz => Some("application/gzip"),
        }
    }

    /// Open an entry writer for this kind over `out`.
    pub(crate) fn entry_writer(self, out: File) -> Result<Box<dyn EntryWriter>, ArchiveError> {
        Ok(match self.for_packing() {
            CompressionKind::Tar => Box::new(TarEntryWriter::new(out)),
            CompressionKind::TarGz => Box::new(TarEntryWriter::new(flate2::write::GzEncoder::new(
                out,
                flate2::Compression::default(),
            ))),
            CompressionKind::None | CompressionKind::Zip => Box::new(ZipEntryWriter::new(out)),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionKind::None => "none",
            CompressionKind::Zip => "zip",
            CompressionKind::Tar => "tar",
            CompressionKind::TarGz => "tar-gz",
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown compression kind name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown compression kind: {0} (expected none, zip, tar or tar-gz)")]
pub struct ParseKindError(pub String);

impl FromStr for CompressionKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionKind::None),
            "zip" => Ok(CompressionKind::Zip),
            "tar" => Ok(CompressionKind::Tar),
            "tar-gz" | "targz" | "tar.gz" | "tgz" => Ok(CompressionKind::TarGz),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

/// Key suffixes, longest first so ".tar.gz" wins over ".tar"-like matches.
const SUFFIXES: &[(&str, CompressionKind)] = &[
    (".tar.gz", CompressionKind::TarGz),
    (".zip", CompressionKind::Zip),
    (".tar", CompressionKind::Tar),
];

/// Detect the compression kind of a downloaded object.
///
/// The object key suffix takes precedence over the content type; anything
/// unrecognized is `None`.
pub fn detect_kind(object_key: &str, content_type: Option<&str>) -> CompressionKind {
    let key = object_key.to_ascii_lowercase();
    if let Some((_, kind)) = SUFFIXES.iter().find(|(suffix, _)| key.ends_with(suffix)) {
        return *kind;
    }

    let Some(content_type) = content_type else {
        return CompressionKind::None;
    };
    // Drop parameters such as "; charset=binary"
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/zip" => CompressionKind::Zip,
        "application/gzip" | "application/x-gzip" => CompressionKind::TarGz,
        "application/tar" | "application/x-tar" => CompressionKind::Tar,
        _ => CompressionKind::None,
    }
}
