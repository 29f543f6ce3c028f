//! Archive codec
//!
//! Symmetric packaging of a directory tree: `compress` walks a source tree
//! (following symbolic links) and emits one entry per regular file, named by
//! its path relative to the walk root; `extract` replays any zip or tar
//! stream into a destination directory. `detect_kind` recovers the format of
//! an unlabeled blob from its object key and content type.

mod kind;
mod pack;
mod unpack;
mod walk;

pub use kind::{detect_kind, CompressionKind, ParseKindError};
pub use pack::{compress, PackSummary};
pub use unpack::{extract, UnpackSummary};
pub use walk::{collect_files, WalkedFile};

use std::io;
use std::path::PathBuf;

/// Errors for archive operations
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("symlink cycle detected at {path} (loops back to {ancestor})")]
    SymlinkCycle { path: PathBuf, ancestor: PathBuf },

    #[error("unsafe archive entry name: {name}")]
    UnsafeEntry { name: String },

    #[error("source is not a directory: {0}")]
    NotADirectory(PathBuf),
}

impl ArchiveError {
    /// Structural failures come from the shape of the input (a link cycle, a
    /// hostile entry name) and will fail again on retry.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ArchiveError::SymlinkCycle { .. } | ArchiveError::UnsafeEntry { .. }
        )
    }
}

impl From<walkdir::Error> for ArchiveError {
    fn from(err: walkdir::Error) -> Self {
        if let Some(ancestor) = err.loop_ancestor() {
            let ancestor = ancestor.to_path_buf();
            let path = err.path().map(|p| p.to_path_buf()).unwrap_or_else(|| ancestor.clone());
            return ArchiveError::SymlinkCycle { path, ancestor };
        }
        ArchiveError::Io(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file1.txt"), "content1").unwrap();
        fs::write(dir.path().join("empty.bin"), "").unwrap();
        fs::create_dir_all(dir.path().join("a/b/c/d/e")).unwrap();
        fs::write(dir.path().join("a/b/c/d/e/deep.txt"), "deep content").unwrap();
        fs::write(dir.path().join("a/sibling.txt"), vec![7u8; 70_000]).unwrap();
        dir
    }

    /// Relative name -> bytes for every regular file under `root`.
    fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
        collect_files(root)
            .unwrap()
            .into_iter()
            .map(|f| {
                let bytes = fs::read(&f.path).unwrap();
                (f.name, bytes)
            })
            .collect()
    }

    fn round_trip(kind: CompressionKind) {
        let source = create_tree();
        let scratch = TempDir::new().unwrap();
        let archive = scratch.path().join(format!("out{}", kind.pack_extension()));

        let packed = compress(source.path(), kind, &archive).unwrap();
        assert_eq!(packed.entries, 4);

        let dest = TempDir::new().unwrap();
        let unpacked = extract(&archive, kind, dest.path()).unwrap();
        assert_eq!(unpacked.files, 4);

        assert_eq!(snapshot(source.path()), snapshot(dest.path()));
    }

    #[test]
    fn test_round_trip_zip() {
        round_trip(CompressionKind::Zip);
    }

    #[test]
    fn test_round_trip_tar() {
        round_trip(CompressionKind::Tar);
    }

    #[test]
    fn test_round_trip_tar_gz() {
        round_trip(CompressionKind::TarGz);
    }

    #[test]
    fn test_none_packs_and_extracts_as_zip() {
        let source = create_tree();
        let scratch = TempDir::new().unwrap();
        let archive = scratch.path().join("out.bin");

        let packed = compress(source.path(), CompressionKind::None, &archive).unwrap();
        assert_eq!(packed.kind, CompressionKind::Zip);

        // The bytes are a zip archive
        let bytes = fs::read(&archive).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let dest = TempDir::new().unwrap();
        extract(&archive, CompressionKind::None, dest.path()).unwrap();
        assert_eq!(snapshot(source.path()), snapshot(dest.path()));
    }

    #[test]
    fn test_compress_rejects_file_source() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let err = compress(&file, CompressionKind::Zip, &dir.path().join("out.zip")).unwrap_err();
        assert!(matches!(err, ArchiveError::NotADirectory(_)));
        assert!(!err.is_structural());
    }

    fn raw_header(name: &str, size: u64, entry_type: tar::EntryType) -> tar::Header {
        let mut header = tar::Header::new_ustar();
        let ustar = header.as_ustar_mut().unwrap();
        ustar.name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(size);
        header.set_mode(if entry_type.is_dir() { 0o755 } else { 0o644 });
        header.set_entry_type(entry_type);
        header.set_cksum();
        header
    }

    #[test]
    fn test_extract_third_party_tar_with_dot_prefix_and_dirs() {
        let scratch = TempDir::new().unwrap();
        let archive_path = scratch.path().join("third-party.tar");

        {
            let file = fs::File::create(&archive_path).unwrap();
            let mut builder = tar::Builder::new(file);

            // Raw names keep the "./" prefix that GNU tar emits
            builder.append(&raw_header("./", 0, tar::EntryType::Directory), &[] as &[u8]).unwrap();
            builder.append(&raw_header("./pkg/", 0, tar::EntryType::Directory), &[] as &[u8]).unwrap();
            let body = b"hello from elsewhere";
            builder
                .append(&raw_header("./pkg/readme.md", body.len() as u64, tar::EntryType::Regular), &body[..])
                .unwrap();
            builder.append(&raw_header("./pkg/empty/", 0, tar::EntryType::Directory), &[] as &[u8]).unwrap();

            builder.into_inner().unwrap();
        }

        let dest = TempDir::new().unwrap();
        let summary = extract(&archive_path, CompressionKind::Tar, dest.path()).unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(summary.directories, 2);
        assert_eq!(
            fs::read(dest.path().join("pkg/readme.md")).unwrap(),
            b"hello from elsewhere"
        );
        assert!(dest.path().join("pkg/empty").is_dir());
    }

    #[test]
    fn test_extract_third_party_zip_with_directory_entries() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let scratch = TempDir::new().unwrap();
        let archive_path = scratch.path().join("third-party.zip");

        {
            let file = fs::File::create(&archive_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = SimpleFileOptions::default();
            zip.add_directory("docs/", options).unwrap();
            zip.add_directory("docs/empty/", options).unwrap();
            zip.start_file("docs/guide.txt", options).unwrap();
            zip.write_all(b"guide").unwrap();
            zip.start_file("zero.txt", options).unwrap();
            zip.finish().unwrap();
        }

        let dest = TempDir::new().unwrap();
        let summary = extract(&archive_path, CompressionKind::Zip, dest.path()).unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(fs::read(dest.path().join("docs/guide.txt")).unwrap(), b"guide");
        assert_eq!(fs::read(dest.path().join("zero.txt")).unwrap().len(), 0);
        assert!(dest.path().join("docs/empty").is_dir());
    }

    #[test]
    fn test_extract_rejects_parent_traversal() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let scratch = TempDir::new().unwrap();
        let archive_path = scratch.path().join("evil.zip");
        {
            let file = fs::File::create(&archive_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("../escape.txt", SimpleFileOptions::default()).unwrap();
            zip.write_all(b"nope").unwrap();
            zip.finish().unwrap();
        }

        let dest = TempDir::new().unwrap();
        let err = extract(&archive_path, CompressionKind::Zip, dest.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeEntry { .. }));
        assert!(err.is_structural());
        assert!(!scratch.path().join("escape.txt").exists());
    }

    #[test]
    fn test_extract_garbage_is_not_structural() {
        let scratch = TempDir::new().unwrap();
        let archive_path = scratch.path().join("garbage.zip");
        fs::write(&archive_path, b"definitely not a zip file").unwrap();

        let dest = TempDir::new().unwrap();
        let err = extract(&archive_path, CompressionKind::Zip, dest.path()).unwrap_err();
        assert!(!err.is_structural());
    }

    #[cfg(unix)]
    mod symlink_tests {
        use super::*;
        use std::os::unix::fs::symlink;

        #[test]
        fn test_symlinked_directory_is_followed() {
            let outside = TempDir::new().unwrap();
            fs::write(outside.path().join("shared.txt"), "shared").unwrap();

            let source = TempDir::new().unwrap();
            fs::write(source.path().join("own.txt"), "own").unwrap();
            symlink(outside.path(), source.path().join("linked")).unwrap();

            let scratch = TempDir::new().unwrap();
            let archive = scratch.path().join("out.tar");
            compress(source.path(), CompressionKind::Tar, &archive).unwrap();

            let dest = TempDir::new().unwrap();
            extract(&archive, CompressionKind::Tar, dest.path()).unwrap();

            assert_eq!(fs::read(dest.path().join("linked/shared.txt")).unwrap(), b"shared");
            assert_eq!(fs::read(dest.path().join("own.txt")).unwrap(), b"own");
        }

        #[test]
        fn test_symlink_cycle_is_fatal_and_structural() {
            let source = TempDir::new().unwrap();
            fs::create_dir(source.path().join("sub")).unwrap();
            fs::write(source.path().join("sub/file.txt"), "x").unwrap();
            symlink(source.path(), source.path().join("sub/loop")).unwrap();

            let scratch = TempDir::new().unwrap();
            let err = compress(source.path(), CompressionKind::Zip, &scratch.path().join("out.zip"))
                .unwrap_err();

            match &err {
                ArchiveError::SymlinkCycle { path, .. } => {
                    assert!(path.to_string_lossy().contains("loop"));
                }
                other => panic!("Expected SymlinkCycle, got {:?}", other),
            }
            assert!(err.is_structural());
        }

        #[test]
        fn test_dangling_symlink_is_skipped() {
            let source = TempDir::new().unwrap();
            fs::write(source.path().join("real.txt"), "real").unwrap();
            symlink("/nonexistent/target", source.path().join("dangling")).unwrap();

            let scratch = TempDir::new().unwrap();
            let archive = scratch.path().join("out.zip");
            let summary = compress(source.path(), CompressionKind::Zip, &archive).unwrap();
            assert_eq!(summary.entries, 1);

            let dest = TempDir::new().unwrap();
            let unpacked = extract(&archive, CompressionKind::Zip, dest.path()).unwrap();
            assert_eq!(unpacked.files, 1);
            assert_eq!(fs::read(dest.path().join("real.txt")).unwrap(), b"real");
            assert!(fs::symlink_metadata(dest.path().join("dangling")).is_err());
        }

        #[test]
        fn test_unreadable_directory_is_still_fatal() {
            use std::os::unix::fs::PermissionsExt;

            let source = TempDir::new().unwrap();
            let locked = source.path().join("locked");
            fs::create_dir(&locked).unwrap();
            fs::write(locked.join("secret.txt"), "x").unwrap();
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

            // Permission bits do not bind root
            let readable = fs::read_dir(&locked).is_ok();
            let scratch = TempDir::new().unwrap();
            let result = compress(source.path(), CompressionKind::Zip, &scratch.path().join("out.zip"));
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

            if !readable {
                let err = result.unwrap_err();
                assert!(matches!(err, ArchiveError::Io(_)));
                assert!(!err.is_structural());
            }
        }

        #[test]
        fn test_zip_symlink_entries_are_skipped() {
            use std::io::Write;
            use zip::write::SimpleFileOptions;

            // Layout as written by `zip -y`: a regular file plus a link to it
            let scratch = TempDir::new().unwrap();
            let archive = scratch.path().join("links.zip");
            {
                let file = fs::File::create(&archive).unwrap();
                let mut zip = zip::ZipWriter::new(file);
                zip.start_file("target.txt", SimpleFileOptions::default()).unwrap();
                zip.write_all(b"payload").unwrap();
                zip.add_symlink("link", "target.txt", SimpleFileOptions::default())
                    .unwrap();
                zip.finish().unwrap();
            }

            let dest = TempDir::new().unwrap();
            let summary = extract(&archive, CompressionKind::Zip, dest.path()).unwrap();

            assert_eq!(summary.files, 1);
            assert_eq!(summary.skipped, 1);
            assert_eq!(fs::read(dest.path().join("target.txt")).unwrap(), b"payload");
            assert!(fs::symlink_metadata(dest.path().join("link")).is_err());
        }
    }
}
