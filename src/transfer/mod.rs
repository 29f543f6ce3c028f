//! Artifact transfer
//!
//! Inputs: fetch each artifact into a scratch file, detect its packaging,
//! extract it into the workspace, delete the scratch file.
//!
//! Outputs: match build outputs to declared artifacts, pack directories,
//! and upload each artifact in declaration order through a multipart
//! upload. Contract violations and missing paths fail before the first
//! store call.

mod multipart;
mod outputs;
mod scratch;

pub use multipart::{
    chunk_plan, ChunkSpec, MultipartUploader, UploadReceipt, UploadSession, DEFAULT_CHUNK_BYTES,
};
pub use outputs::{match_outputs, BuildOutput, OutputContractError};
pub use scratch::{scratch_file, DeferredCleanup};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use pipeline_protocol::ops::GetObjectRequest;

use crate::archive::{self, detect_kind, ArchiveError, CompressionKind};
use crate::credentials::CredentialError;
use crate::job::JobContext;
use crate::logging::LOG_TAG;
use crate::store::{ObjectStore, StoreError};

/// Transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("credentials unavailable: {0}")]
    Credentials(#[from] CredentialError),

    #[error("store request failed: {0}")]
    Store(#[from] StoreError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("output contract violated: {0}")]
    OutputContract(#[from] OutputContractError),

    #[error("output path does not exist: {}", .0.display())]
    MissingOutput(PathBuf),
}

impl TransferError {
    /// True for symlink cycles and unsafe archive entries
    pub fn is_structural(&self) -> bool {
        matches!(self, TransferError::Archive(e) if e.is_structural())
    }
}

/// Transfer settings
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Remove the workspace's contents before the first download
    pub clear_before_download: bool,
    pub chunk_bytes: u64,
    /// Where scratch files go; the system temp dir when unset
    pub scratch_dir: Option<PathBuf>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            clear_before_download: false,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            scratch_dir: None,
        }
    }
}

/// What `download_inputs` placed in the workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub artifacts: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Moves artifacts between the store and a build's workspace
pub struct ArtifactTransfer {
    store: Arc<dyn ObjectStore>,
    options: TransferOptions,
    cleanup: Arc<DeferredCleanup>,
}

impl ArtifactTransfer {
    pub fn new(store: Arc<dyn ObjectStore>, options: TransferOptions) -> Self {
        Self {
            store,
            options,
            cleanup: Arc::new(DeferredCleanup::new()),
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Scratch files whose deletion was deferred
    pub fn cleanup(&self) -> &Arc<DeferredCleanup> {
        &self.cleanup
    }

    /// Fetch and extract every input artifact into the workspace.
    ///
    /// The kind of the last extracted input becomes the packaging for
    /// directory outputs.
    pub fn download_inputs(&self, ctx: &mut JobContext) -> Result<DownloadSummary, TransferError> {
        let workspace = ctx.workspace().to_path_buf();
        if self.options.clear_before_download && workspace.exists() {
            tracing::info!(workspace = %workspace.display(), "{LOG_TAG} clearing workspace");
            clear_directory(&workspace)?;
        }
        fs::create_dir_all(&workspace)?;

        let mut summary = DownloadSummary::default();
        let inputs = ctx.work_item().inputs.clone();
        for input in &inputs {
            let location = &input.location;
            tracing::info!(
                job_id = %ctx.work_item().id,
                artifact = %input.name,
                bucket = %location.bucket,
                key = %location.object_key,
                "{LOG_TAG} downloading input artifact"
            );

            let mut blob = scratch_file(self.scratch_dir(), ctx.project_name(), "")?;
            let credential = ctx.credentials().credentials()?;
            let metadata = self.store.get_object(
                &credential.credentials,
                &GetObjectRequest {
                    bucket: location.bucket.clone(),
                    key: location.object_key.clone(),
                },
                blob.as_file_mut(),
            )?;
            blob.as_file_mut().flush()?;
            let blob = blob.into_temp_path();

            let kind = detect_kind(&location.object_key, metadata.content_type.as_deref());
            let extracted = archive::extract(&blob, kind, &workspace);
            self.cleanup.dispose(blob);
            let extracted = extracted?;

            tracing::info!(
                artifact = %input.name,
                kind = %kind,
                files = extracted.files,
                bytes = extracted.bytes,
                "{LOG_TAG} extracted input artifact"
            );
            ctx.establish_kind(kind);
            summary.artifacts += 1;
            summary.files += extracted.files;
            summary.bytes += extracted.bytes;
        }

        Ok(summary)
    }

    /// Upload build outputs to their declared artifact locations.
    pub fn upload_outputs(
        &self,
        ctx: &JobContext,
        outputs: &[BuildOutput],
    ) -> Result<Vec<UploadReceipt>, TransferError> {
        let pairs = match_outputs(&ctx.work_item().outputs, outputs)?;

        // Resolve every path before touching the store
        let mut resolved = Vec::with_capacity(pairs.len());
        for (artifact, output) in pairs {
            let path = resolve_output_path(ctx.workspace(), &output.path);
            if !path.exists() {
                return Err(TransferError::MissingOutput(path));
            }
            resolved.push((artifact, path));
        }

        let uploader = MultipartUploader::new(self.store.as_ref(), self.options.chunk_bytes);
        let encryption = ctx.work_item().upload_encryption();
        let mut receipts = Vec::with_capacity(resolved.len());

        for (artifact, path) in resolved {
            let receipt = if path.is_dir() {
                let kind = ctx.output_kind();
                let packed =
                    scratch_file(self.scratch_dir(), ctx.project_name(), kind.pack_extension())?
                        .into_temp_path();
                let result = archive::compress(&path, kind, &packed)
                    .map_err(TransferError::from)
                    .and_then(|summary| {
                        uploader.upload_file(
                            ctx.credentials(),
                            &packed,
                            &artifact.location,
                            summary.kind,
                            encryption.clone(),
                        )
                    });
                self.cleanup.dispose(packed);
                result?
            } else {
                uploader.upload_file(
                    ctx.credentials(),
                    &path,
                    &artifact.location,
                    CompressionKind::None,
                    encryption.clone(),
                )?
            };

            tracing::info!(
                job_id = %ctx.work_item().id,
                artifact = %artifact.name,
                bucket = %receipt.bucket,
                key = %receipt.key,
                bytes = receipt.bytes,
                parts = receipt.parts,
                "{LOG_TAG} uploaded output artifact"
            );
            receipts.push(receipt);
        }

        Ok(receipts)
    }

    fn scratch_dir(&self) -> Option<&Path> {
        self.options.scratch_dir.as_deref()
    }
}

/// An empty output path means the workspace itself.
fn resolve_output_path(workspace: &Path, path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        workspace.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Remove everything inside `dir`, keeping `dir` itself.
fn clear_directory(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if fs::symlink_metadata(&path)?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}
