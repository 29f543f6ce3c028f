//! Chunked multipart upload
//!
//! One upload is: initiate, then each chunk in increasing part-number
//! order starting at 1, then complete with the ordered part tags. Parts are
//! sent one at a time.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use pipeline_protocol::ops::{
    CompleteMultipartUploadRequest, CompletedPart, CreateMultipartUploadRequest,
    ServerSideEncryption, UploadPartRequest,
};

use crate::archive::CompressionKind;
use crate::credentials::CredentialProvider;
use crate::job::ArtifactLocation;
use crate::logging::LOG_TAG;
use crate::store::ObjectStore;

use super::TransferError;

/// Default part size: 5 MiB
pub const DEFAULT_CHUNK_BYTES: u64 = 5 * 1024 * 1024;

/// One chunk of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub part_number: u32,
    pub offset: u64,
    pub len: u64,
}

/// Split `total` bytes into parts of `chunk_bytes` (the last may be
/// smaller). An empty file still gets a single empty part, since a
/// multipart upload cannot complete without parts.
pub fn chunk_plan(total: u64, chunk_bytes: u64) -> Vec<ChunkSpec> {
    let chunk_bytes = chunk_bytes.max(1);
    if total == 0 {
        return vec![ChunkSpec {
            part_number: 1,
            offset: 0,
            len: 0,
        }];
    }

    let count = total.div_ceil(chunk_bytes);
    (0..count)
        .map(|i| {
            let offset = i * chunk_bytes;
            ChunkSpec {
                part_number: (i + 1) as u32,
                offset,
                len: chunk_bytes.min(total - offset),
            }
        })
        .collect()
}

/// Upload session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    /// Part tags in part-number order
    pub parts: Vec<CompletedPart>,
}

impl UploadSession {
    pub fn new(upload_id: String, bucket: String, key: String) -> Self {
        Self {
            upload_id,
            bucket,
            key,
            parts: Vec::new(),
        }
    }

    /// Part number the next chunk must use
    pub fn next_part_number(&self) -> u32 {
        self.parts.len() as u32 + 1
    }

    /// Record a chunk's returned tag
    pub fn record_part(&mut self, etag: String) -> u32 {
        let part_number = self.next_part_number();
        self.parts.push(CompletedPart { part_number, etag });
        part_number
    }

    /// Consume the session into its completion request
    pub fn into_complete_request(self) -> CompleteMultipartUploadRequest {
        CompleteMultipartUploadRequest {
            bucket: self.bucket,
            key: self.key,
            upload_id: self.upload_id,
            parts: self.parts,
        }
    }
}

/// What an upload put into the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub bucket: String,
    pub key: String,
    pub bytes: u64,
    pub parts: u32,
    pub kind: CompressionKind,
}

/// Sends files to the store in fixed-size parts
pub struct MultipartUploader<'a> {
    store: &'a dyn ObjectStore,
    chunk_bytes: u64,
}

impl<'a> MultipartUploader<'a> {
    pub fn new(store: &'a dyn ObjectStore, chunk_bytes: u64) -> Self {
        Self {
            store,
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    /// Upload `path` to `location`, labelled with `kind`'s content type.
    pub fn upload_file(
        &self,
        credentials: &dyn CredentialProvider,
        path: &Path,
        location: &ArtifactLocation,
        kind: CompressionKind,
        encryption: ServerSideEncryption,
    ) -> Result<UploadReceipt, TransferError> {
        let mut file = File::open(path)?;
        let total = file.metadata()?.len();

        let created = self.store.create_multipart_upload(
            &credentials.credentials()?.credentials,
            &CreateMultipartUploadRequest {
                bucket: location.bucket.clone(),
                key: location.object_key.clone(),
                content_type: kind.content_type().map(str::to_string),
                encryption,
            },
        )?;
        let mut session = UploadSession::new(
            created.upload_id,
            location.bucket.clone(),
            location.object_key.clone(),
        );

        let mut buf = Vec::new();
        for chunk in chunk_plan(total, self.chunk_bytes) {
            buf.resize(chunk.len as usize, 0);
            file.read_exact(&mut buf)?;

            let response = self.store.upload_part(
                &credentials.credentials()?.credentials,
                &UploadPartRequest {
                    bucket: session.bucket.clone(),
                    key: session.key.clone(),
                    upload_id: session.upload_id.clone(),
                    part_number: session.next_part_number(),
                    content_length: chunk.len,
                },
                &buf,
            )?;
            let part = session.record_part(response.etag);
            tracing::debug!(
                key = %session.key,
                part,
                bytes = chunk.len,
                "{LOG_TAG} uploaded part"
            );
        }

        let parts = session.parts.len() as u32;
        self.store.complete_multipart_upload(
            &credentials.credentials()?.credentials,
            &session.into_complete_request(),
        )?;

        Ok(UploadReceipt {
            bucket: location.bucket.clone(),
            key: location.object_key.clone(),
            bytes: total,
            parts,
            kind,
        })
    }
}
