//! Artifact store operation types.
//!
//! Object fetch plus the three-call multipart upload: create, upload part,
//! complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object fetch request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
}

/// Metadata returned alongside object bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub content_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Server-side encryption directive.
///
/// Always a managed-key directive; `kms_key_id` selects an explicit key,
/// `None` lets the store use its default managed key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSideEncryption {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
}

/// Multipart upload initiation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub encryption: ServerSideEncryption,
}

/// Multipart upload initiation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMultipartUploadResponse {
    pub upload_id: String,
}

/// Part upload payload header. The part bytes travel separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPartRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    /// 1-based part number.
    pub part_number: u32,
    pub content_length: u64,
}

/// Part upload response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPartResponse {
    pub etag: String,
}

/// A completed part reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Multipart upload completion payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    /// Parts in ascending part-number order.
    pub parts: Vec<CompletedPart>,
}
