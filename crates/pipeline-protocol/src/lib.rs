//! Pipeline Protocol Types
//!
//! Defines the request/response payloads exchanged with the pipeline
//! orchestrator (poll, acknowledge, job details, result submission) and with
//! the artifact content store (object fetch, multipart upload).

pub mod error;
pub mod ops;

pub use error::{ErrorCode, ServiceError};
pub use ops::Operation;

/// Owner value for custom (self-hosted) actions.
pub const OWNER_CUSTOM: &str = "custom";

/// Query parameter key carrying the project tag when polling.
pub const QUERY_PARAM_PROJECT: &str = "ProjectName";

/// Encryption key type that selects an explicit managed key.
pub const KEY_TYPE_KMS: &str = "KMS";
