//! Error types returned by the orchestrator and the artifact store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes returned in service error responses.
///
/// These codes are stable and used for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request or invalid field values.
    InvalidRequest,
    /// The nonce was already consumed or does not belong to the job.
    InvalidNonce,
    /// No job with the given id exists.
    JobNotFound,
    /// The job is not in a state that accepts the request.
    InvalidJobState,
    /// The bucket does not exist.
    NoSuchBucket,
    /// The object key does not exist in the bucket.
    NoSuchKey,
    /// The multipart upload id is unknown or already completed.
    NoSuchUpload,
    /// A completed part list references a missing part or a wrong tag.
    InvalidPart,
    /// The presented credentials are not valid for the request.
    AccessDenied,
}

impl ErrorCode {
    /// Returns the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidNonce => "INVALID_NONCE",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::InvalidJobState => "INVALID_JOB_STATE",
            Self::NoSuchBucket => "NO_SUCH_BUCKET",
            Self::NoSuchKey => "NO_SUCH_KEY",
            Self::NoSuchUpload => "NO_SUCH_UPLOAD",
            Self::InvalidPart => "INVALID_PART",
            Self::AccessDenied => "ACCESS_DENIED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service error response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    /// Error code from the registry.
    pub code: ErrorCode,
    /// Human-readable, single-line error message.
    pub message: String,
    /// Optional machine-readable details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ServiceError {
    /// Create a new service error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new service error with additional data.
    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create an INVALID_REQUEST error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Create an INVALID_NONCE error.
    pub fn invalid_nonce(job_id: &str) -> Self {
        Self::with_data(
            ErrorCode::InvalidNonce,
            format!("nonce for job '{}' is invalid or already consumed", job_id),
            serde_json::json!({ "job_id": job_id }),
        )
    }

    /// Create a JOB_NOT_FOUND error.
    pub fn job_not_found(job_id: &str) -> Self {
        Self::with_data(
            ErrorCode::JobNotFound,
            format!("job '{}' not found", job_id),
            serde_json::json!({ "job_id": job_id }),
        )
    }

    /// Create an INVALID_JOB_STATE error.
    pub fn invalid_job_state(job_id: &str, state: &str) -> Self {
        Self::with_data(
            ErrorCode::InvalidJobState,
            format!("job '{}' is in state {}", job_id, state),
            serde_json::json!({ "job_id": job_id, "state": state }),
        )
    }

    /// Create a NO_SUCH_KEY error.
    pub fn no_such_key(bucket: &str, key: &str) -> Self {
        Self::with_data(
            ErrorCode::NoSuchKey,
            format!("object '{}' not found in bucket '{}'", key, bucket),
            serde_json::json!({ "bucket": bucket, "key": key }),
        )
    }

    /// Create a NO_SUCH_UPLOAD error.
    pub fn no_such_upload(upload_id: &str) -> Self {
        Self::with_data(
            ErrorCode::NoSuchUpload,
            format!("upload '{}' does not exist", upload_id),
            serde_json::json!({ "upload_id": upload_id }),
        )
    }

    /// Create an INVALID_PART error.
    pub fn invalid_part(upload_id: &str, part_number: u32) -> Self {
        Self::with_data(
            ErrorCode::InvalidPart,
            format!("part {} of upload '{}' is missing or has a different tag", part_number, upload_id),
            serde_json::json!({ "upload_id": upload_id, "part_number": part_number }),
        )
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::InvalidNonce).unwrap();
        assert_eq!(json, "\"INVALID_NONCE\"");
        assert_eq!(ErrorCode::InvalidNonce.as_str(), "INVALID_NONCE");
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::invalid_nonce("job-1");
        assert_eq!(err.code, ErrorCode::InvalidNonce);
        assert!(err.to_string().starts_with("INVALID_NONCE: "));
        assert_eq!(err.data.unwrap()["job_id"], "job-1");
    }
}
