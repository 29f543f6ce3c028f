//! Orchestrator and artifact store interfaces
//!
//! Abstracts the remote services for testability. Provides:
//! - `JobService`: poll, acknowledge, job details and result submission
//! - `ObjectStore`: object fetch and multipart upload
//! - `LocalStore`: directory-backed implementation of both
//!
//! Every call is blocking and has no timeout of its own; bounded execution
//! has to be imposed by the transport behind the trait.

pub mod local;

pub use local::{JobRecord, JobResult, LocalStore};

use std::io::{self, Write};

use pipeline_protocol::ops::{
    AcknowledgeJobRequest, AcknowledgeJobResponse, ArtifactCredentials,
    CompleteMultipartUploadRequest, CreateMultipartUploadRequest, CreateMultipartUploadResponse,
    GetJobDetailsRequest, GetObjectRequest, Job, JobDetails, ObjectMetadata, PollForJobsRequest,
    PutJobFailureResultRequest, PutJobSuccessResultRequest, UploadPartRequest, UploadPartResponse,
};
use pipeline_protocol::{ErrorCode, ServiceError};

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The service answered with an error
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// The request never got an answer
    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Service error code, if the service answered
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            StoreError::Service(e) => Some(e.code),
            _ => None,
        }
    }

    /// True when the failure happened before the service could answer
    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Transport(_) | StoreError::Io(_))
    }
}

/// Pipeline orchestrator interface
pub trait JobService: Send + Sync {
    /// Return at most `max_batch_size` jobs matching the request
    fn poll_for_jobs(&self, request: &PollForJobsRequest) -> Result<Vec<Job>, StoreError>;

    /// Present a job id and its nonce
    fn acknowledge_job(
        &self,
        request: &AcknowledgeJobRequest,
    ) -> Result<AcknowledgeJobResponse, StoreError>;

    /// Re-query a job, including fresh artifact credentials
    fn get_job_details(&self, request: &GetJobDetailsRequest) -> Result<JobDetails, StoreError>;

    fn put_job_success_result(&self, request: &PutJobSuccessResultRequest)
        -> Result<(), StoreError>;

    fn put_job_failure_result(&self, request: &PutJobFailureResultRequest)
        -> Result<(), StoreError>;
}

/// Artifact content store interface
pub trait ObjectStore: Send + Sync {
    /// Stream an object's bytes into `sink`
    fn get_object(
        &self,
        credentials: &ArtifactCredentials,
        request: &GetObjectRequest,
        sink: &mut dyn Write,
    ) -> Result<ObjectMetadata, StoreError>;

    fn create_multipart_upload(
        &self,
        credentials: &ArtifactCredentials,
        request: &CreateMultipartUploadRequest,
    ) -> Result<CreateMultipartUploadResponse, StoreError>;

    fn upload_part(
        &self,
        credentials: &ArtifactCredentials,
        request: &UploadPartRequest,
        body: &[u8],
    ) -> Result<UploadPartResponse, StoreError>;

    fn complete_multipart_upload(
        &self,
        credentials: &ArtifactCredentials,
        request: &CompleteMultipartUploadRequest,
    ) -> Result<(), StoreError>;
}
