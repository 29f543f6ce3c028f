//! Operation-specific types.

pub mod acknowledge;
pub mod details;
pub mod object;
pub mod poll;
pub mod result;

pub use acknowledge::{AcknowledgeJobRequest, AcknowledgeJobResponse, JobStatus};
pub use details::{GetJobDetailsRequest, JobDetails};
pub use object::{
    CompleteMultipartUploadRequest, CompletedPart, CreateMultipartUploadRequest,
    CreateMultipartUploadResponse, GetObjectRequest, ObjectMetadata, ServerSideEncryption,
    UploadPartRequest, UploadPartResponse,
};
pub use poll::{
    ActionTypeId, Artifact, ArtifactCredentials, ArtifactLocation, EncryptionKey, Job, JobData,
    PollForJobsRequest, StoreKind,
};
pub use result::{
    ExecutionDetails, FailureDetails, FailureType, PutJobFailureResultRequest,
    PutJobSuccessResultRequest,
};

/// Remote operations, used for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PollForJobs,
    AcknowledgeJob,
    GetJobDetails,
    PutJobSuccessResult,
    PutJobFailureResult,
    GetObject,
    CreateMultipartUpload,
    UploadPart,
    CompleteMultipartUpload,
}

impl Operation {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::PollForJobs => "poll_for_jobs",
            Operation::AcknowledgeJob => "acknowledge_job",
            Operation::GetJobDetails => "get_job_details",
            Operation::PutJobSuccessResult => "put_job_success_result",
            Operation::PutJobFailureResult => "put_job_failure_result",
            Operation::GetObject => "get_object",
            Operation::CreateMultipartUpload => "create_multipart_upload",
            Operation::UploadPart => "upload_part",
            Operation::CompleteMultipartUpload => "complete_multipart_upload",
        }
    }

    /// Whether the operation targets the artifact store rather than the orchestrator.
    pub fn is_store_operation(&self) -> bool {
        matches!(
            self,
            Operation::GetObject
                | Operation::CreateMultipartUpload
                | Operation::UploadPart
                | Operation::CompleteMultipartUpload
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
