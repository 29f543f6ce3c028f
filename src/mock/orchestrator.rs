//! Mock orchestrator implementation

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use sha2::{Digest, Sha256};

use pipeline_protocol::ops::{
    AcknowledgeJobRequest, AcknowledgeJobResponse, ArtifactCredentials,
    CompleteMultipartUploadRequest, CreateMultipartUploadRequest, CreateMultipartUploadResponse,
    GetJobDetailsRequest, GetObjectRequest, Job, JobDetails, JobStatus, ObjectMetadata,
    PollForJobsRequest, PutJobFailureResultRequest, PutJobSuccessResultRequest, UploadPartRequest,
    UploadPartResponse,
};
use pipeline_protocol::{ErrorCode, Operation, ServiceError, QUERY_PARAM_PROJECT};

use crate::store::{JobResult, JobService, ObjectStore, StoreError};

use super::failure::{FailureConfig, FailureInjector};
use super::state::{CompletedUpload, MockJob, MockState, MockUpload, RecordedResult, StoredObject};

/// Configurable in-memory orchestrator
#[derive(Debug, Clone, Default)]
pub struct MockOrchestrator {
    state: Arc<Mutex<MockState>>,
    failures: Arc<Mutex<FailureInjector>>,
    /// Every call received, in order
    calls: Arc<Mutex<Vec<Operation>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn etag(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

impl MockOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job for the given project
    pub fn add_job(&self, job: Job, project_name: &str) {
        let query_param =
            BTreeMap::from([(QUERY_PARAM_PROJECT.to_string(), project_name.to_string())]);
        let mut state = lock(&self.state);
        state
            .jobs
            .insert(job.id.clone(), MockJob::new(job, query_param));
    }

    /// Seed an input object
    pub fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: Option<&str>) {
        let mut state = lock(&self.state);
        state.store_object(
            bucket,
            key,
            StoredObject {
                bytes,
                content_type: content_type.map(str::to_string),
                encryption: None,
                last_modified: Utc::now(),
            },
        );
    }

    /// Simulate another worker acknowledging the job first
    pub fn claim_elsewhere(&self, job_id: &str) {
        let mut state = lock(&self.state);
        if let Some(job) = state.get_job_mut(job_id) {
            job.nonce_consumed = true;
            job.transition(JobStatus::InProgress);
        }
    }

    /// Force a job into a status
    pub fn set_job_status(&self, job_id: &str, status: JobStatus) {
        let mut state = lock(&self.state);
        if let Some(job) = state.get_job_mut(job_id) {
            job.transition(status);
        }
    }

    pub fn inject(&self, op: Operation, config: FailureConfig) {
        lock(&self.failures).inject(op, config);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    pub fn calls(&self) -> Vec<Operation> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, op: Operation) -> usize {
        lock(&self.calls).iter().filter(|c| **c == op).count()
    }

    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        lock(&self.state).get_job(job_id).map(|j| j.status)
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        lock(&self.state).get_object(bucket, key).cloned()
    }

    pub fn results(&self) -> Vec<RecordedResult> {
        lock(&self.state).results.clone()
    }

    pub fn completed_uploads(&self) -> Vec<CompletedUpload> {
        lock(&self.state).completed_uploads.clone()
    }

    pub fn credentials_issued(&self) -> u64 {
        lock(&self.state).credentials_issued
    }

    /// Record the call and apply any injected failure
    fn enter(&self, op: Operation) -> Result<(), StoreError> {
        lock(&self.calls).push(op);
        match lock(&self.failures).check(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_credentials(credentials: &ArtifactCredentials) -> Result<(), StoreError> {
        if credentials.access_key_id.is_empty() {
            return Err(ServiceError::new(ErrorCode::AccessDenied, "missing credentials").into());
        }
        Ok(())
    }

    fn record_result(&self, job_id: &str, result: JobResult) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let next = match result {
            JobResult::Success(_) => JobStatus::Succeeded,
            JobResult::Failure(_) => JobStatus::Failed,
        };
        let job = state
            .get_job_mut(job_id)
            .ok_or_else(|| ServiceError::job_not_found(job_id))?;
        if job.status != JobStatus::InProgress {
            return Err(ServiceError::invalid_job_state(job_id, job.status.as_str()).into());
        }
        job.transition(next);
        state.results.push(RecordedResult {
            job_id: job_id.to_string(),
            result,
        });
        Ok(())
    }
}

impl JobService for MockOrchestrator {
    fn poll_for_jobs(&self, request: &PollForJobsRequest) -> Result<Vec<Job>, StoreError> {
        self.enter(Operation::PollForJobs)?;
        let state = lock(&self.state);
        Ok(state
            .jobs
            .values()
            .filter(|j| j.status.is_claimable())
            .filter(|j| j.job.data.action_type_id == request.action_type_id)
            .filter(|j| {
                request
                    .query_param
                    .iter()
                    .all(|(k, v)| j.query_param.get(k) == Some(v))
            })
            .take(request.max_batch_size as usize)
            .map(|j| j.job.clone())
            .collect())
    }

    fn acknowledge_job(
        &self,
        request: &AcknowledgeJobRequest,
    ) -> Result<AcknowledgeJobResponse, StoreError> {
        self.enter(Operation::AcknowledgeJob)?;
        let mut state = lock(&self.state);
        let job = state
            .get_job_mut(&request.job_id)
            .ok_or_else(|| ServiceError::job_not_found(&request.job_id))?;

        if job.nonce_consumed || job.job.nonce != request.nonce {
            return Err(ServiceError::invalid_nonce(&request.job_id).into());
        }
        job.nonce_consumed = true;
        if job.status.is_claimable() {
            job.transition(JobStatus::InProgress);
        }

        Ok(AcknowledgeJobResponse { status: job.status })
    }

    fn get_job_details(&self, request: &GetJobDetailsRequest) -> Result<JobDetails, StoreError> {
        self.enter(Operation::GetJobDetails)?;
        let mut state = lock(&self.state);
        state.credentials_issued += 1;
        let serial = state.credentials_issued;
        let job = state
            .get_job(&request.job_id)
            .ok_or_else(|| ServiceError::job_not_found(&request.job_id))?;

        let mut data = job.job.data.clone();
        data.artifact_credentials = Some(ArtifactCredentials {
            access_key_id: format!("MOCKAKID{:04}", serial),
            secret_access_key: format!("mock-secret-{}", serial),
            session_token: format!("mock-session-{}", serial),
        });
        Ok(JobDetails {
            id: job.job.id.clone(),
            data,
        })
    }

    fn put_job_success_result(
        &self,
        request: &PutJobSuccessResultRequest,
    ) -> Result<(), StoreError> {
        self.enter(Operation::PutJobSuccessResult)?;
        self.record_result(
            &request.job_id,
            JobResult::Success(request.execution_details.clone()),
        )
    }

    fn put_job_failure_result(
        &self,
        request: &PutJobFailureResultRequest,
    ) -> Result<(), StoreError> {
        self.enter(Operation::PutJobFailureResult)?;
        self.record_result(
            &request.job_id,
            JobResult::Failure(request.failure_details.clone()),
        )
    }
}

impl ObjectStore for MockOrchestrator {
    fn get_object(
        &self,
        credentials: &ArtifactCredentials,
        request: &GetObjectRequest,
        sink: &mut dyn Write,
    ) -> Result<ObjectMetadata, StoreError> {
        self.enter(Operation::GetObject)?;
        Self::check_credentials(credentials)?;
        let object = lock(&self.state)
            .get_object(&request.bucket, &request.key)
            .cloned()
            .ok_or_else(|| ServiceError::no_such_key(&request.bucket, &request.key))?;

        sink.write_all(&object.bytes)?;
        Ok(ObjectMetadata {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            content_type: object.content_type,
            content_length: object.bytes.len() as u64,
            last_modified: Some(object.last_modified),
        })
    }

    fn create_multipart_upload(
        &self,
        credentials: &ArtifactCredentials,
        request: &CreateMultipartUploadRequest,
    ) -> Result<CreateMultipartUploadResponse, StoreError> {
        self.enter(Operation::CreateMultipartUpload)?;
        Self::check_credentials(credentials)?;
        let mut state = lock(&self.state);
        let upload_id = state.next_id("upload");
        state.uploads.insert(
            upload_id.clone(),
            MockUpload {
                bucket: request.bucket.clone(),
                key: request.key.clone(),
                content_type: request.content_type.clone(),
                encryption: request.encryption.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(CreateMultipartUploadResponse { upload_id })
    }

    fn upload_part(
        &self,
        credentials: &ArtifactCredentials,
        request: &UploadPartRequest,
        body: &[u8],
    ) -> Result<UploadPartResponse, StoreError> {
        self.enter(Operation::UploadPart)?;
        Self::check_credentials(credentials)?;
        if request.content_length != body.len() as u64 {
            return Err(ServiceError::invalid_request("content length mismatch").into());
        }
        let mut state = lock(&self.state);
        let upload = state
            .uploads
            .get_mut(&request.upload_id)
            .ok_or_else(|| ServiceError::no_such_upload(&request.upload_id))?;
        upload.parts.insert(request.part_number, body.to_vec());
        Ok(UploadPartResponse { etag: etag(body) })
    }

    fn complete_multipart_upload(
        &self,
        credentials: &ArtifactCredentials,
        request: &CompleteMultipartUploadRequest,
    ) -> Result<(), StoreError> {
        self.enter(Operation::CompleteMultipartUpload)?;
        Self::check_credentials(credentials)?;
        let mut state = lock(&self.state);
        let upload = state
            .uploads
            .remove(&request.upload_id)
            .ok_or_else(|| ServiceError::no_such_upload(&request.upload_id))?;

        let mut bytes = Vec::new();
        let mut part_sizes = Vec::new();
        for part in &request.parts {
            let body = upload
                .parts
                .get(&part.part_number)
                .filter(|body| etag(body) == part.etag)
                .ok_or_else(|| ServiceError::invalid_part(&request.upload_id, part.part_number))?;
            bytes.extend_from_slice(body);
            part_sizes.push(body.len() as u64);
        }

        state.store_object(
            &upload.bucket,
            &upload.key,
            StoredObject {
                bytes,
                content_type: upload.content_type.clone(),
                encryption: Some(upload.encryption.clone()),
                last_modified: Utc::now(),
            },
        );
        state.completed_uploads.push(CompletedUpload {
            bucket: upload.bucket,
            key: upload.key,
            content_type: upload.content_type,
            encryption: upload.encryption,
            part_sizes,
        });
        Ok(())
    }
}
