//! Mock orchestrator state
//!
//! Jobs, stored objects, in-flight multipart uploads and submitted results.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use pipeline_protocol::ops::{Job, JobStatus, ServerSideEncryption};

use crate::store::JobResult;

/// A job as the mock orchestrator tracks it
#[derive(Debug, Clone)]
pub struct MockJob {
    pub job: Job,
    /// Action configuration matched against poll query parameters
    pub query_param: BTreeMap<String, String>,
    pub status: JobStatus,
    pub nonce_consumed: bool,
    /// Status history for assertions
    pub history: Vec<(JobStatus, DateTime<Utc>)>,
}

impl MockJob {
    pub fn new(job: Job, query_param: BTreeMap<String, String>) -> Self {
        Self {
            job,
            query_param,
            status: JobStatus::Queued,
            nonce_consumed: false,
            history: vec![(JobStatus::Queued, Utc::now())],
        }
    }

    /// Transition to a new status
    pub fn transition(&mut self, status: JobStatus) {
        self.status = status;
        self.history.push((status, Utc::now()));
    }
}

/// A stored object
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub encryption: Option<ServerSideEncryption>,
    pub last_modified: DateTime<Utc>,
}

/// An in-flight multipart upload
#[derive(Debug, Clone)]
pub struct MockUpload {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<String>,
    pub encryption: ServerSideEncryption,
    pub parts: BTreeMap<u32, Vec<u8>>,
}

/// A finished multipart upload, kept for assertions
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedUpload {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<String>,
    pub encryption: ServerSideEncryption,
    /// Size of each part in part-number order
    pub part_sizes: Vec<u64>,
}

/// Result submitted for a job
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedResult {
    pub job_id: String,
    pub result: JobResult,
}

/// Mock orchestrator state container
#[derive(Debug, Default)]
pub struct MockState {
    pub jobs: BTreeMap<String, MockJob>,
    pub objects: HashMap<(String, String), StoredObject>,
    pub uploads: HashMap<String, MockUpload>,
    pub completed_uploads: Vec<CompletedUpload>,
    pub results: Vec<RecordedResult>,
    /// Number of credential sets handed out by job details
    pub credentials_issued: u64,
    id_counter: u64,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a unique ID
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.id_counter += 1;
        format!("{}-{:08x}", prefix, self.id_counter)
    }

    pub fn get_job(&self, job_id: &str) -> Option<&MockJob> {
        self.jobs.get(job_id)
    }

    pub fn get_job_mut(&mut self, job_id: &str) -> Option<&mut MockJob> {
        self.jobs.get_mut(job_id)
    }

    pub fn get_object(&self, bucket: &str, key: &str) -> Option<&StoredObject> {
        self.objects.get(&(bucket.to_string(), key.to_string()))
    }

    pub fn store_object(&mut self, bucket: &str, key: &str, object: StoredObject) {
        self.objects.insert((bucket.to_string(), key.to_string()), object);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_protocol::ops::{ActionTypeId, JobData};

    fn job() -> Job {
        Job {
            id: "job-001".to_string(),
            nonce: "n".to_string(),
            data: JobData {
                action_type_id: ActionTypeId {
                    category: "Build".to_string(),
                    owner: "custom".to_string(),
                    provider: "p".to_string(),
                    version: "1".to_string(),
                },
                input_artifacts: vec![],
                output_artifacts: vec![],
                artifact_credentials: None,
                encryption_key: None,
            },
        }
    }

    #[test]
    fn test_job_transition() {
        let mut mock_job = MockJob::new(job(), BTreeMap::new());
        assert_eq!(mock_job.status, JobStatus::Queued);

        mock_job.transition(JobStatus::InProgress);
        mock_job.transition(JobStatus::Succeeded);
        assert_eq!(mock_job.history.len(), 3);
        assert!(mock_job.status.is_terminal());
    }

    #[test]
    fn test_next_id_unique() {
        let mut state = MockState::new();
        assert_ne!(state.next_id("upload"), state.next_id("upload"));
    }
}
