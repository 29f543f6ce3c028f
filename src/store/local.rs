//! Directory-backed orchestrator and artifact store.
//!
//! Lets the runner work end-to-end without a remote backend. Layout:
//! `<root>/jobs/<job_id>.json`, `<root>/objects/<bucket>/<key>`,
//! `<root>/meta/<bucket>/<key>.json`, `<root>/uploads/<upload_id>/`.
//!
//! Features:
//! - Atomic writes via write-to-temp-then-rename
//! - Single-use nonces: a second acknowledgment is rejected with `INVALID_NONCE`
//! - Multipart uploads verified part-by-part against their returned tags

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use pipeline_protocol::ops::{
    AcknowledgeJobRequest, AcknowledgeJobResponse, ArtifactCredentials,
    CompleteMultipartUploadRequest, CreateMultipartUploadRequest, CreateMultipartUploadResponse,
    ExecutionDetails, FailureDetails, GetJobDetailsRequest, GetObjectRequest, Job, JobDetails,
    JobStatus, ObjectMetadata, PollForJobsRequest, PutJobFailureResultRequest,
    PutJobSuccessResultRequest, ServerSideEncryption, UploadPartRequest, UploadPartResponse,
};
use pipeline_protocol::{ErrorCode, ServiceError};

use super::{JobService, ObjectStore, StoreError};

/// Persisted job state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: Job,
    /// Action configuration matched against poll query parameters
    #[serde(default)]
    pub query_param: BTreeMap<String, String>,
    pub status: JobStatus,
    #[serde(default)]
    pub nonce_consumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal result submitted for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum JobResult {
    Success(ExecutionDetails),
    Failure(FailureDetails),
}

/// Metadata kept next to each stored object
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    content_length: u64,
    last_modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encryption: Option<ServerSideEncryption>,
}

/// Persisted multipart upload session
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUpload {
    request: CreateMultipartUploadRequest,
    created_at: DateTime<Utc>,
}

/// Directory-backed implementation of `JobService` and `ObjectStore`.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on job records
    jobs_lock: Mutex<()>,
}

impl LocalStore {
    /// Open (and create if needed) a store at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        for dir in ["jobs", "objects", "meta", "uploads", ".tmp"] {
            fs::create_dir_all(root.join(dir))?;
        }
        Ok(Self {
            root,
            jobs_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Queue a job so that a later poll can return it.
    pub fn enqueue_job(
        &self,
        job: Job,
        query_param: BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        validate_segment(&job.id)?;
        let _guard = self.lock_jobs()?;
        let record = JobRecord {
            job,
            query_param,
            status: JobStatus::Queued,
            nonce_consumed: false,
            result: None,
            updated_at: Utc::now(),
        };
        self.write_json(&self.job_path(&record.job.id), &record)
    }

    /// Read a job record
    pub fn job_record(&self, job_id: &str) -> Result<JobRecord, StoreError> {
        validate_segment(job_id)?;
        let path = self.job_path(job_id);
        if !path.exists() {
            return Err(ServiceError::job_not_found(job_id).into());
        }
        self.read_json(&path)
    }

    /// Store an object directly (seeding input artifacts).
    pub fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        self.write_atomic(&path, bytes)?;
        let meta = StoredMeta {
            content_type: content_type.map(str::to_string),
            content_length: bytes.len() as u64,
            last_modified: Utc::now(),
            encryption: None,
        };
        self.write_json(&self.meta_path(bucket, key)?, &meta)
    }

    /// Read an object's bytes
    pub fn read_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(bucket, key)?;
        if !path.exists() {
            return Err(ServiceError::no_such_key(bucket, key).into());
        }
        Ok(fs::read(path)?)
    }

    /// Content type recorded for an object
    pub fn object_content_type(&self, bucket: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_meta(bucket, key)?.and_then(|m| m.content_type))
    }

    fn lock_jobs(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.jobs_lock
            .lock()
            .map_err(|_| StoreError::Transport("local store lock poisoned".to_string()))
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.root.join("jobs").join(format!("{}.json", job_id))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_segment(bucket)?;
        Ok(self.root.join("objects").join(bucket).join(validate_key(key)?))
    }

    fn meta_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        validate_segment(bucket)?;
        let mut path = self.root.join("meta").join(bucket).join(validate_key(key)?);
        let file_name = format!(
            "{}.json",
            path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        );
        path.set_file_name(file_name);
        Ok(path)
    }

    fn upload_dir(&self, upload_id: &str) -> Result<PathBuf, StoreError> {
        validate_segment(upload_id)?;
        Ok(self.root.join("uploads").join(upload_id))
    }

    fn part_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{:05}", part_number))
    }

    fn read_meta(&self, bucket: &str, key: &str) -> Result<Option<StoredMeta>, StoreError> {
        let path = self.meta_path(bucket, key)?;
        if !path.exists() {
            return Ok(None);
        }
        self.read_json(&path).map(Some)
    }

    fn load_upload(&self, upload_id: &str) -> Result<(PathBuf, StoredUpload), StoreError> {
        let dir = self.upload_dir(upload_id)?;
        let session_path = dir.join("session.json");
        if !session_path.exists() {
            return Err(ServiceError::no_such_upload(upload_id).into());
        }
        let upload = self.read_json(&session_path)?;
        Ok((dir, upload))
    }

    fn temp_path(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        self.root.join(".tmp").join(format!(
            ".tmp.{}.{}.{:08x}",
            std::process::id(),
            nanos,
            rand::random::<u32>()
        ))
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.temp_path();
        let result = (|| -> io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        Ok(result?)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value)?;
        self.write_atomic(path, &json)
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, StoreError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn job_records(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(self.root.join("jobs"))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();
        paths.iter().map(|p| self.read_json(p)).collect()
    }
}

fn check_credentials(credentials: &ArtifactCredentials) -> Result<(), StoreError> {
    if credentials.access_key_id.is_empty() || credentials.session_token.is_empty() {
        return Err(ServiceError::new(ErrorCode::AccessDenied, "missing session credentials").into());
    }
    Ok(())
}

/// Bucket names, job ids and upload ids are single path segments.
fn validate_segment(segment: &str) -> Result<(), StoreError> {
    let bad = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\');
    if bad {
        return Err(ServiceError::invalid_request(format!("invalid name: {:?}", segment)).into());
    }
    Ok(())
}

/// Object keys may contain `/` but must stay inside the bucket.
fn validate_key(key: &str) -> Result<PathBuf, StoreError> {
    let invalid = || -> StoreError {
        ServiceError::invalid_request(format!("invalid object key: {:?}", key)).into()
    };
    if key.is_empty() || key.starts_with('/') {
        return Err(invalid());
    }
    let mut path = PathBuf::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => path.push(part),
            _ => return Err(invalid()),
        }
    }
    Ok(path)
}

/// Tag returned for an uploaded part
fn part_etag(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Generate a unique upload ID
fn generate_upload_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let random: u64 = rand::random();
    format!("upload-{:x}-{:016x}", timestamp, random)
}

fn random_token(prefix: &str) -> String {
    format!("{}{:016X}{:016X}", prefix, rand::random::<u64>(), rand::random::<u64>())
}

impl JobService for LocalStore {
    fn poll_for_jobs(&self, request: &PollForJobsRequest) -> Result<Vec<Job>, StoreError> {
        let _guard = self.lock_jobs()?;
        let mut jobs = Vec::new();

        for mut record in self.job_records()? {
            if jobs.len() >= request.max_batch_size as usize {
                break;
            }
            let matches = record.status.is_claimable()
                && record.job.data.action_type_id == request.action_type_id
                && request
                    .query_param
                    .iter()
                    .all(|(k, v)| record.query_param.get(k) == Some(v));
            if !matches {
                continue;
            }

            if record.status != JobStatus::Dispatched {
                record.status = JobStatus::Dispatched;
                record.updated_at = Utc::now();
                self.write_json(&self.job_path(&record.job.id), &record)?;
            }
            jobs.push(record.job);
        }

        Ok(jobs)
    }

    fn acknowledge_job(
        &self,
        request: &AcknowledgeJobRequest,
    ) -> Result<AcknowledgeJobResponse, StoreError> {
        let _guard = self.lock_jobs()?;
        let mut record = self.job_record(&request.job_id)?;

        if record.nonce_consumed || record.job.nonce != request.nonce {
            return Err(ServiceError::invalid_nonce(&request.job_id).into());
        }

        record.nonce_consumed = true;
        if record.status.is_claimable() {
            record.status = JobStatus::InProgress;
        }
        record.updated_at = Utc::now();
        self.write_json(&self.job_path(&request.job_id), &record)?;

        Ok(AcknowledgeJobResponse {
            status: record.status,
        })
    }

    fn get_job_details(&self, request: &GetJobDetailsRequest) -> Result<JobDetails, StoreError> {
        let record = self.job_record(&request.job_id)?;
        let mut data = record.job.data;
        data.artifact_credentials = Some(ArtifactCredentials {
            access_key_id: random_token("LOCAL"),
            secret_access_key: random_token(""),
            session_token: random_token("session-"),
        });
        Ok(JobDetails {
            id: record.job.id,
            data,
        })
    }

    fn put_job_success_result(
        &self,
        request: &PutJobSuccessResultRequest,
    ) -> Result<(), StoreError> {
        let _guard = self.lock_jobs()?;
        let mut record = self.job_record(&request.job_id)?;
        if record.status != JobStatus::InProgress {
            return Err(ServiceError::invalid_job_state(&request.job_id, record.status.as_str()).into());
        }
        record.status = JobStatus::Succeeded;
        record.result = Some(JobResult::Success(request.execution_details.clone()));
        record.updated_at = Utc::now();
        self.write_json(&self.job_path(&request.job_id), &record)
    }

    fn put_job_failure_result(
        &self,
        request: &PutJobFailureResultRequest,
    ) -> Result<(), StoreError> {
        let _guard = self.lock_jobs()?;
        let mut record = self.job_record(&request.job_id)?;
        if record.status != JobStatus::InProgress {
            return Err(ServiceError::invalid_job_state(&request.job_id, record.status.as_str()).into());
        }
        record.status = JobStatus::Failed;
        record.result = Some(JobResult::Failure(request.failure_details.clone()));
        record.updated_at = Utc::now();
        self.write_json(&self.job_path(&request.job_id), &record)
    }
}

impl ObjectStore for LocalStore {
    fn get_object(
        &self,
        credentials: &ArtifactCredentials,
        request: &GetObjectRequest,
        sink: &mut dyn Write,
    ) -> Result<ObjectMetadata, StoreError> {
        check_credentials(credentials)?;
        let path = self.object_path(&request.bucket, &request.key)?;
        if !path.exists() {
            return Err(ServiceError::no_such_key(&request.bucket, &request.key).into());
        }

        let mut file = File::open(&path)?;
        let copied = io::copy(&mut file, sink)?;
        let meta = self.read_meta(&request.bucket, &request.key)?;

        Ok(ObjectMetadata {
            bucket: request.bucket.clone(),
            key: request.key.clone(),
            content_type: meta.as_ref().and_then(|m| m.content_type.clone()),
            content_length: copied,
            last_modified: meta.map(|m| m.last_modified),
        })
    }

    fn create_multipart_upload(
        &self,
        credentials: &ArtifactCredentials,
        request: &CreateMultipartUploadRequest,
    ) -> Result<CreateMultipartUploadResponse, StoreError> {
        check_credentials(credentials)?;
        // Validate the destination up front
        self.object_path(&request.bucket, &request.key)?;

        let upload_id = generate_upload_id();
        let dir = self.upload_dir(&upload_id)?;
        fs::create_dir_all(&dir)?;
        self.write_json(
            &dir.join("session.json"),
            &StoredUpload {
                request: request.clone(),
                created_at: Utc::now(),
            },
        )?;

        Ok(CreateMultipartUploadResponse { upload_id })
    }

    fn upload_part(
        &self,
        credentials: &ArtifactCredentials,
        request: &UploadPartRequest,
        body: &[u8],
    ) -> Result<UploadPartResponse, StoreError> {
        check_credentials(credentials)?;
        let (dir, upload) = self.load_upload(&request.upload_id)?;

        if upload.request.bucket != request.bucket || upload.request.key != request.key {
            return Err(ServiceError::invalid_request("part does not match upload destination").into());
        }
        if request.part_number == 0 {
            return Err(ServiceError::invalid_request("part numbers start at 1").into());
        }
        if request.content_length != body.len() as u64 {
            return Err(ServiceError::invalid_request(format!(
                "content length {} does not match body of {} bytes",
                request.content_length,
                body.len()
            ))
            .into());
        }

        self.write_atomic(&Self::part_path(&dir, request.part_number), body)?;
        Ok(UploadPartResponse {
            etag: part_etag(body),
        })
    }

    fn complete_multipart_upload(
        &self,
        credentials: &ArtifactCredentials,
        request: &CompleteMultipartUploadRequest,
    ) -> Result<(), StoreError> {
        check_credentials(credentials)?;
        let (dir, upload) = self.load_upload(&request.upload_id)?;

        if request.parts.is_empty() {
            return Err(ServiceError::invalid_request("no parts to complete").into());
        }
        if request.parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(ServiceError::invalid_request("parts must be in ascending order").into());
        }

        let temp_path = self.temp_path();
        let mut out = File::create(&temp_path)?;
        let mut total = 0u64;
        for part in &request.parts {
            let part_path = Self::part_path(&dir, part.part_number);
            let bytes = match fs::read(&part_path) {
                Ok(bytes) if part_etag(&bytes) == part.etag => bytes,
                _ => {
                    let _ = fs::remove_file(&temp_path);
                    return Err(ServiceError::invalid_part(&request.upload_id, part.part_number).into());
                }
            };
            out.write_all(&bytes)?;
            total += bytes.len() as u64;
        }
        out.sync_all()?;
        drop(out);

        let object_path = self.object_path(&upload.request.bucket, &upload.request.key)?;
        if let Some(parent) = object_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&temp_path, &object_path)?;

        let meta = StoredMeta {
            content_type: upload.request.content_type.clone(),
            content_length: total,
            last_modified: Utc::now(),
            encryption: Some(upload.request.encryption.clone()),
        };
        self.write_json(&self.meta_path(&upload.request.bucket, &upload.request.key)?, &meta)?;

        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_protocol::ops::{ActionTypeId, CompletedPart, JobData};
    use tempfile::TempDir;

    fn action_type() -> ActionTypeId {
        ActionTypeId {
            category: "Build".to_string(),
            owner: "custom".to_string(),
            provider: "runner".to_string(),
            version: "1".to_string(),
        }
    }

    fn make_job(id: &str) -> Job {
        Job {
            id: id.to_string(),
            nonce: format!("nonce-{}", id),
            data: JobData {
                action_type_id: action_type(),
                input_artifacts: vec![],
                output_artifacts: vec![],
                artifact_credentials: None,
                encryption_key: None,
            },
        }
    }

    fn project(name: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("ProjectName".to_string(), name.to_string())])
    }

    fn poll_request(project_name: &str) -> PollForJobsRequest {
        PollForJobsRequest {
            action_type_id: action_type(),
            max_batch_size: 1,
            query_param: project(project_name),
        }
    }

    fn credentials() -> ArtifactCredentials {
        ArtifactCredentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
        }
    }

    #[test]
    fn test_poll_respects_batch_size_and_query() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.enqueue_job(make_job("job-a"), project("app")).unwrap();
        store.enqueue_job(make_job("job-b"), project("app")).unwrap();
        store.enqueue_job(make_job("job-c"), project("other")).unwrap();

        let jobs = store.poll_for_jobs(&poll_request("app")).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "job-a");

        assert!(store.poll_for_jobs(&poll_request("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_acknowledge_consumes_nonce() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.enqueue_job(make_job("job-a"), project("app")).unwrap();

        let request = AcknowledgeJobRequest {
            job_id: "job-a".to_string(),
            nonce: "nonce-job-a".to_string(),
        };
        let response = store.acknowledge_job(&request).unwrap();
        assert_eq!(response.status, JobStatus::InProgress);

        let err = store.acknowledge_job(&request).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidNonce));

        // An in-progress job is no longer offered
        assert!(store.poll_for_jobs(&poll_request("app")).unwrap().is_empty());
    }

    #[test]
    fn test_acknowledge_wrong_nonce() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.enqueue_job(make_job("job-a"), project("app")).unwrap();

        let err = store
            .acknowledge_job(&AcknowledgeJobRequest {
                job_id: "job-a".to_string(),
                nonce: "forged".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidNonce));
    }

    #[test]
    fn test_job_details_issue_fresh_credentials() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.enqueue_job(make_job("job-a"), project("app")).unwrap();

        let request = GetJobDetailsRequest {
            job_id: "job-a".to_string(),
        };
        let first = store.get_job_details(&request).unwrap();
        let second = store.get_job_details(&request).unwrap();

        let first = first.data.artifact_credentials.unwrap();
        let second = second.data.artifact_credentials.unwrap();
        assert_ne!(first.access_key_id, second.access_key_id);
    }

    #[test]
    fn test_results_require_in_progress() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store.enqueue_job(make_job("job-a"), project("app")).unwrap();

        let success = PutJobSuccessResultRequest {
            job_id: "job-a".to_string(),
            execution_details: ExecutionDetails {
                summary: "Finished".to_string(),
                external_execution_id: "exec-1".to_string(),
                percent_complete: None,
            },
        };
        let err = store.put_job_success_result(&success).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidJobState));

        store
            .acknowledge_job(&AcknowledgeJobRequest {
                job_id: "job-a".to_string(),
                nonce: "nonce-job-a".to_string(),
            })
            .unwrap();
        store.put_job_success_result(&success).unwrap();

        let record = store.job_record("job-a").unwrap();
        assert_eq!(record.status, JobStatus::Succeeded);
        assert!(matches!(record.result, Some(JobResult::Success(_))));
    }

    #[test]
    fn test_get_object_round_trip_with_metadata() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        store
            .put_object("artifacts", "in/source.zip", b"PK-bytes", Some("application/zip"))
            .unwrap();

        let mut sink = Vec::new();
        let meta = store
            .get_object(
                &credentials(),
                &GetObjectRequest {
                    bucket: "artifacts".to_string(),
                    key: "in/source.zip".to_string(),
                },
                &mut sink,
            )
            .unwrap();

        assert_eq!(sink, b"PK-bytes");
        assert_eq!(meta.content_type.as_deref(), Some("application/zip"));
        assert_eq!(meta.content_length, 8);
    }

    #[test]
    fn test_get_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let err = store
            .get_object(
                &credentials(),
                &GetObjectRequest {
                    bucket: "artifacts".to_string(),
                    key: "missing".to_string(),
                },
                &mut Vec::new(),
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NoSuchKey));
    }

    #[test]
    fn test_keys_cannot_escape_bucket() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let err = store.put_object("artifacts", "../../etc/passwd", b"x", None).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
        let err = store.put_object("..", "key", b"x", None).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
    }

    #[test]
    fn test_empty_credentials_denied() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let empty = ArtifactCredentials {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: String::new(),
        };

        let err = store
            .create_multipart_upload(
                &empty,
                &CreateMultipartUploadRequest {
                    bucket: "out".to_string(),
                    key: "k".to_string(),
                    content_type: None,
                    encryption: ServerSideEncryption::default(),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::AccessDenied));
    }

    #[test]
    fn test_multipart_upload_assembles_parts_in_order() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let creds = credentials();

        let created = store
            .create_multipart_upload(
                &creds,
                &CreateMultipartUploadRequest {
                    bucket: "out".to_string(),
                    key: "build/out.zip".to_string(),
                    content_type: Some("application/zip".to_string()),
                    encryption: ServerSideEncryption {
                        kms_key_id: Some("key-1".to_string()),
                    },
                },
            )
            .unwrap();

        let mut parts = Vec::new();
        for (number, body) in [(1u32, &b"hello "[..]), (2, &b"world"[..])] {
            let response = store
                .upload_part(
                    &creds,
                    &UploadPartRequest {
                        bucket: "out".to_string(),
                        key: "build/out.zip".to_string(),
                        upload_id: created.upload_id.clone(),
                        part_number: number,
                        content_length: body.len() as u64,
                    },
                    body,
                )
                .unwrap();
            parts.push(CompletedPart {
                part_number: number,
                etag: response.etag,
            });
        }

        store
            .complete_multipart_upload(
                &creds,
                &CompleteMultipartUploadRequest {
                    bucket: "out".to_string(),
                    key: "build/out.zip".to_string(),
                    upload_id: created.upload_id.clone(),
                    parts,
                },
            )
            .unwrap();

        assert_eq!(store.read_object("out", "build/out.zip").unwrap(), b"hello world");
        assert_eq!(
            store.object_content_type("out", "build/out.zip").unwrap().as_deref(),
            Some("application/zip")
        );
        assert!(!dir.path().join("uploads").join(&created.upload_id).exists());
    }

    #[test]
    fn test_complete_rejects_wrong_tag() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let creds = credentials();

        let created = store
            .create_multipart_upload(
                &creds,
                &CreateMultipartUploadRequest {
                    bucket: "out".to_string(),
                    key: "k".to_string(),
                    content_type: None,
                    encryption: ServerSideEncryption::default(),
                },
            )
            .unwrap();
        store
            .upload_part(
                &creds,
                &UploadPartRequest {
                    bucket: "out".to_string(),
                    key: "k".to_string(),
                    upload_id: created.upload_id.clone(),
                    part_number: 1,
                    content_length: 3,
                },
                b"abc",
            )
            .unwrap();

        let err = store
            .complete_multipart_upload(
                &creds,
                &CompleteMultipartUploadRequest {
                    bucket: "out".to_string(),
                    key: "k".to_string(),
                    upload_id: created.upload_id,
                    parts: vec![CompletedPart {
                        part_number: 1,
                        etag: "bogus".to_string(),
                    }],
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidPart));
    }
}
