//! Chunked Upload Tests
//!
//! Part accounting for the multipart uploader at the default 5 MiB part size.

use std::fs;
use std::sync::Arc;

use pipeline_job_runner::archive::CompressionKind;
use pipeline_job_runner::credentials::{CachedCredentials, JobDetailsSource};
use pipeline_job_runner::job::{ArtifactLocation, CapabilityDescriptor};
use pipeline_job_runner::mock::{FailureConfig, MockOrchestrator};
use pipeline_job_runner::transfer::{MultipartUploader, TransferError, DEFAULT_CHUNK_BYTES};
use pipeline_protocol::ops::{Job, JobData, ServerSideEncryption, StoreKind};
use pipeline_protocol::Operation;
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;

fn mock_with_job() -> MockOrchestrator {
    let mock = MockOrchestrator::new();
    mock.add_job(
        Job {
            id: "job-chunks".to_string(),
            nonce: "n".to_string(),
            data: JobData {
                action_type_id: CapabilityDescriptor::custom("Build", "runner", "1")
                    .action_type_id(),
                input_artifacts: vec![],
                output_artifacts: vec![],
                artifact_credentials: None,
                encryption_key: None,
            },
        },
        "chunks",
    );
    mock
}

fn credentials(mock: &MockOrchestrator) -> CachedCredentials<JobDetailsSource> {
    CachedCredentials::new(JobDetailsSource::new(Arc::new(mock.clone()), "job-chunks"))
}

fn location(key: &str) -> ArtifactLocation {
    ArtifactLocation {
        store: StoreKind::S3,
        bucket: "builds".to_string(),
        object_key: key.to_string(),
    }
}

fn upload(mock: &MockOrchestrator, size: u64) -> Result<Vec<u64>, TransferError> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("artifact.bin");
    let bytes: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    fs::write(&path, &bytes).unwrap();

    let key = format!("artifact-{}.bin", size);
    let receipt = MultipartUploader::new(mock, DEFAULT_CHUNK_BYTES).upload_file(
        &credentials(mock),
        &path,
        &location(&key),
        CompressionKind::None,
        ServerSideEncryption::default(),
    )?;
    assert_eq!(receipt.bytes, size);
    assert_eq!(mock.object("builds", &key).unwrap().bytes, bytes);

    let completed = mock
        .completed_uploads()
        .into_iter()
        .find(|u| u.key == key)
        .unwrap();
    assert_eq!(completed.part_sizes.len() as u32, receipt.parts);
    Ok(completed.part_sizes)
}

// =============================================================================
// Test 1: part count and sizes across the chunk boundary
// =============================================================================

#[test]
fn test_part_accounting_across_boundaries() {
    let mock = mock_with_job();

    for size in [1, 5 * MIB - 1, 5 * MIB, 5 * MIB + 1, 12 * MIB + 7] {
        let parts = upload(&mock, size).unwrap();
        assert_eq!(parts.len() as u64, size.div_ceil(DEFAULT_CHUNK_BYTES), "size {}", size);
        assert_eq!(parts.iter().sum::<u64>(), size);
        assert!(parts[..parts.len() - 1].iter().all(|p| *p == DEFAULT_CHUNK_BYTES));
    }
}

// =============================================================================
// Test 2: one initiate and one complete per upload, parts in order
// =============================================================================

#[test]
fn test_call_sequence_for_three_parts() {
    let mock = mock_with_job();
    upload(&mock, 11 * MIB).unwrap();

    let store_calls: Vec<Operation> = mock
        .calls()
        .into_iter()
        .filter(|op| *op != Operation::GetJobDetails)
        .collect();
    assert_eq!(
        store_calls,
        vec![
            Operation::CreateMultipartUpload,
            Operation::UploadPart,
            Operation::UploadPart,
            Operation::UploadPart,
            Operation::CompleteMultipartUpload,
        ]
    );
    // Credentials were fetched once and then served from the cache
    assert_eq!(mock.credentials_issued(), 1);
}

// =============================================================================
// Test 3: a failed part aborts before completion
// =============================================================================

#[test]
fn test_failed_part_leaves_upload_incomplete() {
    let mock = mock_with_job();
    mock.inject(
        Operation::UploadPart,
        FailureConfig::transport("connection reset").with_fail_count(1),
    );

    let err = upload(&mock, 6 * MIB).unwrap_err();
    assert!(matches!(err, TransferError::Store(_)));
    assert_eq!(mock.call_count(Operation::CompleteMultipartUpload), 0);
    assert!(mock.completed_uploads().is_empty());
}
