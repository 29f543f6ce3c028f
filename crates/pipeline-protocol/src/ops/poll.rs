//! Poll operation types.
//!
//! A poll asks the orchestrator for at most one job whose action type matches
//! the runner's capability and whose query parameters match the project tag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Action type filter used when polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTypeId {
    /// Action category (e.g. "Build", "Test").
    pub category: String,
    /// Action owner; always "custom" for self-hosted runners.
    pub owner: String,
    /// Provider name registered with the orchestrator.
    pub provider: String,
    /// Provider version.
    pub version: String,
}

/// Poll request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollForJobsRequest {
    /// Capability filter.
    pub action_type_id: ActionTypeId,
    /// Maximum number of jobs to return. Always 1 for this runner.
    pub max_batch_size: u32,
    /// Free-form query parameters matched against the action configuration.
    #[serde(default)]
    pub query_param: BTreeMap<String, String>,
}

/// A job returned by a poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Orchestrator-assigned job id.
    pub id: String,
    /// Single-use token presented when acknowledging the job.
    pub nonce: String,
    /// Job payload.
    pub data: JobData,
}

/// Job payload: artifacts, credentials and encryption settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    /// Action type the job was created for.
    pub action_type_id: ActionTypeId,
    /// Input artifacts to download before the build.
    #[serde(default)]
    pub input_artifacts: Vec<Artifact>,
    /// Output artifacts expected after the build.
    #[serde(default)]
    pub output_artifacts: Vec<Artifact>,
    /// Temporary credentials for artifact access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_credentials: Option<ArtifactCredentials>,
    /// Encryption key protecting the artifact store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<EncryptionKey>,
}

/// An artifact descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact name as declared in the pipeline.
    pub name: String,
    /// Source revision the artifact was produced from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Where the artifact bytes live.
    pub location: ArtifactLocation,
}

/// Kind of content store an artifact lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    S3,
}

/// Location of an artifact in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    /// Store type.
    #[serde(default)]
    pub store: StoreKind,
    /// Bucket name.
    pub bucket: String,
    /// Object key within the bucket.
    pub object_key: String,
}

/// Temporary session credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl std::fmt::Debug for ArtifactCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .finish()
    }
}

/// Encryption key reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey {
    /// Key id or alias.
    pub id: String,
    /// Key type (e.g. "KMS").
    #[serde(rename = "type")]
    pub key_type: String,
}
