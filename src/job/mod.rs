//! Work item model
//!
//! The orchestrator's `Job` as the rest of the pipeline sees it: artifact
//! descriptors, the fencing nonce and the optional encryption descriptor.
//! Per-build state lives in [`JobContext`], which every stage receives as
//! an argument.

mod context;

pub use context::JobContext;

use serde::{Deserialize, Serialize};

use pipeline_protocol::ops::{
    ActionTypeId, Artifact, EncryptionKey, Job, ServerSideEncryption, StoreKind,
};
use pipeline_protocol::{KEY_TYPE_KMS, OWNER_CUSTOM};

/// The (category, owner, provider, version) filter used when polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub category: String,
    pub owner: String,
    pub provider: String,
    pub version: String,
}

impl CapabilityDescriptor {
    /// A capability registered as a custom action
    pub fn custom(
        category: impl Into<String>,
        provider: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            owner: OWNER_CUSTOM.to_string(),
            provider: provider.into(),
            version: version.into(),
        }
    }

    pub fn action_type_id(&self) -> ActionTypeId {
        ActionTypeId {
            category: self.category.clone(),
            owner: self.owner.clone(),
            provider: self.provider.clone(),
            version: self.version.clone(),
        }
    }
}

/// Where an artifact's bytes live. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub store: StoreKind,
    pub bucket: String,
    pub object_key: String,
}

impl From<pipeline_protocol::ops::ArtifactLocation> for ArtifactLocation {
    fn from(location: pipeline_protocol::ops::ArtifactLocation) -> Self {
        Self {
            store: location.store,
            bucket: location.bucket,
            object_key: location.object_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputArtifact {
    pub name: String,
    pub revision: Option<String>,
    pub location: ArtifactLocation,
}

impl From<Artifact> for InputArtifact {
    fn from(artifact: Artifact) -> Self {
        Self {
            name: artifact.name,
            revision: artifact.revision,
            location: artifact.location.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub name: String,
    pub location: ArtifactLocation,
}

impl From<Artifact> for OutputArtifact {
    fn from(artifact: Artifact) -> Self {
        Self {
            name: artifact.name,
            location: artifact.location.into(),
        }
    }
}

/// Key protecting the artifact store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionDescriptor {
    pub key_id: String,
    pub key_kind: String,
}

impl EncryptionDescriptor {
    /// Encryption directive for uploads.
    ///
    /// Only a non-empty key id of kind "KMS" is passed through; anything
    /// else falls back to the store's default managed key.
    pub fn upload_directive(&self) -> ServerSideEncryption {
        if self.key_kind == KEY_TYPE_KMS && !self.key_id.is_empty() {
            ServerSideEncryption {
                kms_key_id: Some(self.key_id.clone()),
            }
        } else {
            ServerSideEncryption::default()
        }
    }
}

impl From<EncryptionKey> for EncryptionDescriptor {
    fn from(key: EncryptionKey) -> Self {
        Self {
            key_id: key.id,
            key_kind: key.key_type,
        }
    }
}

/// One claimed unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    /// Single-use fencing token
    pub nonce: String,
    pub inputs: Vec<InputArtifact>,
    pub outputs: Vec<OutputArtifact>,
    pub encryption: Option<EncryptionDescriptor>,
}

impl WorkItem {
    pub fn upload_encryption(&self) -> ServerSideEncryption {
        self.encryption
            .as_ref()
            .map(EncryptionDescriptor::upload_directive)
            .unwrap_or_default()
    }
}

impl From<Job> for WorkItem {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            nonce: job.nonce,
            inputs: job.data.input_artifacts.into_iter().map(Into::into).collect(),
            outputs: job.data.output_artifacts.into_iter().map(Into::into).collect(),
            encryption: job.data.encryption_key.map(Into::into),
        }
    }
}
