//! Credential fetch by re-querying the job

use std::sync::Arc;

use pipeline_protocol::ops::{ArtifactCredentials, GetJobDetailsRequest};

use super::{CredentialError, CredentialSource};
use crate::store::JobService;

/// Fetches artifact credentials from the job's current details.
pub struct JobDetailsSource {
    service: Arc<dyn JobService>,
    job_id: String,
}

impl JobDetailsSource {
    pub fn new(service: Arc<dyn JobService>, job_id: impl Into<String>) -> Self {
        Self {
            service,
            job_id: job_id.into(),
        }
    }
}

impl CredentialSource for JobDetailsSource {
    fn fetch(&self) -> Result<ArtifactCredentials, CredentialError> {
        let details = self.service.get_job_details(&GetJobDetailsRequest {
            job_id: self.job_id.clone(),
        })?;
        details
            .data
            .artifact_credentials
            .ok_or_else(|| CredentialError::Missing {
                job_id: self.job_id.clone(),
            })
    }
}
