//! Job details operation types.
//!
//! Re-querying a job returns its current payload, including freshly issued
//! artifact credentials.

use serde::{Deserialize, Serialize};

use super::poll::JobData;

/// Job details request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobDetailsRequest {
    pub job_id: String,
}

/// Job details response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetails {
    pub id: String,
    pub data: JobData,
}
