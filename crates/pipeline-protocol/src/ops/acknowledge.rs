//! Acknowledge operation types.
//!
//! Acknowledging presents the job id together with its single-use nonce.

use serde::{Deserialize, Serialize};

/// Acknowledge request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeJobRequest {
    pub job_id: String,
    pub nonce: String,
}

/// Acknowledge response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeJobResponse {
    /// Job status after the acknowledgment.
    pub status: JobStatus,
}

/// Job status as reported by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Created,
    Queued,
    Dispatched,
    /// The only status that means the acknowledgment was accepted.
    InProgress,
    TimedOut,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Dispatched => "dispatched",
            JobStatus::InProgress => "in-progress",
            JobStatus::TimedOut => "timed-out",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Statuses from which a job can still be claimed.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Created | JobStatus::Queued | JobStatus::Dispatched)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::TimedOut | JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&JobStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        let parsed: JobStatus = serde_json::from_str("\"timed-out\"").unwrap();
        assert_eq!(parsed, JobStatus::TimedOut);
    }

    #[test]
    fn test_claimable_statuses() {
        assert!(JobStatus::Queued.is_claimable());
        assert!(!JobStatus::InProgress.is_claimable());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Dispatched.is_terminal());
    }
}
