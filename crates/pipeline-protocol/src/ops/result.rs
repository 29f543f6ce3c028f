//! Result submission types.

use serde::{Deserialize, Serialize};

/// Success result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutJobSuccessResultRequest {
    pub job_id: String,
    pub execution_details: ExecutionDetails,
}

/// Execution details attached to a success result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    /// Human-readable summary.
    pub summary: String,
    /// Identifier of the build execution that processed the job.
    pub external_execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<u8>,
}

/// Failure result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutJobFailureResultRequest {
    pub job_id: String,
    pub failure_details: FailureDetails,
}

/// Failure details attached to a failure result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetails {
    pub failure_type: FailureType,
    pub message: String,
    pub external_execution_id: String,
}

/// Failure type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    /// Generic job failure.
    JobFailed,
    ConfigurationError,
    PermissionError,
    RevisionOutOfSync,
    RevisionUnavailable,
    SystemUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_type_wire_name() {
        let details = FailureDetails {
            failure_type: FailureType::JobFailed,
            message: "boom".to_string(),
            external_execution_id: "exec-1".to_string(),
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["failure_type"], "JOB_FAILED");
    }

    #[test]
    fn test_percent_complete_omitted_when_absent() {
        let details = ExecutionDetails {
            summary: "Finished".to_string(),
            external_execution_id: "exec-1".to_string(),
            percent_complete: None,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert!(json.get("percent_complete").is_none());
    }
}
