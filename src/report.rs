//! Result reporting
//!
//! Every claimed work item gets exactly one terminal report: success with a
//! fixed summary, or failure carrying the triggering error's message.

use std::sync::Arc;

use thiserror::Error;

use pipeline_protocol::ops::{
    ExecutionDetails, FailureDetails, FailureType, PutJobFailureResultRequest,
    PutJobSuccessResultRequest,
};

use crate::job::JobContext;
use crate::logging::LOG_TAG;
use crate::store::{JobService, StoreError};

/// Summary sent with every successful result
pub const SUCCESS_SUMMARY: &str = "Finished";

#[derive(Debug, Error)]
#[error("failed to report result for job {job_id}: {source}")]
pub struct ReportError {
    pub job_id: String,
    #[source]
    pub source: StoreError,
}

/// How a claimed job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed { message: String },
}

impl JobOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        JobOutcome::Failed {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// Posts terminal results to the orchestrator
pub struct ResultReporter {
    service: Arc<dyn JobService>,
}

impl ResultReporter {
    pub fn new(service: Arc<dyn JobService>) -> Self {
        Self { service }
    }

    pub fn report(&self, ctx: &JobContext, outcome: &JobOutcome) -> Result<(), ReportError> {
        let job_id = ctx.work_item().id.clone();
        let execution_id = ctx.execution_id().to_string();

        let result = match outcome {
            JobOutcome::Succeeded => {
                tracing::info!(%job_id, %execution_id, "{LOG_TAG} reporting success");
                self.service.put_job_success_result(&PutJobSuccessResultRequest {
                    job_id: job_id.clone(),
                    execution_details: ExecutionDetails {
                        summary: SUCCESS_SUMMARY.to_string(),
                        external_execution_id: execution_id,
                        percent_complete: Some(100),
                    },
                })
            }
            JobOutcome::Failed { message } => {
                tracing::info!(%job_id, %execution_id, %message, "{LOG_TAG} reporting failure");
                self.service.put_job_failure_result(&PutJobFailureResultRequest {
                    job_id: job_id.clone(),
                    failure_details: FailureDetails {
                        failure_type: FailureType::JobFailed,
                        message: message.clone(),
                        external_execution_id: execution_id,
                    },
                })
            }
        };

        result.map_err(|source| ReportError { job_id, source })
    }
}
