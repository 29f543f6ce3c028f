//! Job claim protocol
//!
//! Polls for a single work item matching the runner's capability and claims
//! it by presenting the item's single-use nonce.
//!
//! Claim states: Idle → Polled → Claimed → {Acknowledged | ClaimLost}

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use pipeline_protocol::ops::{AcknowledgeJobRequest, JobStatus, PollForJobsRequest};
use pipeline_protocol::{ErrorCode, QUERY_PARAM_PROJECT};

use crate::job::{CapabilityDescriptor, WorkItem};
use crate::logging::LOG_TAG;
use crate::store::{JobService, StoreError};

/// Batch size for every poll. More than one item per poll is never wanted.
pub const POLL_BATCH_SIZE: u32 = 1;

/// Claim errors
#[derive(Debug, Error)]
pub enum ClaimError {
    /// Polling failed; the next cycle may try again
    #[error("poll failed: {0}")]
    Poll(#[source] StoreError),

    /// The acknowledgment never got a usable answer. The item may or may
    /// not be claimed; this is not a rejection.
    #[error("acknowledge failed for job {job_id}: {source}")]
    Acknowledge {
        job_id: String,
        #[source]
        source: StoreError,
    },

    #[error("poll returned {0} jobs, expected at most one")]
    BatchContract(usize),

    #[error("invalid claim transition: {from} -> {to}")]
    InvalidTransition { from: ClaimState, to: ClaimState },
}

/// Claim protocol states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    Idle,
    Polled,
    Claimed,
    Acknowledged,
    ClaimLost,
}

impl ClaimState {
    pub fn can_transition_to(&self, target: ClaimState) -> bool {
        matches!(
            (self, target),
            (ClaimState::Idle, ClaimState::Polled)
                | (ClaimState::Polled, ClaimState::Claimed)
                | (ClaimState::Claimed, ClaimState::Acknowledged)
                | (ClaimState::Claimed, ClaimState::ClaimLost)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimState::Acknowledged | ClaimState::ClaimLost)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimState::Idle => "idle",
            ClaimState::Polled => "polled",
            ClaimState::Claimed => "claimed",
            ClaimState::Acknowledged => "acknowledged",
            ClaimState::ClaimLost => "claim-lost",
        }
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a claim was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The store answered with a status other than in-progress
    Status(JobStatus),
    /// Another poller already presented the nonce
    NonceConsumed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Status(status) => write!(f, "job status is {}", status),
            RejectReason::NonceConsumed => f.write_str("nonce already consumed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimResult {
    Acknowledged,
    Rejected(RejectReason),
}

impl ClaimResult {
    /// Another poller won; not an error
    pub fn is_race_lost(&self) -> bool {
        matches!(self, ClaimResult::Rejected(RejectReason::NonceConsumed))
    }
}

/// Polls and claims work items for one capability
pub struct JobClaimer {
    service: Arc<dyn JobService>,
    capability: CapabilityDescriptor,
    query_tag: String,
    state: ClaimState,
}

impl JobClaimer {
    pub fn new(
        service: Arc<dyn JobService>,
        capability: CapabilityDescriptor,
        query_tag: impl Into<String>,
    ) -> Self {
        Self {
            service,
            capability,
            query_tag: query_tag.into(),
            state: ClaimState::Idle,
        }
    }

    pub fn state(&self) -> ClaimState {
        self.state
    }

    pub fn capability(&self) -> &CapabilityDescriptor {
        &self.capability
    }

    /// Poll for at most one matching work item.
    ///
    /// Starts a new cycle: whatever happened to the previous item, the
    /// claimer is back to idle before the request goes out.
    pub fn poll(&mut self) -> Result<Option<WorkItem>, ClaimError> {
        if self.state != ClaimState::Idle && !self.state.is_terminal() {
            tracing::warn!(
                state = %self.state,
                "{LOG_TAG} previous work item dropped before its claim finished"
            );
        }
        self.state = ClaimState::Idle;

        let request = PollForJobsRequest {
            action_type_id: self.capability.action_type_id(),
            max_batch_size: POLL_BATCH_SIZE,
            query_param: BTreeMap::from([(
                QUERY_PARAM_PROJECT.to_string(),
                self.query_tag.clone(),
            )]),
        };

        let mut jobs = self.service.poll_for_jobs(&request).map_err(ClaimError::Poll)?;
        if jobs.len() > POLL_BATCH_SIZE as usize {
            return Err(ClaimError::BatchContract(jobs.len()));
        }

        let Some(job) = jobs.pop() else {
            tracing::debug!(query_tag = %self.query_tag, "{LOG_TAG} no jobs available");
            return Ok(None);
        };

        self.transition(ClaimState::Polled)?;
        tracing::info!(job_id = %job.id, "{LOG_TAG} received job");
        Ok(Some(job.into()))
    }

    /// Present the item's id and nonce to the orchestrator.
    pub fn claim(&mut self, item: &WorkItem) -> Result<ClaimResult, ClaimError> {
        self.transition(ClaimState::Claimed)?;

        let request = AcknowledgeJobRequest {
            job_id: item.id.clone(),
            nonce: item.nonce.clone(),
        };

        let status = match self.service.acknowledge_job(&request) {
            Ok(response) => response.status,
            Err(err) if err.code() == Some(ErrorCode::InvalidNonce) => {
                self.transition(ClaimState::ClaimLost)?;
                tracing::info!(job_id = %item.id, "{LOG_TAG} job already claimed by another poller");
                return Ok(ClaimResult::Rejected(RejectReason::NonceConsumed));
            }
            Err(source) => {
                return Err(ClaimError::Acknowledge {
                    job_id: item.id.clone(),
                    source,
                })
            }
        };

        if status != JobStatus::InProgress {
            self.transition(ClaimState::ClaimLost)?;
            tracing::warn!(job_id = %item.id, %status, "{LOG_TAG} claim rejected");
            return Ok(ClaimResult::Rejected(RejectReason::Status(status)));
        }

        self.transition(ClaimState::Acknowledged)?;
        tracing::info!(job_id = %item.id, "{LOG_TAG} acknowledged job");
        Ok(ClaimResult::Acknowledged)
    }

    fn transition(&mut self, to: ClaimState) -> Result<(), ClaimError> {
        if !self.state.can_transition_to(to) {
            return Err(ClaimError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}
