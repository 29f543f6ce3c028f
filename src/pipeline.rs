//! Job pipeline
//!
//! One cycle: poll → claim → download inputs → build → upload outputs →
//! report. The report runs for every acknowledged work item, whatever
//! happened in the stages before it; transfer and build failures become a
//! failure report instead of an error from the cycle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::claim::{ClaimError, ClaimResult, JobClaimer, RejectReason};
use crate::config::ConfigError;
use crate::credentials::{CachedCredentials, JobDetailsSource};
use crate::job::{CapabilityDescriptor, JobContext, WorkItem};
use crate::logging::LOG_TAG;
use crate::report::{JobOutcome, ReportError, ResultReporter};
use crate::signal::SignalState;
use crate::step::{BuildStep, StepError};
use crate::store::{JobService, ObjectStore, StoreError};
use crate::transfer::{ArtifactTransfer, TransferError, TransferOptions, UploadReceipt};

use pipeline_protocol::ops::JobStatus;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error("claim rejected for job {job_id}: status is {status}")]
    ClaimRejected { job_id: String, status: JobStatus },

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Build(#[from] StepError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 1,
            PipelineError::Claim(ClaimError::Poll(_)) => 20,
            PipelineError::Claim(_) => 21,
            PipelineError::ClaimRejected { .. } => 21,
            PipelineError::Transfer(_) => 30,
            PipelineError::Archive(_) => 31,
            PipelineError::Build(_) => 40,
            PipelineError::Report(_) => 50,
            PipelineError::Store(_) => 20,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// How one cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to do
    Idle,
    /// Another poller acknowledged the item first
    RaceLost { job_id: String },
    /// The item was processed and its result reported
    Completed {
        job_id: String,
        execution_id: String,
        outcome: JobOutcome,
        uploads: usize,
    },
}

/// Runner settings
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub capability: CapabilityDescriptor,
    pub query_tag: String,
    pub project_name: String,
    pub workspace: PathBuf,
    pub transfer: TransferOptions,
}

/// Drives poll/claim/transfer/report cycles for one capability
pub struct JobRunner {
    service: Arc<dyn JobService>,
    claimer: JobClaimer,
    transfer: ArtifactTransfer,
    reporter: ResultReporter,
    project_name: String,
    workspace: PathBuf,
    signals: Option<Arc<SignalState>>,
}

impl JobRunner {
    pub fn new(
        service: Arc<dyn JobService>,
        store: Arc<dyn ObjectStore>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            claimer: JobClaimer::new(Arc::clone(&service), options.capability, options.query_tag),
            transfer: ArtifactTransfer::new(store, options.transfer),
            reporter: ResultReporter::new(Arc::clone(&service)),
            service,
            project_name: options.project_name,
            workspace: options.workspace,
            signals: None,
        }
    }

    pub fn transfer(&self) -> &ArtifactTransfer {
        &self.transfer
    }

    /// Track the job in progress on `signals` so a stop request can name it.
    pub fn with_signals(mut self, signals: Arc<SignalState>) -> Self {
        self.signals = Some(signals);
        self
    }

    fn track(&self, job_id: Option<String>) {
        if let Some(signals) = &self.signals {
            signals.set_current_job(job_id);
        }
    }

    /// Run one cycle.
    pub fn run_cycle(&mut self, step: &dyn BuildStep) -> PipelineResult<CycleOutcome> {
        let Some(item) = self.claimer.poll()? else {
            return Ok(CycleOutcome::Idle);
        };

        match self.claimer.claim(&item)? {
            ClaimResult::Acknowledged => {}
            ClaimResult::Rejected(RejectReason::NonceConsumed) => {
                return Ok(CycleOutcome::RaceLost { job_id: item.id });
            }
            ClaimResult::Rejected(RejectReason::Status(status)) => {
                return Err(PipelineError::ClaimRejected {
                    job_id: item.id,
                    status,
                });
            }
        }

        self.track(Some(item.id.clone()));
        let mut ctx = self.context_for(item);
        tracing::info!(
            job_id = %ctx.work_item().id,
            execution_id = %ctx.execution_id(),
            "{LOG_TAG} starting job"
        );

        let result = self.execute(&mut ctx, step);
        let outcome = match &result {
            Ok(_) => JobOutcome::Succeeded,
            Err(err) => {
                tracing::error!(
                    job_id = %ctx.work_item().id,
                    execution_id = %ctx.execution_id(),
                    error = %err,
                    structural = err.is_structural(),
                    "{LOG_TAG} job failed"
                );
                JobOutcome::failed(err.to_string())
            }
        };

        let reported = self.reporter.report(&ctx, &outcome);
        let pending = self.transfer.cleanup().sweep();
        if pending > 0 {
            tracing::warn!(pending, "{LOG_TAG} scratch files still awaiting cleanup");
        }
        self.track(None);
        reported?;

        Ok(CycleOutcome::Completed {
            job_id: ctx.work_item().id.clone(),
            execution_id: ctx.execution_id().to_string(),
            outcome,
            uploads: result.map(|r| r.len()).unwrap_or(0),
        })
    }

    /// Poll until a stop is requested. With `once`, run a single cycle.
    ///
    /// Cycle errors are logged and polling continues; only a failed
    /// single cycle is returned to the caller.
    pub fn run_loop(
        &mut self,
        step: &dyn BuildStep,
        signals: Arc<SignalState>,
        interval: Duration,
        once: bool,
    ) -> PipelineResult<Vec<CycleOutcome>> {
        self.signals = Some(Arc::clone(&signals));
        let mut outcomes = Vec::new();
        loop {
            match self.run_cycle(step) {
                Ok(outcome) => {
                    if let CycleOutcome::Completed { job_id, outcome: job, .. } = &outcome {
                        tracing::info!(%job_id, succeeded = job.is_success(), "{LOG_TAG} cycle complete");
                    }
                    outcomes.push(outcome);
                }
                Err(err) if once => return Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, "{LOG_TAG} cycle failed, will poll again");
                }
            }

            if once || signals.wait_or_stop(interval) {
                tracing::info!("{LOG_TAG} stopping");
                return Ok(outcomes);
            }
        }
    }

    fn context_for(&self, item: WorkItem) -> JobContext {
        let source = JobDetailsSource::new(Arc::clone(&self.service), item.id.clone());
        JobContext::new(
            item,
            Arc::new(CachedCredentials::new(source)),
            self.workspace.clone(),
            self.project_name.clone(),
        )
    }

    /// Download, build, upload. Stops at the first failing stage.
    fn execute(
        &self,
        ctx: &mut JobContext,
        step: &dyn BuildStep,
    ) -> Result<Vec<UploadReceipt>, StageError> {
        let downloaded = self.transfer.download_inputs(ctx)?;
        tracing::info!(
            artifacts = downloaded.artifacts,
            files = downloaded.files,
            bytes = downloaded.bytes,
            "{LOG_TAG} inputs ready"
        );

        let outputs = step.execute(ctx)?;
        tracing::info!(outputs = outputs.len(), "{LOG_TAG} build succeeded");

        Ok(self.transfer.upload_outputs(ctx, &outputs)?)
    }
}

/// Failure inside a claimed job; turned into a failure report
#[derive(Debug, Error)]
enum StageError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Build(#[from] StepError),
}

impl StageError {
    fn is_structural(&self) -> bool {
        matches!(self, StageError::Transfer(e) if e.is_structural())
    }
}
