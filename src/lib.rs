//! Pipeline Job Runner - polling worker for an external CI orchestrator
//!
//! This crate claims work items for a custom action from a pipeline
//! orchestrator, moves their artifacts between a content store and a local
//! workspace, runs a build step, and reports the outcome.

pub mod archive;
pub mod claim;
pub mod config;
pub mod credentials;
pub mod job;
pub mod logging;
pub mod mock;
pub mod pipeline;
pub mod report;
pub mod signal;
pub mod step;
pub mod store;
pub mod transfer;

pub use archive::{compress, detect_kind, extract, ArchiveError, CompressionKind};
pub use claim::{ClaimError, ClaimResult, JobClaimer};
pub use config::{ConfigError, EffectiveConfig, RunnerConfig};
pub use credentials::{CachedCredentials, CredentialProvider, TemporaryCredential};
pub use job::{CapabilityDescriptor, JobContext, WorkItem};
pub use pipeline::{CycleOutcome, JobRunner, PipelineError, RunnerOptions};
pub use report::{JobOutcome, ResultReporter};
pub use step::{BuildStep, ShellStep, StepError};
pub use store::{JobService, LocalStore, ObjectStore, StoreError};
pub use transfer::{ArtifactTransfer, BuildOutput, TransferError, TransferOptions};
