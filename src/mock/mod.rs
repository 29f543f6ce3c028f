//! In-memory orchestrator for tests
//!
//! Implements both `JobService` and `ObjectStore` against in-process state,
//! records every call it receives, and supports per-operation failure
//! injection for exercising error paths.

mod failure;
mod orchestrator;
mod state;

pub use failure::{FailureConfig, FailureInjector, InjectedFailure};
pub use orchestrator::MockOrchestrator;
pub use state::{CompletedUpload, MockJob, MockState, MockUpload, RecordedResult, StoredObject};
