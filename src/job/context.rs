//! Per-build execution context

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::CompressionKind;
use crate::credentials::CredentialProvider;

use super::WorkItem;

/// Everything one build needs to know about its claimed work item.
///
/// Owned by a single build and passed explicitly to each stage, so builds
/// running side by side on one host never see each other's state.
pub struct JobContext {
    work_item: WorkItem,
    credentials: Arc<dyn CredentialProvider>,
    workspace: PathBuf,
    project_name: String,
    execution_id: String,
    /// Kind of the last extracted input
    established_kind: Option<CompressionKind>,
}

impl JobContext {
    pub fn new(
        work_item: WorkItem,
        credentials: Arc<dyn CredentialProvider>,
        workspace: impl Into<PathBuf>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            work_item,
            credentials,
            workspace: workspace.into(),
            project_name: project_name.into(),
            execution_id: ulid::Ulid::new().to_string(),
            established_kind: None,
        }
    }

    /// Override the generated execution id
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    pub fn work_item(&self) -> &WorkItem {
        &self.work_item
    }

    pub fn credentials(&self) -> &dyn CredentialProvider {
        self.credentials.as_ref()
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn established_kind(&self) -> Option<CompressionKind> {
        self.established_kind
    }

    pub fn establish_kind(&mut self, kind: CompressionKind) {
        self.established_kind = Some(kind);
    }

    /// Packaging used for directory outputs
    pub fn output_kind(&self) -> CompressionKind {
        self.established_kind
            .map(CompressionKind::for_packing)
            .unwrap_or(CompressionKind::Zip)
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.work_item.id)
            .field("workspace", &self.workspace)
            .field("project_name", &self.project_name)
            .field("execution_id", &self.execution_id)
            .field("established_kind", &self.established_kind)
            .finish()
    }
}
