//! Build step seam
//!
//! The build itself is somebody else's business. The runner only needs
//! something that, given the workspace and the job context, either
//! succeeds with a list of outputs or fails with a message. Closures
//! implement [`BuildStep`] directly; [`ShellStep`] runs a configured
//! command for the CLI.

use std::io;
use std::path::Path;
use std::process::Command;

use thiserror::Error;

use crate::job::JobContext;
use crate::logging::LOG_TAG;
use crate::transfer::BuildOutput;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to start build command: {0}")]
    Spawn(#[from] io::Error),

    #[error("build command `{command}` exited with {}", exit_label(.code))]
    Exit { command: String, code: Option<i32> },

    #[error("build failed: {0}")]
    Failed(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// A build that runs in a job's workspace
pub trait BuildStep {
    fn execute(&self, ctx: &JobContext) -> Result<Vec<BuildOutput>, StepError>;
}

impl<F> BuildStep for F
where
    F: Fn(&Path, &JobContext) -> Result<Vec<BuildOutput>, StepError>,
{
    fn execute(&self, ctx: &JobContext) -> Result<Vec<BuildOutput>, StepError> {
        self(ctx.workspace(), ctx)
    }
}

/// Runs `sh -c <command>` in the workspace and returns configured outputs
#[derive(Debug, Clone)]
pub struct ShellStep {
    command: Option<String>,
    outputs: Vec<BuildOutput>,
}

impl ShellStep {
    /// A step with no command only hands back its outputs.
    pub fn new(command: Option<String>, outputs: Vec<BuildOutput>) -> Self {
        Self {
            command: command.filter(|c| !c.trim().is_empty()),
            outputs,
        }
    }
}

impl BuildStep for ShellStep {
    fn execute(&self, ctx: &JobContext) -> Result<Vec<BuildOutput>, StepError> {
        let Some(command) = &self.command else {
            return Ok(self.outputs.clone());
        };

        tracing::info!(
            job_id = %ctx.work_item().id,
            execution_id = %ctx.execution_id(),
            %command,
            "{LOG_TAG} running build command"
        );
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(ctx.workspace())
            .env("PIPELINE_JOB_ID", &ctx.work_item().id)
            .env("PIPELINE_EXECUTION_ID", ctx.execution_id())
            .env("PIPELINE_WORKSPACE", ctx.workspace())
            .status()?;

        if !status.success() {
            return Err(StepError::Exit {
                command: command.clone(),
                code: status.code(),
            });
        }
        Ok(self.outputs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialError, CredentialProvider, TemporaryCredential};
    use crate::job::WorkItem;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct NoCredentials;

    impl CredentialProvider for NoCredentials {
        fn credentials(&self) -> Result<Arc<TemporaryCredential>, CredentialError> {
            Err(CredentialError::Missing {
                job_id: "job-1".to_string(),
            })
        }
    }

    fn context(workspace: &Path) -> JobContext {
        let item = WorkItem {
            id: "job-1".to_string(),
            nonce: "n".to_string(),
            inputs: vec![],
            outputs: vec![],
            encryption: None,
        };
        JobContext::new(item, Arc::new(NoCredentials), workspace, "app")
    }

    #[test]
    fn test_closure_step_sees_workspace() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());

        let step = |workspace: &Path, _ctx: &JobContext| -> Result<Vec<BuildOutput>, StepError> {
            std::fs::write(workspace.join("out.txt"), b"built")?;
            Ok(vec![BuildOutput::unnamed("out.txt")])
        };

        let outputs = step.execute(&ctx).unwrap();
        assert_eq!(outputs, vec![BuildOutput::unnamed("out.txt")]);
        assert!(dir.path().join("out.txt").exists());
    }

    #[test]
    fn test_shell_step_without_command() {
        let dir = TempDir::new().unwrap();
        let step = ShellStep::new(Some("  ".to_string()), vec![BuildOutput::unnamed("")]);
        assert_eq!(step.execute(&context(dir.path())).unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_step_runs_in_workspace() {
        let dir = TempDir::new().unwrap();
        let step = ShellStep::new(
            Some("echo \"$PIPELINE_JOB_ID\" > marker.txt".to_string()),
            vec![BuildOutput::unnamed("marker.txt")],
        );

        step.execute(&context(dir.path())).unwrap();
        let marker = std::fs::read_to_string(dir.path().join("marker.txt")).unwrap();
        assert_eq!(marker.trim(), "job-1");
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_step_failure() {
        let dir = TempDir::new().unwrap();
        let step = ShellStep::new(Some("exit 3".to_string()), vec![]);

        let err = step.execute(&context(dir.path())).unwrap_err();
        assert!(matches!(err, StepError::Exit { code: Some(3), .. }));
        assert!(err.to_string().contains("status 3"));
    }
}
