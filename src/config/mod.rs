//! Runner configuration
//!
//! Three layers merged in order:
//! 1. Built-in defaults
//! 2. Config file (TOML, optional)
//! 3. CLI overrides
//!
//! The merged value is deserialized into [`RunnerConfig`] and validated.

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers, toml_to_json};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::CapabilityDescriptor;
use crate::step::ShellStep;
use crate::transfer::{BuildOutput, TransferOptions};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Typed runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Names scratch files and, unless `query_tag` is set, filters polls
    pub project_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_tag: Option<String>,

    pub capability: CapabilityConfig,
    pub store: StoreConfig,
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub outputs: Vec<OutputConfig>,

    #[serde(default)]
    pub build: BuildConfig,

    pub poll_interval_seconds: u64,
    pub upload_chunk_bytes: u64,
}

/// Capability filter; the owner is always "custom"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub category: String,
    pub provider: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory backing the local store
    pub root: PathBuf,

    #[serde(default)]
    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_port: Option<u16>,

    /// Empty means the ambient credential chain
    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: String,
}

impl StoreConfig {
    pub fn uses_ambient_credentials(&self) -> bool {
        self.access_key.is_empty() && self.secret_key.is_empty()
    }

    /// `host:port` when a proxy is configured
    pub fn proxy(&self) -> Option<String> {
        let host = self.proxy_host.as_deref().filter(|h| !h.is_empty())?;
        Some(match self.proxy_port {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub clear_before_download: bool,
}

/// One `[[outputs]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Workspace-relative; empty means the workspace itself
    #[serde(default)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl RunnerConfig {
    /// Tag sent with every poll
    pub fn query_tag(&self) -> &str {
        self.query_tag
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.project_name)
    }

    pub fn capability(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::custom(
            &self.capability.category,
            &self.capability.provider,
            &self.capability.version,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            clear_before_download: self.workspace.clear_before_download,
            chunk_bytes: self.upload_chunk_bytes,
            scratch_dir: None,
        }
    }

    pub fn build_outputs(&self) -> Vec<BuildOutput> {
        self.outputs
            .iter()
            .map(|o| BuildOutput::named(o.name.clone().unwrap_or_default(), o.path.clone()))
            .collect()
    }

    pub fn build_step(&self) -> ShellStep {
        ShellStep::new(self.build.command.clone(), self.build_outputs())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.project_name.trim().is_empty() {
            return invalid("project_name must not be empty");
        }
        let capability = &self.capability;
        for (field, value) in [
            ("capability.category", &capability.category),
            ("capability.provider", &capability.provider),
            ("capability.version", &capability.version),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} must not be empty", field)));
            }
        }
        if self.upload_chunk_bytes == 0 {
            return invalid("upload_chunk_bytes must be at least 1");
        }
        if self.poll_interval_seconds == 0 {
            return invalid("poll_interval_seconds must be at least 1");
        }
        if self.store.proxy_port.is_some() && self.store.proxy().is_none() {
            return invalid("store.proxy_port requires store.proxy_host");
        }
        if self.store.access_key.is_empty() != self.store.secret_key.is_empty() {
            return invalid("store.access_key and store.secret_key must be set together");
        }
        Ok(())
    }
}
