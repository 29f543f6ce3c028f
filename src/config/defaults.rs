//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

use crate::transfer::DEFAULT_CHUNK_BYTES;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    pub project_name: String,

    /// Capability category (default: "Build")
    pub category: String,

    /// Capability provider (default: "pipeline-runner")
    pub provider: String,

    /// Capability version (default: "1")
    pub version: String,

    /// Local store directory (default: ".pipeline-store")
    pub store_root: String,

    /// Build workspace (default: "workspace")
    pub workspace_path: String,

    pub clear_before_download: bool,

    /// Seconds between polls (default: 30)
    pub poll_interval_seconds: u64,

    /// Multipart part size (default: 5 MiB)
    pub upload_chunk_bytes: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            project_name: "pipeline".to_string(),
            category: "Build".to_string(),
            provider: "pipeline-runner".to_string(),
            version: "1".to_string(),
            store_root: ".pipeline-store".to_string(),
            workspace_path: "workspace".to_string(),
            clear_before_download: false,
            poll_interval_seconds: 30,
            upload_chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "project_name": self.project_name,
            "capability": {
                "category": self.category,
                "provider": self.provider,
                "version": self.version
            },
            "store": {
                "root": self.store_root,
                "region": "",
                "access_key": "",
                "secret_key": ""
            },
            "workspace": {
                "path": self.workspace_path,
                "clear_before_download": self.clear_before_download
            },
            "outputs": [],
            "build": {},
            "poll_interval_seconds": self.poll_interval_seconds,
            "upload_chunk_bytes": self.upload_chunk_bytes
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.category, "Build");
        assert_eq!(defaults.poll_interval_seconds, 30);
        assert_eq!(defaults.upload_chunk_bytes, 5 * 1024 * 1024);
        assert!(!defaults.clear_before_download);
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["capability"]["provider"], "pipeline-runner");
        assert_eq!(value["workspace"]["path"], "workspace");
        assert_eq!(value["store"]["access_key"], "");
        assert!(value["outputs"].as_array().unwrap().is_empty());
    }
}
