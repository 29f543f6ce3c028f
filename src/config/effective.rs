//! Effective configuration with provenance
//!
//! Records which layers contributed to the merged configuration and renders
//! a redacted copy that is safe to print or log.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::BuiltinDefaults;
use super::merge::{merge_layers, toml_to_json};
use super::{ConfigError, RunnerConfig};

/// Origin of a configuration layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration plus the layers it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub config: Value,
    pub sources: Vec<ConfigSource>,
}

/// Keys holding secrets
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "access_key"];

const REDACTED: &str = "[REDACTED]";

impl EffectiveConfig {
    /// Merge builtin defaults, an optional TOML file and CLI overrides.
    ///
    /// An explicitly named file that does not exist is an error.
    pub fn build(
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            let (value, digest) = load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        Ok(Self {
            config: merge_layers(layers),
            sources,
        })
    }

    /// Deserialize and validate the typed configuration
    pub fn settings(&self) -> Result<RunnerConfig, ConfigError> {
        let config: RunnerConfig = serde_json::from_value(self.config.clone())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The merged configuration with secret values masked, plus the
    /// dotted paths that were masked.
    pub fn redacted(&self) -> (Value, Vec<String>) {
        let mut value = self.config.clone();
        let mut redactions = Vec::new();
        redact_recursive(&mut value, String::new(), &mut redactions);
        (value, redactions)
    }

    /// Get a config value by dotted path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(toml_value), digest))
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };

                let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));
                let is_set = !matches!(val, Value::Null) && val.as_str() != Some("");

                if is_secret && is_set && !val.is_object() && !val.is_array() {
                    *val = Value::String(REDACTED.to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, redactions);
                }
            }
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}
