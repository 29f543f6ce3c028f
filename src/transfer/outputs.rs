//! Matching build outputs to declared output artifacts
//!
//! If every supplied output carries a name, outputs are matched by name;
//! otherwise they are matched by position. Mixing the two, or supplying a
//! different number of outputs than were declared, is rejected before
//! anything is uploaded.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::OutputArtifact;

/// An output produced by the build: an optional artifact name and a
/// workspace-relative path. An empty name means "match by position".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: PathBuf,
}

impl BuildOutput {
    pub fn named(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn unnamed(path: impl Into<PathBuf>) -> Self {
        Self::named(String::new(), path)
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Output contract violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputContractError {
    #[error("outputs must be either all named or all unnamed ({named} named, {unnamed} unnamed)")]
    MixedOutputNames { named: usize, unnamed: usize },

    #[error("{supplied} outputs supplied but {declared} output artifacts declared")]
    OutputCountMismatch { supplied: usize, declared: usize },

    #[error("no declared output artifact is named {0:?}")]
    UnknownOutputName(String),

    #[error("output artifact {0:?} supplied more than once")]
    DuplicateOutputName(String),
}

/// Pair each declared artifact with the output that fills it, in
/// declaration order.
pub fn match_outputs<'a>(
    declared: &'a [OutputArtifact],
    supplied: &'a [BuildOutput],
) -> Result<Vec<(&'a OutputArtifact, &'a BuildOutput)>, OutputContractError> {
    let named = supplied.iter().filter(|o| o.is_named()).count();
    let unnamed = supplied.len() - named;
    if named > 0 && unnamed > 0 {
        return Err(OutputContractError::MixedOutputNames { named, unnamed });
    }
    if supplied.len() != declared.len() {
        return Err(OutputContractError::OutputCountMismatch {
            supplied: supplied.len(),
            declared: declared.len(),
        });
    }

    if unnamed > 0 || supplied.is_empty() {
        return Ok(declared.iter().zip(supplied.iter()).collect());
    }

    let mut seen = HashSet::new();
    for output in supplied {
        if !declared.iter().any(|a| a.name == output.name) {
            return Err(OutputContractError::UnknownOutputName(output.name.clone()));
        }
        if !seen.insert(output.name.as_str()) {
            return Err(OutputContractError::DuplicateOutputName(output.name.clone()));
        }
    }

    // Equal counts, no unknowns, no duplicates: every declared name is present.
    declared
        .iter()
        .map(|artifact| {
            supplied
                .iter()
                .find(|o| o.name == artifact.name)
                .map(|output| (artifact, output))
                .ok_or_else(|| OutputContractError::UnknownOutputName(artifact.name.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ArtifactLocation;
    use pipeline_protocol::ops::StoreKind;

    fn artifact(name: &str) -> OutputArtifact {
        OutputArtifact {
            name: name.to_string(),
            location: ArtifactLocation {
                store: StoreKind::S3,
                bucket: "out".to_string(),
                object_key: format!("keys/{}", name),
            },
        }
    }

    #[test]
    fn test_match_by_position() {
        let declared = vec![artifact("a"), artifact("b")];
        let supplied = vec![BuildOutput::unnamed("dist"), BuildOutput::unnamed("report.txt")];

        let pairs = match_outputs(&declared, &supplied).unwrap();
        assert_eq!(pairs[0].0.name, "a");
        assert_eq!(pairs[0].1.path, PathBuf::from("dist"));
        assert_eq!(pairs[1].0.name, "b");
    }

    #[test]
    fn test_match_by_name_follows_declaration_order() {
        let declared = vec![artifact("a"), artifact("b")];
        let supplied = vec![BuildOutput::named("b", "second"), BuildOutput::named("a", "first")];

        let pairs = match_outputs(&declared, &supplied).unwrap();
        assert_eq!(pairs[0].0.name, "a");
        assert_eq!(pairs[0].1.path, PathBuf::from("first"));
        assert_eq!(pairs[1].1.path, PathBuf::from("second"));
    }

    #[test]
    fn test_count_mismatch() {
        let declared = vec![artifact("a")];
        let supplied = vec![BuildOutput::unnamed("x"), BuildOutput::unnamed("y")];

        let err = match_outputs(&declared, &supplied).unwrap_err();
        assert_eq!(
            err,
            OutputContractError::OutputCountMismatch {
                supplied: 2,
                declared: 1
            }
        );
    }

    #[test]
    fn test_mixed_names_distinct_from_count() {
        let declared = vec![artifact("a")];
        let supplied = vec![BuildOutput::named("a", "x"), BuildOutput::unnamed("y")];

        let err = match_outputs(&declared, &supplied).unwrap_err();
        assert!(matches!(err, OutputContractError::MixedOutputNames { named: 1, unnamed: 1 }));
        assert!(err.to_string().contains("all named or all unnamed"));
    }

    #[test]
    fn test_unknown_name() {
        let declared = vec![artifact("a")];
        let supplied = vec![BuildOutput::named("z", "x")];

        let err = match_outputs(&declared, &supplied).unwrap_err();
        assert_eq!(err, OutputContractError::UnknownOutputName("z".to_string()));
    }

    #[test]
    fn test_duplicate_name() {
        let declared = vec![artifact("a"), artifact("b")];
        let supplied = vec![BuildOutput::named("a", "x"), BuildOutput::named("a", "y")];

        let err = match_outputs(&declared, &supplied).unwrap_err();
        assert_eq!(err, OutputContractError::DuplicateOutputName("a".to_string()));
    }

    #[test]
    fn test_no_outputs() {
        assert!(match_outputs(&[], &[]).unwrap().is_empty());
    }
}
