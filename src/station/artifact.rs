//! Artifact checks run after a station exits successfully.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_min_bytes() -> u64 {
    1
}

/// A file a station must leave behind, relative to the project folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub path: PathBuf,
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,
}

impl ArtifactSpec {
    pub fn new(path: impl Into<PathBuf>, min_bytes: u64) -> Self {
        Self {
            path: path.into(),
            min_bytes,
        }
    }
}

/// Check every artifact, returning one problem description per violation.
pub fn check_artifacts(project_dir: &Path, specs: &[ArtifactSpec]) -> Vec<String> {
    let mut problems = Vec::new();
    for spec in specs {
        let path = if spec.path.is_absolute() {
            spec.path.clone()
        } else {
            project_dir.join(&spec.path)
        };
        match std::fs::metadata(&path) {
            Ok(meta) if !meta.is_file() => {
                problems.push(format!("{} is not a file", spec.path.display()));
            }
            Ok(meta) if meta.len() < spec.min_bytes => problems.push(format!(
                "{} is {} bytes, expected at least {}",
                spec.path.display(),
                meta.len(),
                spec.min_bytes
            )),
            Ok(_) => {}
            Err(_) => problems.push(format!("{} is missing", spec.path.display())),
        }
    }
    problems
}
