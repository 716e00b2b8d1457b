//! Project identity guard.
//!
//! A project folder is named after its id and the state inside it must say
//! the same thing. Mismatches are fatal and never auto-corrected: a copied
//! or renamed folder must be fixed by hand.

use crate::errors::DispatchError;
use flowmind_common::ProjectState;
use std::path::Path;

/// Reject ids that cannot safely name a folder under the projects root.
pub fn validate_project_id(project_id: &str) -> Result<(), DispatchError> {
    if project_id.trim().is_empty() {
        return Err(DispatchError::Usage("project id must not be empty".into()));
    }
    if project_id.starts_with('.') || project_id.starts_with('_') {
        return Err(DispatchError::Usage(format!(
            "project id '{}' must not start with '.' or '_'",
            project_id
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    if !project_id.chars().all(allowed) {
        return Err(DispatchError::Usage(format!(
            "project id '{}' may only contain letters, digits, '_' and '-'",
            project_id
        )));
    }
    Ok(())
}

/// The folder name of `project_dir` must equal `state.project_id`.
pub fn check_identity(project_dir: &Path, state: &ProjectState) -> Result<(), DispatchError> {
    let folder = project_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if folder != state.project_id {
        return Err(DispatchError::IdentityMismatch {
            folder,
            project_id: state.project_id.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmind_common::Phase;
    use std::path::PathBuf;

    #[test]
    fn test_matching_identity_passes() {
        let state = ProjectState::new("FM_100", Phase::Topic);
        check_identity(&PathBuf::from("/projects/FM_100"), &state).unwrap();
    }

    #[test]
    fn test_mismatch_is_reported_not_fixed() {
        let state = ProjectState::new("FM_B", Phase::Topic);
        let err = check_identity(&PathBuf::from("/projects/FM_A"), &state).unwrap_err();
        match err {
            DispatchError::IdentityMismatch { folder, project_id } => {
                assert_eq!(folder, "FM_A");
                assert_eq!(project_id, "FM_B");
            }
            other => panic!("Expected IdentityMismatch, got {other:?}"),
        }
        assert_eq!(state.project_id, "FM_B");
    }

    #[test]
    fn test_validate_project_id() {
        validate_project_id("FM_1700000000").unwrap();
        validate_project_id("demo-01").unwrap();
        assert!(validate_project_id("").is_err());
        assert!(validate_project_id("../etc").is_err());
        assert!(validate_project_id("a/b").is_err());
        assert!(validate_project_id(".hidden").is_err());
        assert!(validate_project_id("_archive").is_err());
    }
}
