use super::{SEALED_MODE, STATE_FILE_NAME, StateStore, WRITABLE_MODE, set_mode};
use crate::errors::DispatchError;
use crate::guard;
use flowmind_common::ProjectState;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// State documents at `<projects_dir>/<ID>/PROJECT_STATE.json`.
#[derive(Debug, Clone)]
pub struct FsStateStore {
    projects_dir: PathBuf,
}

/// A verified temp file waiting to replace the state document.
///
/// Dropping it without [`FsStateStore::commit`] discards the temp file and
/// re-seals the existing document, exactly as a crash before the rename would.
pub struct StagedWrite {
    temp: Option<NamedTempFile>,
    dest: PathBuf,
}

impl StagedWrite {
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp.as_ref().map(|t| t.path())
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if self.temp.take().is_some() && self.dest.exists() {
            if let Err(e) = set_mode(&self.dest, SEALED_MODE) {
                tracing::warn!(path = %self.dest.display(), error = %e, "failed to re-seal state file");
            }
        }
    }
}

impl FsStateStore {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.projects_dir.join(project_id)
    }

    pub fn state_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join(STATE_FILE_NAME)
    }

    /// Write `state` to a temp file beside the document and verify it parses.
    pub fn stage(&self, project_id: &str, state: &ProjectState) -> Result<StagedWrite, DispatchError> {
        let path = self.state_path(project_id);
        let json = serde_json::to_vec_pretty(state).map_err(|e| DispatchError::StateCorrupt {
            path: path.clone(),
            message: format!("failed to serialize state: {}", e),
        })?;
        self.stage_bytes(project_id, &json)
    }

    /// Stage raw bytes. Content that does not parse as a state document is
    /// rejected before anything replaces the current file.
    pub fn stage_bytes(&self, project_id: &str, bytes: &[u8]) -> Result<StagedWrite, DispatchError> {
        let dir = self.project_dir(project_id);
        let dest = dir.join(STATE_FILE_NAME);

        std::fs::create_dir_all(&dir).map_err(|e| DispatchError::io(&dir, e))?;
        if dest.exists() {
            set_mode(&dest, WRITABLE_MODE).map_err(|e| DispatchError::io(&dest, e))?;
        }

        // From here on, an early return drops `staged` and re-seals `dest`.
        let mut staged = StagedWrite { temp: None, dest };

        let mut temp = tempfile::Builder::new()
            .prefix(".PROJECT_STATE.")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| DispatchError::io(&dir, e))?;
        let temp_path = temp.path().to_path_buf();
        temp.write_all(bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| DispatchError::io(&temp_path, e))?;
        staged.temp = Some(temp);

        let written = std::fs::read(&temp_path).map_err(|e| DispatchError::io(&temp_path, e))?;
        serde_json::from_slice::<ProjectState>(&written).map_err(|e| DispatchError::StateCorrupt {
            path: temp_path.clone(),
            message: format!("staged content failed verification: {}", e),
        })?;

        Ok(staged)
    }

    /// Atomically move a staged write over the document and seal it.
    pub fn commit(&self, mut staged: StagedWrite) -> Result<(), DispatchError> {
        let dest = staged.dest.clone();
        let Some(temp) = staged.temp.take() else {
            return Ok(());
        };
        if let Err(e) = temp.persist(&dest) {
            // Rename failed: the old document is still in place.
            if let Err(seal_err) = set_mode(&dest, SEALED_MODE) {
                tracing::warn!(path = %dest.display(), error = %seal_err, "failed to re-seal state file");
            }
            return Err(DispatchError::io(&dest, e.error));
        }
        set_mode(&dest, SEALED_MODE).map_err(|e| DispatchError::io(&dest, e))?;
        tracing::debug!(path = %dest.display(), "state committed");
        Ok(())
    }

    /// Stage and commit raw bytes in one step.
    pub fn write_raw(&self, project_id: &str, bytes: &[u8]) -> Result<(), DispatchError> {
        let staged = self.stage_bytes(project_id, bytes)?;
        self.commit(staged)
    }
}

impl StateStore for FsStateStore {
    fn load(&self, project_id: &str) -> Result<Option<ProjectState>, DispatchError> {
        let path = self.state_path(project_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DispatchError::io(&path, e)),
        };
        let state: ProjectState =
            serde_json::from_str(&content).map_err(|e| DispatchError::StateCorrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;
        guard::check_identity(&self.project_dir(project_id), &state)?;
        Ok(Some(state))
    }

    fn save(&self, project_id: &str, state: &ProjectState) -> Result<(), DispatchError> {
        let staged = self.stage(project_id, state)?;
        self.commit(staged)
    }

    fn seal(&self, project_id: &str) -> Result<(), DispatchError> {
        let path = self.state_path(project_id);
        if path.exists() {
            set_mode(&path, SEALED_MODE).map_err(|e| DispatchError::io(&path, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmind_common::Phase;
    use tempfile::tempdir;

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    fn temp_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "tmp").unwrap_or(false))
            .collect()
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        assert!(store.load("FM_1").unwrap().is_none());
    }

    #[test]
    fn test_load_minimal_document() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        std::fs::create_dir_all(store.project_dir("P1")).unwrap();
        std::fs::write(store.state_path("P1"), r#"{"project_id":"P1","phase":"TOPIC"}"#).unwrap();

        let state = store.load("P1").unwrap().unwrap();
        assert_eq!(state.phase, Phase::Topic);
        assert!(!state.halted);

        // Rewriting fills in the timestamps.
        store.save("P1", &state).unwrap();
        let raw = std::fs::read_to_string(store.state_path("P1")).unwrap();
        assert!(raw.contains("created_at"));
    }

    #[test]
    fn test_load_recovered_history_entry() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        std::fs::create_dir_all(store.project_dir("P1")).unwrap();
        std::fs::write(
            store.state_path("P1"),
            r#"{"project_id":"P1","phase":"SCRIPT","phase_history":[{"at":"2025-03-01T10:00:00Z","phase":"SCRIPT","recovered":true}]}"#,
        )
        .unwrap();

        let state = store.load("P1").unwrap().unwrap();
        assert_eq!(state.phase, Phase::Script);
        assert_eq!(state.phase_history.len(), 1);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        let state = ProjectState::new("FM_1", Phase::Topic);
        store.save("FM_1", &state).unwrap();

        let loaded = store.load("FM_1").unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(temp_files(&store.project_dir("FM_1")).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_document_is_read_only_at_rest() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        let mut state = ProjectState::new("FM_1", Phase::Topic);
        store.save("FM_1", &state).unwrap();
        assert_eq!(mode_of(&store.state_path("FM_1")), 0o444);

        state.phase = Phase::Script;
        store.save("FM_1", &state).unwrap();
        assert_eq!(mode_of(&store.state_path("FM_1")), 0o444);
    }

    #[test]
    fn test_stage_without_commit_leaves_old_document() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        let state = ProjectState::new("FM_1", Phase::Topic);
        store.save("FM_1", &state).unwrap();
        let before = std::fs::read(store.state_path("FM_1")).unwrap();

        let mut next = state.clone();
        next.phase = Phase::Script;
        let staged = store.stage("FM_1", &next).unwrap();
        let temp_path = staged.temp_path().unwrap().to_path_buf();
        assert!(temp_path.exists());

        // Simulated crash between stage and commit.
        drop(staged);

        assert!(!temp_path.exists());
        assert_eq!(std::fs::read(store.state_path("FM_1")).unwrap(), before);
        assert_eq!(store.load("FM_1").unwrap().unwrap().phase, Phase::Topic);
        #[cfg(unix)]
        assert_eq!(mode_of(&store.state_path("FM_1")), 0o444);
    }

    #[test]
    fn test_invalid_content_is_rejected_before_rename() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        let state = ProjectState::new("FM_1", Phase::Topic);
        store.save("FM_1", &state).unwrap();
        let before = std::fs::read(store.state_path("FM_1")).unwrap();

        let err = store.write_raw("FM_1", b"{\"project_id\": \"FM_1\", ").unwrap_err();
        assert!(matches!(err, DispatchError::StateCorrupt { .. }));
        assert_eq!(std::fs::read(store.state_path("FM_1")).unwrap(), before);
        assert!(temp_files(&store.project_dir("FM_1")).is_empty());
        #[cfg(unix)]
        assert_eq!(mode_of(&store.state_path("FM_1")), 0o444);
    }

    #[test]
    fn test_corrupt_document_is_state_corrupt() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        std::fs::create_dir_all(store.project_dir("FM_1")).unwrap();
        std::fs::write(store.state_path("FM_1"), "not json").unwrap();

        let err = store.load("FM_1").unwrap_err();
        assert!(matches!(err, DispatchError::StateCorrupt { .. }));
    }

    #[test]
    fn test_load_enforces_identity() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        let state = ProjectState::new("FM_OTHER", Phase::Topic);
        store.save("FM_1", &state).unwrap();

        let err = store.load("FM_1").unwrap_err();
        assert!(matches!(err, DispatchError::IdentityMismatch { .. }));
        // Never auto-corrected.
        let raw = std::fs::read_to_string(store.state_path("FM_1")).unwrap();
        assert!(raw.contains("FM_OTHER"));
    }

    #[cfg(unix)]
    #[test]
    fn test_seal_restores_read_only() {
        let dir = tempdir().unwrap();
        let store = FsStateStore::new(dir.path());
        store.save("FM_1", &ProjectState::new("FM_1", Phase::Topic)).unwrap();
        set_mode(&store.state_path("FM_1"), 0o644).unwrap();

        store.seal("FM_1").unwrap();
        assert_eq!(mode_of(&store.state_path("FM_1")), 0o444);
    }
}
