use super::StateStore;
use crate::errors::DispatchError;
use flowmind_common::ProjectState;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory backend for engine tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, ProjectState>>,
    saves: AtomicUsize,
    seals: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing the engine.
    pub fn insert(&self, project_id: &str, state: ProjectState) {
        self.lock().insert(project_id.to_string(), state);
    }

    pub fn get(&self, project_id: &str) -> Option<ProjectState> {
        self.lock().get(project_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn seal_count(&self) -> usize {
        self.seals.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProjectState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, project_id: &str) -> Result<Option<ProjectState>, DispatchError> {
        let Some(state) = self.get(project_id) else {
            return Ok(None);
        };
        if state.project_id != project_id {
            return Err(DispatchError::IdentityMismatch {
                folder: project_id.to_string(),
                project_id: state.project_id,
            });
        }
        Ok(Some(state))
    }

    fn save(&self, project_id: &str, state: &ProjectState) -> Result<(), DispatchError> {
        self.lock().insert(project_id.to_string(), state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn seal(&self, _project_id: &str) -> Result<(), DispatchError> {
        self.seals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
