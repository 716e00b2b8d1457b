//! Durable per-project state storage.
//!
//! The engine only talks to the [`StateStore`] trait. Two backends exist:
//! [`FsStateStore`] for real projects on disk and [`MemoryStateStore`] for
//! deterministic tests.

mod fs;
mod memory;

pub use fs::{FsStateStore, StagedWrite};
pub use memory::MemoryStateStore;

use crate::errors::DispatchError;
use flowmind_common::ProjectState;
use std::path::Path;

/// File name of the state document inside a project folder.
pub const STATE_FILE_NAME: &str = "PROJECT_STATE.json";

/// Storage backend for project state documents.
pub trait StateStore: Send + Sync {
    /// Load the state document, or `None` if the project has never been written.
    fn load(&self, project_id: &str) -> Result<Option<ProjectState>, DispatchError>;

    /// Persist `state` atomically. On failure the previous document is untouched.
    fn save(&self, project_id: &str, state: &ProjectState) -> Result<(), DispatchError>;

    /// Re-assert the at-rest protection of the current document.
    fn seal(&self, project_id: &str) -> Result<(), DispatchError>;
}

/// Mode of a state document between writes.
pub const SEALED_MODE: u32 = 0o444;
/// Mode of a state document while it is being replaced.
pub const WRITABLE_MODE: u32 = 0o644;

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    std::fs::set_permissions(path, perms)
}
