//! Per-project orchestrator lock.
//!
//! `<project_dir>/.orch.lock` is created with `O_CREAT | O_EXCL`, holds an
//! advisory `flock` for its lifetime and carries JSON metadata naming the
//! owning process. A lock whose owner is no longer alive is reclaimed.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::DispatchError;

pub const LOCK_FILE_NAME: &str = ".orch.lock";

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
    pub pid: u32,
    pub project_id: String,
    pub started_at: DateTime<Utc>,
}

impl LockMetadata {
    pub fn current(project_id: &str) -> Self {
        Self {
            pid: std::process::id(),
            project_id: project_id.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn is_stale(&self) -> bool {
        !is_process_running(self.pid)
    }
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    // Signal 0 checks for existence without delivering anything.
    if unsafe { libc::kill(pid as i32, 0) } == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to another user.
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

/// A held orchestrator lock. Released on drop.
#[derive(Debug)]
pub struct OrchLock {
    file: File,
    path: PathBuf,
    metadata: LockMetadata,
}

impl OrchLock {
    pub fn path_for(project_dir: &Path) -> PathBuf {
        project_dir.join(LOCK_FILE_NAME)
    }

    pub fn acquire(project_dir: &Path, project_id: &str) -> Result<Self, DispatchError> {
        std::fs::create_dir_all(project_dir).map_err(|e| DispatchError::io(project_dir, e))?;
        Self::acquire_with(project_dir, LockMetadata::current(project_id), true)
    }

    fn acquire_with(
        project_dir: &Path,
        metadata: LockMetadata,
        reclaim: bool,
    ) -> Result<Self, DispatchError> {
        let path = Self::path_for(project_dir);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = file.try_lock_exclusive() {
                    if let Err(remove_err) = std::fs::remove_file(&path) {
                        tracing::warn!(path = %path.display(), error = %remove_err, "failed to remove orchestrator lock");
                    }
                    return Err(DispatchError::io(&path, e));
                }
                let json = serde_json::to_string_pretty(&metadata)
                    .map_err(|e| DispatchError::io(&path, std::io::Error::other(e)))?;
                file.write_all(json.as_bytes())
                    .and_then(|_| file.sync_all())
                    .map_err(|e| DispatchError::io(&path, e))?;
                tracing::debug!(path = %path.display(), pid = metadata.pid, "orchestrator lock acquired");
                Ok(Self {
                    file,
                    path,
                    metadata,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let existing = read_metadata(&path);
                match existing {
                    Some(existing) if reclaim && existing.is_stale() => {
                        Self::reclaim(project_dir, &path, existing, metadata)
                    }
                    Some(existing) => Err(DispatchError::Locked {
                        path,
                        pid: existing.pid,
                    }),
                    None => Err(DispatchError::Locked { path, pid: 0 }),
                }
            }
            Err(e) => Err(DispatchError::io(&path, e)),
        }
    }

    /// Replaces a lock left by a dead owner. The old file's flock must be
    /// free and its metadata unchanged, otherwise another process got there
    /// first and the lock counts as held.
    fn reclaim(
        project_dir: &Path,
        path: &Path,
        existing: LockMetadata,
        metadata: LockMetadata,
    ) -> Result<Self, DispatchError> {
        let held = || DispatchError::Locked {
            path: path.to_path_buf(),
            pid: existing.pid,
        };

        let stale = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self::acquire_with(project_dir, metadata, false);
            }
            Err(e) => return Err(DispatchError::io(path, e)),
        };
        if stale.try_lock_exclusive().is_err() {
            return Err(held());
        }
        if read_metadata(path).as_ref() != Some(&existing) {
            return Err(held());
        }

        tracing::warn!(
            pid = existing.pid,
            started_at = %existing.started_at,
            "removing stale orchestrator lock"
        );
        std::fs::remove_file(path).map_err(|e| DispatchError::io(path, e))?;
        // The old inode stays flocked until the new file exists.
        let acquired = Self::acquire_with(project_dir, metadata, false);
        drop(stale);
        acquired
    }

    pub fn metadata(&self) -> &LockMetadata {
        &self.metadata
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OrchLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release orchestrator lock");
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove orchestrator lock");
        }
    }
}

fn read_metadata(path: &Path) -> Option<LockMetadata> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
