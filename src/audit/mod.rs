//! Append-only audit trail of transition attempts.

mod logger;

pub use flowmind_common::{AuditRecord, AuditStatus, resume_target};
pub use logger::{AUDIT_FILE_NAME, FsAuditLog};

use crate::errors::DispatchError;
use std::sync::Mutex;

/// Sink for audit records. Entries are never rewritten or removed.
pub trait AuditLog: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<(), DispatchError>;

    /// All readable entries for a project, oldest first.
    fn entries(&self, project_id: &str) -> Result<Vec<AuditRecord>, DispatchError>;
}

/// In-memory audit log for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self, project_id: &str) -> Vec<AuditStatus> {
        self.lock()
            .iter()
            .filter(|r| r.project_id == project_id)
            .map(|r| r.status)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), DispatchError> {
        self.lock().push(record.clone());
        Ok(())
    }

    fn entries(&self, project_id: &str) -> Result<Vec<AuditRecord>, DispatchError> {
        Ok(self
            .lock()
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }
}
