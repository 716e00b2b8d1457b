use super::{AuditLog, AuditRecord};
use crate::errors::DispatchError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const AUDIT_FILE_NAME: &str = "phase_history.log";

/// JSON-lines audit log at `<projects_dir>/<ID>/phase_history.log`.
#[derive(Debug, Clone)]
pub struct FsAuditLog {
    projects_dir: PathBuf,
}

impl FsAuditLog {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    pub fn log_path(&self, project_id: &str) -> PathBuf {
        self.projects_dir.join(project_id).join(AUDIT_FILE_NAME)
    }
}

fn parse_lines(path: &Path, content: &str) -> Vec<AuditRecord> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<AuditRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable audit line");
                None
            }
        })
        .collect()
}

impl AuditLog for FsAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), DispatchError> {
        let path = self.log_path(&record.project_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DispatchError::io(parent, e))?;
        }

        let mut line = serde_json::to_string(record).map_err(|e| {
            DispatchError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        line.push('\n');

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|e| DispatchError::io(&path, e))
    }

    fn entries(&self, project_id: &str) -> Result<Vec<AuditRecord>, DispatchError> {
        let path = self.log_path(project_id);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(parse_lines(&path, &content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(DispatchError::io(&path, e)),
        }
    }
}
