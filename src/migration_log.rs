//! Append-only JSONL migration log, one file per draft version
//! (`.cards/local/migrations/<v>/migrationLog.jsonl`). Every structural
//! change a command makes is recorded here; spec §5 calls the latest
//! entry's UUID "the project's causal clock".

use crate::core::error::CyberismoError;
use crate::core::paths;
use crate::core::time::{new_uuid_v4, now_rfc3339};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ModuleAdd,
    ModuleRemove,
    ProjectRename,
    ResourceCreate,
    ResourceDelete,
    ResourceRename,
    ResourceUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationLogEntry {
    pub id: String,
    pub timestamp: String,
    pub operation: Operation,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonValue>,
}

impl MigrationLogEntry {
    pub fn new(operation: Operation, target: impl Into<String>, parameters: Option<JsonValue>) -> Self {
        Self {
            id: new_uuid_v4(),
            timestamp: now_rfc3339(),
            operation,
            target: target.into(),
            parameters,
        }
    }
}

/// Append `entry` as a single atomic `write(O_APPEND)` line to the draft
/// version's log, creating the file and its parent directory on first use.
pub fn append(project_root: &Path, draft_version: u32, entry: &MigrationLogEntry) -> Result<(), CyberismoError> {
    let path = paths::migration_log_path(project_root, draft_version);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CyberismoError::filesystem(parent, e))?;
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| CyberismoError::filesystem(&path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| CyberismoError::filesystem(&path, e))?;
    Ok(())
}

/// Read every entry of a draft version's log, in append order. An absent
/// file reads as empty (a freshly-opened draft has no entries yet).
pub fn read_all(project_root: &Path, draft_version: u32) -> Result<Vec<MigrationLogEntry>, CyberismoError> {
    let path = paths::migration_log_path(project_root, draft_version);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| CyberismoError::filesystem(&path, e))?;
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(CyberismoError::from))
        .collect()
}

pub fn ensure_empty_log(project_root: &Path, draft_version: u32) -> Result<(), CyberismoError> {
    let path = paths::migration_log_path(project_root, draft_version);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CyberismoError::filesystem(parent, e))?;
    }
    if !path.exists() {
        crate::core::fsutil::write_atomic_str(&path, "")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_all_round_trips() {
        let dir = tempdir().unwrap();
        let entry = MigrationLogEntry::new(Operation::ResourceCreate, "dec_1a2b3c", None);
        append(dir.path(), 1, &entry).unwrap();
        let entries = read_all(dir.path(), 1).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, "dec_1a2b3c");
        assert_eq!(entries[0].operation, Operation::ResourceCreate);
    }

    #[test]
    fn read_all_on_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        assert!(read_all(dir.path(), 7).unwrap().is_empty());
    }

    #[test]
    fn appends_are_ordered() {
        let dir = tempdir().unwrap();
        append(dir.path(), 1, &MigrationLogEntry::new(Operation::ResourceCreate, "a", None)).unwrap();
        append(dir.path(), 1, &MigrationLogEntry::new(Operation::ResourceUpdate, "a", None)).unwrap();
        let entries = read_all(dir.path(), 1).unwrap();
        assert_eq!(entries[0].operation, Operation::ResourceCreate);
        assert_eq!(entries[1].operation, Operation::ResourceUpdate);
    }

    #[test]
    fn ensure_empty_log_creates_file_once() {
        let dir = tempdir().unwrap();
        ensure_empty_log(dir.path(), 2).unwrap();
        let path = paths::migration_log_path(dir.path(), 2);
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
