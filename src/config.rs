//! Project-level configuration (`.cards/local/cardsConfig.json`) and
//! project-root discovery. Mirrors spec §3 "Project configuration": one
//! `ProjectConfiguration` struct, no global singleton — each [`crate::project::Project`]
//! owns exactly one, per DESIGN NOTES §9 ("replace with a per-project
//! context struct").

use crate::core::error::CyberismoError;
use crate::core::fsutil;
use crate::core::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleEntry {
    pub name: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    pub card_key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEntry {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfiguration {
    pub name: String,
    pub card_key_prefix: String,
    pub schema_version: u32,
    /// Published version; the draft version is always `version + 1` unless
    /// a draft is already open under a higher number (tracked implicitly
    /// by which `.cards/local/<v>/` folders exist on disk).
    pub version: u32,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub hubs: Vec<HubEntry>,
}

impl ProjectConfiguration {
    pub fn new(name: &str, card_key_prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            card_key_prefix: card_key_prefix.to_string(),
            schema_version: CURRENT_SCHEMA_VERSION,
            version: 0,
            modules: Vec::new(),
            hubs: Vec::new(),
        }
    }

    pub fn draft_version(&self) -> u32 {
        self.version + 1
    }

    pub fn module_prefixes(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.card_key_prefix.clone()).collect()
    }

    pub fn has_module_prefix(&self, prefix: &str) -> bool {
        self.modules.iter().any(|m| m.card_key_prefix == prefix)
    }

    pub fn load(project_root: &Path) -> Result<Self, CyberismoError> {
        let path = paths::config_path(project_root);
        let raw = std::fs::read_to_string(&path).map_err(|e| CyberismoError::filesystem(&path, e))?;
        let cfg: Self = serde_json::from_str(&raw)?;
        Ok(cfg)
    }

    pub fn save(&self, project_root: &Path) -> Result<(), CyberismoError> {
        let path = paths::config_path(project_root);
        let json = serde_json::to_string_pretty(self)?;
        fsutil::write_atomic_str(&path, &json)
    }
}

/// Walk upward from `start_dir` looking for `.cards/local/cardsConfig.json`,
/// per spec §6 "Environment". Returns the directory that contains `.cards`.
pub fn discover_project_root(start_dir: &Path) -> Result<PathBuf, CyberismoError> {
    let mut dir = start_dir.to_path_buf();
    loop {
        if paths::config_path(&dir).is_file() {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(CyberismoError::NotFound(format!(
                "no .cards/local/cardsConfig.json found above {}",
                start_dir.display()
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let cfg = ProjectConfiguration::new("Decision Records", "dec");
        cfg.save(dir.path()).unwrap();
        let loaded = ProjectConfiguration::load(dir.path()).unwrap();
        assert_eq!(loaded.name, "Decision Records");
        assert_eq!(loaded.card_key_prefix, "dec");
        assert_eq!(loaded.version, 0);
        assert_eq!(loaded.draft_version(), 1);
    }

    #[test]
    fn discover_walks_upward() {
        let dir = tempdir().unwrap();
        let cfg = ProjectConfiguration::new("Decision Records", "dec");
        cfg.save(dir.path()).unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let found = discover_project_root(&nested).unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn discover_fails_without_config() {
        let dir = tempdir().unwrap();
        assert!(discover_project_root(dir.path()).is_err());
    }

    #[test]
    fn module_prefix_lookup() {
        let mut cfg = ProjectConfiguration::new("Decision Records", "dec");
        cfg.modules.push(ModuleEntry {
            name: "shared".into(),
            location: "https://example.invalid/shared.git".into(),
            branch: None,
            private: None,
            card_key_prefix: "shr".into(),
        });
        assert!(cfg.has_module_prefix("shr"));
        assert!(!cfg.has_module_prefix("dec"));
        assert_eq!(cfg.module_prefixes(), vec!["shr".to_string()]);
    }
}
