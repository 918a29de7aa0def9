//! The project container (spec §4.4 "Project container"): aggregates the
//! card cache, resource cache, configuration, validator, and write lock.
//! Resource objects and commands only ever see a `&mut Project`; nothing
//! outside this module owns the caches directly (DESIGN NOTES §9 "cyclic
//! references" fix — the project owns the cache, the cache owns
//! resources).

use crate::cache::card_cache::CardCache;
use crate::cache::resource_cache::ResourceCache;
use crate::calc::engine::CalculationEngine;
use crate::config::ProjectConfiguration;
use crate::core::error::CyberismoError;
use crate::core::paths;
use crate::model::card::CardLocation;
use crate::validator::Validator;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The project-wide write lock from spec §5: every mutating command
/// acquires this for its entire duration; reads bypass it.
pub struct WriteLock(Mutex<()>);

impl WriteLock {
    fn new() -> Self {
        Self(Mutex::new(()))
    }

    /// Run `body` while holding the write lock, matching DESIGN NOTES §9's
    /// `withWriteLock(summary, fn)` helper: the helper (here, the caller
    /// of `with_write_lock`) is responsible for emitting the migration-log
    /// entry `body` returns, after `body` succeeds.
    pub fn with_write_lock<T>(
        &self,
        body: impl FnOnce() -> Result<T, CyberismoError>,
    ) -> Result<T, CyberismoError> {
        let _guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        body()
    }
}

pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfiguration,
    pub cards: CardCache,
    pub resources: ResourceCache,
    pub validator: Validator,
    pub calc: CalculationEngine,
    write_lock: WriteLock,
}

impl Project {
    /// Open an existing project: load configuration, populate both caches
    /// from disk, and build the calculation engine's base program.
    ///
    /// Writes an advisory lock file at `.cards/local/.lock` for the
    /// lifetime of this handle (spec §9 Open Questions: "an advisory lock
    /// file on `.cards/local/cardsConfig.json` is recommended"). The lock
    /// is advisory only — no OS-level file lock is taken, and a second
    /// process opening the same project is not prevented, only warned
    /// about by [`crate::doctor::run`].
    pub fn open(root: &Path) -> Result<Self, CyberismoError> {
        let config = ProjectConfiguration::load(root)?;
        Self::write_lock_file(root)?;
        let mut project = Self {
            root: root.to_path_buf(),
            config,
            cards: CardCache::new(),
            resources: ResourceCache::new(),
            validator: Validator::new(),
            calc: CalculationEngine::new(),
            write_lock: WriteLock::new(),
        };
        project.reload()?;
        Ok(project)
    }

    fn write_lock_file(root: &Path) -> Result<(), CyberismoError> {
        let path = paths::lock_path(root);
        crate::core::fsutil::write_atomic_str(
            &path,
            &format!("{}\n{}\n", std::process::id(), crate::core::time::now_rfc3339()),
        )
    }

    /// Re-populate both caches from disk and rebuild the calculation
    /// engine's base program. Used at startup and after `publishDraft`
    /// opens a new draft folder.
    pub fn reload(&mut self) -> Result<(), CyberismoError> {
        self.cards = CardCache::new();
        self.cards
            .populate_from_path(&paths::card_root(&self.root), crate::model::card::ROOT, CardLocation::Project)?;
        for template in self.local_template_identifiers()? {
            let template_root = paths::resource_folder(&self.root, self.draft_version(), "templates", &template);
            self.cards
                .populate_from_path(&template_root, crate::model::card::ROOT, CardLocation::Template(template))?;
        }
        self.cards.populate_children_relationships();

        self.resources = ResourceCache::new();
        self.resources
            .populate(&self.root, self.draft_version(), &self.config.module_prefixes())?;
        self.resources.rekey_local_prefix(&self.config.card_key_prefix);

        self.calc.generate(&self.cards, &self.resources, &self.config, None)?;
        Ok(())
    }

    fn local_template_identifiers(&self) -> Result<Vec<String>, CyberismoError> {
        let templates_root = paths::resource_kind_root(&self.root, self.draft_version(), "templates");
        if !templates_root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&templates_root).map_err(|e| CyberismoError::filesystem(&templates_root, e))? {
            let entry = entry.map_err(|e| CyberismoError::filesystem(&templates_root, e))?;
            if entry.path().is_dir() {
                out.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(out)
    }

    pub fn draft_version(&self) -> u32 {
        self.config.draft_version()
    }

    pub fn published_version(&self) -> u32 {
        self.config.version
    }

    pub fn write_lock(&self) -> &WriteLock {
        &self.write_lock
    }

    /// Create a brand-new project on disk: config, nine resource-kind
    /// folders (each with a `.schema` manifest) under the first draft
    /// version, and an empty migration log — spec §8 scenario S1.
    pub fn init(root: &Path, name: &str, card_key_prefix: &str) -> Result<Self, CyberismoError> {
        if paths::config_path(root).exists() {
            return Err(CyberismoError::Conflict(format!(
                "project already exists at {}",
                root.display()
            )));
        }
        let config = ProjectConfiguration::new(name, card_key_prefix);
        config.save(root)?;

        let draft = config.draft_version();
        for kind in paths::RESOURCE_KIND_DIRS {
            let kind_root = paths::resource_kind_root(root, draft, kind);
            std::fs::create_dir_all(&kind_root).map_err(|e| CyberismoError::filesystem(&kind_root, e))?;
        }
        let manifest = serde_json::json!([{
            "id": "cyberismo/schemas/project.json",
            "version": crate::config::CURRENT_SCHEMA_VERSION,
        }]);
        crate::core::fsutil::write_atomic_str(
            &paths::schema_manifest_path(root, draft),
            &serde_json::to_string_pretty(&manifest)?,
        )?;
        crate::migration_log::ensure_empty_log(root, draft)?;
        std::fs::create_dir_all(paths::card_root(root)).map_err(|e| CyberismoError::filesystem(root, e))?;
        crate::core::fsutil::write_atomic_str(
            &root.join(".gitignore"),
            &crate::assets::default_gitignore(),
        )?;

        Self::open(root)
    }
}

impl Drop for Project {
    /// Best-effort removal of the advisory lock file written by `open`.
    /// Failure to remove it is not itself an error condition — the next
    /// `open` simply overwrites it.
    fn drop(&mut self) {
        let _ = std::fs::remove_file(paths::lock_path(&self.root));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_creates_expected_layout() {
        let dir = tempdir().unwrap();
        let project = Project::init(dir.path(), "Decision Records", "dec").unwrap();
        assert_eq!(project.config.name, "Decision Records");
        assert_eq!(project.published_version(), 0);
        assert_eq!(project.draft_version(), 1);
        for kind in paths::RESOURCE_KIND_DIRS {
            assert!(paths::resource_kind_root(dir.path(), 1, kind).is_dir());
        }
        assert!(paths::migration_log_path(dir.path(), 1).exists());
    }

    #[test]
    fn init_twice_conflicts() {
        let dir = tempdir().unwrap();
        Project::init(dir.path(), "Decision Records", "dec").unwrap();
        assert!(matches!(
            Project::init(dir.path(), "Decision Records", "dec"),
            Err(CyberismoError::Conflict(_))
        ));
    }

    #[test]
    fn open_populates_empty_caches() {
        let dir = tempdir().unwrap();
        Project::init(dir.path(), "Decision Records", "dec").unwrap();
        let project = Project::open(dir.path()).unwrap();
        assert_eq!(project.cards.len(), 0);
    }

    #[test]
    fn open_writes_and_drop_removes_advisory_lock() {
        let dir = tempdir().unwrap();
        Project::init(dir.path(), "Decision Records", "dec").unwrap();
        {
            let _project = Project::open(dir.path()).unwrap();
            assert!(paths::lock_path(dir.path()).is_file());
        }
        assert!(!paths::lock_path(dir.path()).exists());
    }
}
