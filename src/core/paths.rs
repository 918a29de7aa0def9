//! Pure functions mapping a project root and draft/published version number
//! to on-disk paths. Nothing here touches the filesystem; callers
//! create/read through `fsutil`.

use std::path::{Path, PathBuf};

/// The nine resource kinds laid out under `.cards/local/<v>/<kind>/`.
pub const RESOURCE_KIND_DIRS: &[&str] = &[
    "cardTypes",
    "fieldTypes",
    "workflows",
    "linkTypes",
    "templates",
    "reports",
    "graphModels",
    "graphViews",
    "calculations",
];

pub fn cards_root(project_root: &Path) -> PathBuf {
    project_root.join(".cards")
}

pub fn local_root(project_root: &Path) -> PathBuf {
    cards_root(project_root).join("local")
}

pub fn config_path(project_root: &Path) -> PathBuf {
    local_root(project_root).join("cardsConfig.json")
}

pub fn lock_path(project_root: &Path) -> PathBuf {
    local_root(project_root).join(".lock")
}

pub fn version_root(project_root: &Path, version: u32) -> PathBuf {
    local_root(project_root).join(version.to_string())
}

pub fn schema_manifest_path(project_root: &Path, version: u32) -> PathBuf {
    version_root(project_root, version).join(".schema")
}

pub fn resource_kind_root(project_root: &Path, version: u32, kind: &str) -> PathBuf {
    version_root(project_root, version).join(kind)
}

/// `<v>/<kind>/<id>.json` for flat resources; folder resources use
/// `resource_folder` instead for their directory plus `resource_file`
/// for the sibling metadata file.
pub fn resource_file(project_root: &Path, version: u32, kind: &str, id: &str) -> PathBuf {
    resource_kind_root(project_root, version, kind).join(format!("{id}.json"))
}

/// `<v>/<kind>/<id>/` — folder resources (calculations, reports, templates,
/// graphModels, graphViews) additionally own this subfolder.
pub fn resource_folder(project_root: &Path, version: u32, kind: &str, id: &str) -> PathBuf {
    resource_kind_root(project_root, version, kind).join(id)
}

pub fn modules_root(project_root: &Path) -> PathBuf {
    cards_root(project_root).join("modules")
}

pub fn module_root(project_root: &Path, prefix: &str) -> PathBuf {
    modules_root(project_root).join(prefix)
}

pub fn migrations_root(project_root: &Path) -> PathBuf {
    local_root(project_root).join("migrations")
}

pub fn migration_log_path(project_root: &Path, version: u32) -> PathBuf {
    migrations_root(project_root)
        .join(version.to_string())
        .join("migrationLog.jsonl")
}

pub fn card_root(project_root: &Path) -> PathBuf {
    project_root.join("cardRoot")
}

pub fn calc_scratch_root(project_root: &Path) -> PathBuf {
    project_root.join(".calc")
}

pub fn card_folder_name(key: &str) -> String {
    key.to_string()
}

pub fn card_index_json(card_path: &Path) -> PathBuf {
    card_path.join("index.json")
}

pub fn card_index_adoc(card_path: &Path) -> PathBuf {
    card_path.join("index.adoc")
}

pub fn card_attachments_dir(card_path: &Path) -> PathBuf {
    card_path.join("a")
}

pub fn card_attachment_path(card_path: &Path, file_name: &str) -> PathBuf {
    card_attachments_dir(card_path).join(file_name)
}

/// Edit-session worktree path, `<project>/.cards/edit-sessions/<uuid>`.
pub fn edit_session_path(project_root: &Path, session_id: &str) -> PathBuf {
    cards_root(project_root).join("edit-sessions").join(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_spec_tree() {
        let root = Path::new("/tmp/proj");
        assert_eq!(config_path(root), Path::new("/tmp/proj/.cards/local/cardsConfig.json"));
        assert_eq!(
            resource_file(root, 1, "cardTypes", "decision"),
            Path::new("/tmp/proj/.cards/local/1/cardTypes/decision.json")
        );
        assert_eq!(
            resource_folder(root, 1, "templates", "decision"),
            Path::new("/tmp/proj/.cards/local/1/templates/decision")
        );
        assert_eq!(
            module_root(root, "dec"),
            Path::new("/tmp/proj/.cards/modules/dec")
        );
        assert_eq!(
            migration_log_path(root, 2),
            Path::new("/tmp/proj/.cards/local/migrations/2/migrationLog.jsonl")
        );
    }

    #[test]
    fn card_folder_layout() {
        let card_path = Path::new("/tmp/proj/cardRoot/dec_1");
        assert_eq!(card_index_json(card_path), card_path.join("index.json"));
        assert_eq!(card_index_adoc(card_path), card_path.join("index.adoc"));
        assert_eq!(
            card_attachment_path(card_path, "diagram.png"),
            card_path.join("a/diagram.png")
        );
    }
}
