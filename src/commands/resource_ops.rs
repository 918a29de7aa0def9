//! Project-wide and resource-shaped commands: the resource half of
//! `remove`, `importModule`, project `rename`, `validate`, and
//! `publishDraft` (spec §4.4).

use crate::core::error::CyberismoError;
use crate::core::paths;
use crate::migration_log::Operation;
use crate::project::Project;

/// The resource half of `remove`: refuses while still referenced
/// (`resources::usage`), refuses for module resources.
pub fn remove_resource(project: &mut Project, full_name: &str) -> Result<(), CyberismoError> {
    project.write_lock().with_write_lock(|| {
        crate::resources::delete(
            &mut project.resources,
            &project.cards,
            &project.root,
            project.draft_version(),
            &project.config.card_key_prefix,
            full_name,
        )?;
        project.calc.generate(&project.cards, &project.resources, &project.config, None)?;
        commands_record(project, Operation::ResourceDelete, full_name, None)
    })
}

/// `importModule(location, branch?)`: clone a module's repository into
/// `.cards/modules/<prefix>`, register it in the project configuration,
/// and reload the resource cache so its resources become visible with
/// `ResourceSource::Module`.
pub fn import_module(
    project: &mut Project,
    location: &str,
    branch: Option<&str>,
) -> Result<String, CyberismoError> {
    project.write_lock().with_write_lock(|| {
        let scratch = tempfile::tempdir().map_err(|e| CyberismoError::filesystem(std::env::temp_dir(), e))?;
        clone_module(location, branch, scratch.path())?;
        let module_config = crate::config::ProjectConfiguration::load(scratch.path()).map_err(|_| {
            CyberismoError::InputValidation(format!("'{location}' is not a cyberismo project"))
        })?;
        let prefix = module_config.card_key_prefix.clone();
        if project.config.has_module_prefix(&prefix) || prefix == project.config.card_key_prefix {
            return Err(CyberismoError::Conflict(format!(
                "card key prefix '{prefix}' is already in use"
            )));
        }

        let dest = paths::module_root(&project.root, &prefix);
        if dest.exists() {
            return Err(CyberismoError::Conflict(format!("module '{prefix}' is already imported")));
        }
        crate::core::fsutil::copy_recursive(scratch.path(), &dest)?;

        project.config.modules.push(crate::config::ModuleEntry {
            name: module_config.name.clone(),
            location: location.to_string(),
            branch: branch.map(str::to_string),
            private: None,
            card_key_prefix: prefix.clone(),
        });
        project.config.save(&project.root)?;
        project.reload()?;

        commands_record(
            project,
            Operation::ModuleAdd,
            &prefix,
            Some(serde_json::json!({ "location": location, "branch": branch })),
        )?;
        Ok(prefix)
    })
}

fn clone_module(location: &str, branch: Option<&str>, into: &std::path::Path) -> Result<(), CyberismoError> {
    let mut builder = git2::build::RepoBuilder::new();
    if let Some(branch) = branch {
        builder.branch(branch);
    }
    builder
        .clone(location, into)
        .map_err(|e| CyberismoError::InputValidation(format!("cloning '{location}' failed: {e}")))?;
    Ok(())
}

pub fn remove_module(project: &mut Project, prefix: &str) -> Result<(), CyberismoError> {
    project.write_lock().with_write_lock(|| {
        let before = project.config.modules.len();
        project.config.modules.retain(|m| m.card_key_prefix != prefix);
        if project.config.modules.len() == before {
            return Err(CyberismoError::NotFound(format!("module '{prefix}'")));
        }
        crate::core::fsutil::remove_recursive(&paths::module_root(&project.root, prefix))?;
        project.config.save(&project.root)?;
        project.reload()?;
        commands_record(project, Operation::ModuleRemove, prefix, None)
    })
}

/// `rename(newPrefix)`: rewrite the project's own card key prefix across
/// every local card key and local resource's fully-qualified name.
/// Module resources and their prefixes are untouched.
pub fn rename_project(project: &mut Project, new_prefix: &str) -> Result<(), CyberismoError> {
    let old_prefix = project.config.card_key_prefix.clone();
    if old_prefix == new_prefix {
        return Ok(());
    }
    if project.config.has_module_prefix(new_prefix) {
        return Err(CyberismoError::Conflict(format!(
            "'{new_prefix}' is already used by an imported module"
        )));
    }

    project.write_lock().with_write_lock(|| {
        rename_card_tree(project, &old_prefix, new_prefix)?;

        for kind in paths::RESOURCE_KIND_DIRS {
            let kind_root = paths::resource_kind_root(&project.root, project.draft_version(), kind);
            if !kind_root.exists() {
                continue;
            }
            rewrite_prefix_in_tree(&kind_root, &old_prefix, new_prefix)?;
        }

        project.config.card_key_prefix = new_prefix.to_string();
        project.config.save(&project.root)?;
        project.reload()?;

        commands_record(
            project,
            Operation::ProjectRename,
            &old_prefix,
            Some(serde_json::json!({ "newPrefix": new_prefix })),
        )
    })
}

fn rewrite_prefix_in_file(path: &std::path::Path, old_prefix: &str, new_prefix: &str) -> Result<(), CyberismoError> {
    let content = std::fs::read_to_string(path).map_err(|e| CyberismoError::filesystem(path, e))?;
    let old_marker = format!("{old_prefix}/");
    let new_marker = format!("{new_prefix}/");
    if content.contains(&old_marker) {
        crate::core::fsutil::write_atomic_str(path, &content.replace(&old_marker, &new_marker))?;
    }
    Ok(())
}

/// Recursively rewrite every `.json`/`.lp`/`.hbs`/`.adoc` file under `dir`,
/// descending into folder-resource content subdirectories (and, for
/// templates, their nested card trees) so a resource-reference rewrite
/// isn't limited to the kind root's own flat files.
fn rewrite_prefix_in_tree(dir: &std::path::Path, old_prefix: &str, new_prefix: &str) -> Result<(), CyberismoError> {
    for entry in std::fs::read_dir(dir).map_err(|e| CyberismoError::filesystem(dir, e))? {
        let entry = entry.map_err(|e| CyberismoError::filesystem(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            rewrite_prefix_in_tree(&path, old_prefix, new_prefix)?;
            continue;
        }
        let is_text = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e, "json" | "lp" | "hbs" | "adoc"))
            .unwrap_or(false);
        if !is_text {
            continue;
        }
        rewrite_prefix_in_file(&path, old_prefix, new_prefix)?;
    }
    Ok(())
}

/// Rewrite every project (non-template) card's `cardType` and
/// `links[].linkType`/`links[].cardKey` references from `old_prefix` to
/// `new_prefix`, and move each renamed card's on-disk folder to match its
/// new key.
///
/// Traversal is top-down, starting from `ROOT`'s children and following
/// each card's own `children` list while threading the *actual* current
/// on-disk path through the recursion. This avoids the bug a flat,
/// cache-order iteration has: once a parent folder is renamed, every
/// descendant's path captured before the rename is stale, because the
/// folder-rename of an ancestor moves the whole subtree beneath it.
fn rename_card_tree(project: &mut Project, old_prefix: &str, new_prefix: &str) -> Result<(), CyberismoError> {
    let roots: Vec<(String, std::path::PathBuf)> = project
        .cards
        .get_project_cards()
        .filter(|c| c.parent == crate::model::card::ROOT)
        .map(|c| (c.key.clone(), c.path.clone()))
        .collect();
    for (key, path) in roots {
        rename_card_subtree(project, old_prefix, new_prefix, &key, &path)?;
    }
    Ok(())
}

fn rename_card_subtree(
    project: &mut Project,
    old_prefix: &str,
    new_prefix: &str,
    key: &str,
    current_path: &std::path::Path,
) -> Result<(), CyberismoError> {
    let old_marker = format!("{old_prefix}_");
    let children: Vec<String> = project
        .cards
        .get_card(key)
        .map(|c| c.children.clone())
        .unwrap_or_default();

    let new_path = if let Some(rest) = key.strip_prefix(&old_marker) {
        let new_key = format!("{new_prefix}_{rest}");
        let new_path = current_path
            .parent()
            .expect("card path has a parent")
            .join(&new_key);
        std::fs::rename(current_path, &new_path).map_err(|e| CyberismoError::filesystem(&new_path, e))?;
        new_path
    } else {
        current_path.to_path_buf()
    };

    rewrite_card_metadata_prefix(&paths::card_index_json(&new_path), old_prefix, new_prefix)?;

    for child_key in children {
        let child_current_path = new_path.join(&child_key);
        rename_card_subtree(project, old_prefix, new_prefix, &child_key, &child_current_path)?;
    }
    Ok(())
}

/// Rewrite a single card's `index.json`: `cardType` and `links[].linkType`
/// (fully-qualified resource names, `<prefix>/<kind>/<id>`) and
/// `links[].cardKey` (a card key, `<prefix>_<suffix>`).
fn rewrite_card_metadata_prefix(
    index_json: &std::path::Path,
    old_prefix: &str,
    new_prefix: &str,
) -> Result<(), CyberismoError> {
    let content = std::fs::read_to_string(index_json).map_err(|e| CyberismoError::filesystem(index_json, e))?;
    let mut value: serde_json::Value = serde_json::from_str(&content)?;
    let old_res_marker = format!("{old_prefix}/");
    let new_res_marker = format!("{new_prefix}/");
    let old_key_marker = format!("{old_prefix}_");
    let mut changed = false;

    let card_type = value.get("cardType").and_then(|v| v.as_str()).map(str::to_string);
    if let Some(card_type) = card_type {
        if let Some(rest) = card_type.strip_prefix(&old_res_marker) {
            value["cardType"] = serde_json::Value::String(format!("{new_res_marker}{rest}"));
            changed = true;
        }
    }

    if let Some(links) = value.get_mut("links").and_then(|v| v.as_array_mut()) {
        for link in links.iter_mut() {
            let link_type = link.get("linkType").and_then(|v| v.as_str()).map(str::to_string);
            if let Some(link_type) = link_type {
                if let Some(rest) = link_type.strip_prefix(&old_res_marker) {
                    link["linkType"] = serde_json::Value::String(format!("{new_res_marker}{rest}"));
                    changed = true;
                }
            }
            let card_key = link.get("cardKey").and_then(|v| v.as_str()).map(str::to_string);
            if let Some(card_key) = card_key {
                if let Some(rest) = card_key.strip_prefix(&old_key_marker) {
                    link["cardKey"] = serde_json::Value::String(format!("{new_prefix}_{rest}"));
                    changed = true;
                }
            }
        }
    }

    if changed {
        crate::core::fsutil::write_atomic_str(index_json, &serde_json::to_string_pretty(&value)?)?;
    }
    Ok(())
}

/// `validate()`: schema-validate every local resource, then cross-check
/// workflow/card-type/field-type/link-type references via the builtin
/// `validate` Clingo query (spec §4.4 "schema validation plus Clingo
/// cross-reference").
pub fn validate(project: &mut Project) -> Result<Vec<String>, CyberismoError> {
    let mut problems = Vec::new();
    let names: Vec<String> = project
        .resources
        .resources("cardTypes", crate::cache::ResourceFilter::Local)
        .iter()
        .map(|e| e.name.to_string())
        .chain(
            project
                .resources
                .resources("workflows", crate::cache::ResourceFilter::Local)
                .iter()
                .map(|e| e.name.to_string()),
        )
        .chain(
            project
                .resources
                .resources("fieldTypes", crate::cache::ResourceFilter::Local)
                .iter()
                .map(|e| e.name.to_string()),
        )
        .chain(
            project
                .resources
                .resources("linkTypes", crate::cache::ResourceFilter::Local)
                .iter()
                .map(|e| e.name.to_string()),
        )
        .collect();

    for name in names {
        let resource = project.resources.by_name(&name)?;
        if let Err(e) = crate::resources::validate(&project.validator, resource) {
            problems.push(format!("{name}: {e}"));
        }
        if let Ok(workflow) = crate::resources::payload_as_workflow(project.resources.by_name(&name)?) {
            if let Err(e) = workflow.validate() {
                problems.push(format!("{name}: {e}"));
            }
        }
    }

    if let Some(template) = crate::assets::builtin_query_template("validate") {
        let facts = project.calc.run_query("validate", &template, &serde_json::json!({}), |facts| facts.to_vec())?;
        for fact in facts {
            if fact.predicate == "invalid" {
                problems.push(fact.args.join(" "));
            }
        }
    }
    Ok(problems)
}

/// `publishDraft()`: the current draft becomes the published version;
/// bump `version`, seed the next draft's version folder from it, and
/// start a fresh migration log for the new draft. Refuses when the draft's
/// migration log is empty (spec §4.4: "requires `latestVersion >
/// publishedVersion` and a non-empty migration log for `latestVersion`").
pub fn publish_draft(project: &mut Project) -> Result<u32, CyberismoError> {
    project.write_lock().with_write_lock(|| {
        let published = project.draft_version();
        if crate::migration_log::read_all(&project.root, published)?.is_empty() {
            return Err(CyberismoError::InvariantViolation(format!(
                "draft version {published} has no migration-log entries to publish"
            )));
        }
        let next_draft_root = paths::version_root(&project.root, published + 1);
        let current_draft_root = paths::version_root(&project.root, published);
        crate::core::fsutil::copy_recursive(&current_draft_root, &next_draft_root)?;

        project.config.version = published;
        project.config.save(&project.root)?;
        crate::migration_log::ensure_empty_log(&project.root, project.draft_version())?;
        project.reload()?;

        commands_record(project, Operation::ResourceUpdate, "project", Some(serde_json::json!({ "published": published })))?;
        Ok(published)
    })
}

fn commands_record(
    project: &Project,
    operation: Operation,
    target: &str,
    parameters: Option<serde_json::Value>,
) -> Result<(), CyberismoError> {
    crate::commands::record(project, operation, target, parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_prefix_only_matches_slash_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cardType.json");
        std::fs::write(&path, r#"{"workflow":"dec/workflows/decision"}"#).unwrap();
        rewrite_prefix_in_file(&path, "dec", "rec").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("rec/workflows/decision"));
    }

    #[test]
    fn rewrite_card_metadata_prefix_rewrites_card_type_and_links() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "title": "Decide on X",
                "cardType": "dec/cardTypes/decision",
                "workflowState": "Draft",
                "rank": "0|m",
                "labels": [],
                "links": [{"linkType": "dec/linkTypes/blocks", "cardKey": "dec_2"}],
                "lastUpdated": "2025-01-01T00:00:00.000Z",
            })
            .to_string(),
        )
        .unwrap();
        rewrite_card_metadata_prefix(&path, "dec", "pol").unwrap();
        let rewritten: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten["cardType"], "pol/cardTypes/decision");
        assert_eq!(rewritten["links"][0]["linkType"], "pol/linkTypes/blocks");
        assert_eq!(rewritten["links"][0]["cardKey"], "pol_2");
    }

    fn write_card(path: &std::path::Path, card_type: &str, links: serde_json::Value) {
        std::fs::create_dir_all(path).unwrap();
        std::fs::write(
            path.join("index.json"),
            serde_json::json!({
                "title": "Decide on X",
                "cardType": card_type,
                "workflowState": "Draft",
                "rank": "0|m",
                "labels": [],
                "links": links,
                "lastUpdated": "2025-01-01T00:00:00.000Z",
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(path.join("index.adoc"), "content").unwrap();
    }

    #[test]
    fn rename_project_rewrites_nested_card_tree_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::init(dir.path(), "Decision Records", "dec").unwrap();

        let card_root = paths::card_root(&project.root);
        write_card(
            &card_root.join("dec_1"),
            "dec/cardTypes/decision",
            serde_json::json!([{"linkType": "dec/linkTypes/blocks", "cardKey": "dec_2"}]),
        );
        write_card(
            &card_root.join("dec_1").join("dec_2"),
            "dec/cardTypes/decision",
            serde_json::json!([]),
        );
        project.reload().unwrap();

        rename_project(&mut project, "pol").unwrap();

        let new_parent = card_root.join("pol_1");
        let new_child = new_parent.join("pol_2");
        assert!(new_parent.join("index.json").is_file());
        assert!(new_child.join("index.json").is_file());
        assert!(!card_root.join("dec_1").exists());

        let parent_meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(new_parent.join("index.json")).unwrap()).unwrap();
        assert_eq!(parent_meta["cardType"], "pol/cardTypes/decision");
        assert_eq!(parent_meta["links"][0]["linkType"], "pol/linkTypes/blocks");
        assert_eq!(parent_meta["links"][0]["cardKey"], "pol_2");

        let child_meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(new_child.join("index.json")).unwrap()).unwrap();
        assert_eq!(child_meta["cardType"], "pol/cardTypes/decision");

        assert_eq!(project.config.card_key_prefix, "pol");
    }

    #[test]
    fn publish_draft_refuses_empty_migration_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::init(dir.path(), "Decision Records", "dec").unwrap();
        assert!(matches!(
            publish_draft(&mut project),
            Err(CyberismoError::InvariantViolation(_))
        ));
    }

    #[test]
    fn publish_draft_succeeds_after_a_logged_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::init(dir.path(), "Decision Records", "dec").unwrap();
        commands_record(&project, Operation::ResourceCreate, "dec_1", None).unwrap();
        let published = publish_draft(&mut project).unwrap();
        assert_eq!(published, 1);
        assert_eq!(project.published_version(), 1);
        assert_eq!(project.draft_version(), 2);
    }
}
