//! The resource object contract (spec §4.3): `create/read/update/rename/
//! delete/show/usage/validate`, implemented once via exhaustive matching
//! over the [`Resource`] variant rather than one class per kind (DESIGN
//! NOTES §9 "dynamic resource dispatch" -> "tagged variant, capability set
//! implemented per variant").
//!
//! Every function here is a free function taking the caches and paths it
//! needs explicitly; nothing is a method on `Resource` itself, so the
//! model stays free of filesystem and cache concerns (DESIGN NOTES §9
//! "cyclic references" fix).

use crate::cache::card_cache::CardCache;
use crate::cache::resource_cache::{RegistryEntry, ResourceCache, ResourceSource};
use crate::core::error::CyberismoError;
use crate::core::fsutil;
use crate::core::paths;
use crate::model::field_type::FieldType;
use crate::model::resource::{self, Resource, UpdateOp};
use crate::model::resource_name::ResourceName;
use crate::model::workflow::Workflow;
use crate::validator::Validator;
use serde_json::Value as JsonValue;
use std::path::Path;

/// Create a resource on disk and register it with the cache. Refuses if a
/// resource of the same fully-qualified name already exists.
pub fn create(
    cache: &mut ResourceCache,
    project_root: &Path,
    version: u32,
    resource: &Resource,
) -> Result<(), CyberismoError> {
    let name = resource.name();
    if cache.contains(&name.to_string()) {
        return Err(CyberismoError::Conflict(format!("resource '{name}' already exists")));
    }
    let kind_root = paths::resource_kind_root(project_root, version, &name.kind);
    let metadata_path = kind_root.join(format!("{}.json", name.identifier));
    let json = resource.payload_json()?;
    fsutil::write_atomic_str(&metadata_path, &serde_json::to_string_pretty(&json)?)?;

    if resource.is_folder_resource() {
        let folder_path = kind_root.join(&name.identifier);
        let files = resource.content_files().cloned().unwrap_or_default();
        if files.is_empty() {
            for file_name in resource::canonical_content_files(&name.kind) {
                fsutil::write_atomic_str(&folder_path.join(file_name), "")?;
            }
        } else {
            for (file_name, content) in &files {
                fsutil::write_atomic_str(&folder_path.join(file_name), content)?;
            }
        }
    }

    cache.add_resource(RegistryEntry {
        name: name.clone(),
        source: ResourceSource::Local,
        module_name: None,
        kind_root,
    });
    Ok(())
}

/// Reload a resource from disk, discarding any cached instance.
pub fn read<'a>(cache: &'a mut ResourceCache, full_name: &str) -> Result<&'a Resource, CyberismoError> {
    cache.invalidate_resource(full_name);
    cache.by_name(full_name)
}

/// Apply one of the four update operations (add/change/rank/remove) to a
/// resource's JSON payload and persist it. Returns the updated payload so
/// the caller can re-hydrate the typed `Resource`. Refuses module
/// resources: only the owning project may mutate its own resources.
pub fn update(
    cache: &mut ResourceCache,
    project_root: &Path,
    version: u32,
    project_prefix: &str,
    full_name: &str,
    op: &UpdateOp,
) -> Result<JsonValue, CyberismoError> {
    let resource = cache.by_name(full_name)?;
    let name = resource.name().clone();
    if name.is_module_resource(project_prefix) {
        return Err(CyberismoError::PermissionDenied(format!(
            "'{full_name}' belongs to an imported module and cannot be modified"
        )));
    }
    let mut payload = resource.payload_json()?;
    apply_update_op(&mut payload, op)?;

    let kind_root = paths::resource_kind_root(project_root, version, &name.kind);
    let metadata_path = kind_root.join(format!("{}.json", name.identifier));
    fsutil::write_atomic_str(&metadata_path, &serde_json::to_string_pretty(&payload)?)?;
    cache.invalidate_resource(full_name);
    Ok(payload)
}

/// Split an update-op `target` into `(property, element_identity)`. A
/// bare property name (`"workflow"`) addresses a scalar; `"customFields
/// [severity]"` addresses the array element whose `name` (or, for plain
/// string arrays, own value) equals `severity`.
fn split_target(target: &str) -> (String, Option<String>) {
    if let Some(open) = target.find('[') {
        if let Some(close) = target.rfind(']') {
            if close > open {
                return (target[..open].to_string(), Some(target[open + 1..close].to_string()));
            }
        }
    }
    (target.to_string(), None)
}

fn element_identity(v: &JsonValue) -> String {
    if let Some(obj) = v.as_object() {
        if let Some(name) = obj.get("name").and_then(|n| n.as_str()) {
            return name.to_string();
        }
    }
    if let Some(s) = v.as_str() {
        return s.to_string();
    }
    v.to_string()
}

pub fn apply_update_op(payload: &mut JsonValue, op: &UpdateOp) -> Result<(), CyberismoError> {
    match op {
        UpdateOp::Add { target, value } => {
            let (prop, _) = split_target(target);
            let arr = array_field_mut(payload, &prop)?;
            if arr.iter().any(|existing| existing == value || element_identity(existing) == element_identity(value)) {
                return Err(CyberismoError::Conflict(format!("'{}' already contains a matching entry", prop)));
            }
            arr.push(value.clone());
            Ok(())
        }
        UpdateOp::Change { target, to } => {
            let (prop, elem) = split_target(target);
            match elem {
                Some(id) => {
                    let arr = array_field_mut(payload, &prop)?;
                    let idx = arr
                        .iter()
                        .position(|v| element_identity(v) == id)
                        .ok_or_else(|| CyberismoError::NotFound(format!("'{id}' in '{prop}'")))?;
                    arr[idx] = to.clone();
                    Ok(())
                }
                None => {
                    payload
                        .as_object_mut()
                        .ok_or_else(|| CyberismoError::InputValidation("payload is not an object".into()))?
                        .insert(prop, to.clone());
                    Ok(())
                }
            }
        }
        UpdateOp::Rank { target, new_index } => {
            let (prop, elem) = split_target(target);
            let id = elem.ok_or_else(|| {
                CyberismoError::InputValidation("rank requires an element selector, e.g. 'field[name]'".into())
            })?;
            let arr = array_field_mut(payload, &prop)?;
            let idx = arr
                .iter()
                .position(|v| element_identity(v) == id)
                .ok_or_else(|| CyberismoError::NotFound(format!("'{id}' in '{prop}'")))?;
            let item = arr.remove(idx);
            let clamped = (*new_index).min(arr.len());
            arr.insert(clamped, item);
            Ok(())
        }
        UpdateOp::Remove { target, replacement } => {
            let (prop, elem) = split_target(target);
            let id = elem.unwrap_or_else(|| prop.clone());
            let arr = array_field_mut(payload, &prop)?;
            let idx = arr.iter().position(|v| element_identity(v) == id);
            if let Some(idx) = idx {
                arr.remove(idx);
            }
            let _ = replacement; // rewriting other resources' references is the caller's job (see `rewrite_references`)
            Ok(())
        }
    }
}

fn array_field_mut<'a>(payload: &'a mut JsonValue, prop: &str) -> Result<&'a mut Vec<JsonValue>, CyberismoError> {
    payload
        .get_mut(prop)
        .and_then(|v| v.as_array_mut())
        .ok_or_else(|| CyberismoError::InputValidation(format!("'{prop}' is not an array property")))
}

/// Rename a resource: file rename on disk, cache rekey, and propagation of
/// every textual reference to the old fully-qualified name across local
/// calculation/Handlebars content files. Refuses module resources (an
/// imported module is immutable) and is a no-op on the resource's `kind`.
pub fn rename(
    cache: &mut ResourceCache,
    project_root: &Path,
    version: u32,
    project_prefix: &str,
    full_name: &str,
    new_identifier: &str,
) -> Result<ResourceName, CyberismoError> {
    let resource = cache.by_name(full_name)?;
    let old_name = resource.name().clone();
    if old_name.is_module_resource(project_prefix) {
        return Err(CyberismoError::PermissionDenied(format!(
            "'{full_name}' belongs to an imported module and cannot be renamed"
        )));
    }
    let new_name = ResourceName::new(&old_name.prefix, &old_name.kind, new_identifier)?;
    let kind_root = paths::resource_kind_root(project_root, version, &old_name.kind);
    let old_metadata = kind_root.join(format!("{}.json", old_name.identifier));
    let new_metadata = kind_root.join(format!("{}.json", new_identifier));
    std::fs::rename(&old_metadata, &new_metadata).map_err(|e| CyberismoError::filesystem(&new_metadata, e))?;

    if resource.is_folder_resource() {
        let old_folder = kind_root.join(&old_name.identifier);
        let new_folder = kind_root.join(new_identifier);
        if old_folder.exists() {
            std::fs::rename(&old_folder, &new_folder).map_err(|e| CyberismoError::filesystem(&new_folder, e))?;
        }
    }

    cache.change_resource_name(full_name, new_identifier)?;
    rewrite_references(project_root, version, &old_name.to_string(), &new_name.to_string())?;
    Ok(new_name)
}

/// Textually rewrite every occurrence of `old_full_name` to `new_full_name`
/// across every local folder resource's content files (Clingo `.lp` and
/// Handlebars `.hbs` files). Per DESIGN NOTES §9, the engine treats
/// section text as opaque and does this with plain string replacement
/// rather than parsing Clingo/Handlebars.
pub fn rewrite_references(
    project_root: &Path,
    version: u32,
    old_full_name: &str,
    new_full_name: &str,
) -> Result<(), CyberismoError> {
    for kind in crate::model::resource_name::RESOURCE_KINDS
        .iter()
        .filter(|k| crate::model::resource_name::is_folder_resource_kind(k))
    {
        let kind_root = paths::resource_kind_root(project_root, version, kind);
        if !kind_root.exists() {
            continue;
        }
        for entry in std::fs::read_dir(&kind_root).map_err(|e| CyberismoError::filesystem(&kind_root, e))? {
            let entry = entry.map_err(|e| CyberismoError::filesystem(&kind_root, e))?;
            let folder = entry.path();
            if !folder.is_dir() {
                continue;
            }
            rewrite_folder(&folder, old_full_name, new_full_name)?;
        }
    }
    Ok(())
}

fn rewrite_folder(folder: &Path, old: &str, new: &str) -> Result<(), CyberismoError> {
    for entry in std::fs::read_dir(folder).map_err(|e| CyberismoError::filesystem(folder, e))? {
        let entry = entry.map_err(|e| CyberismoError::filesystem(folder, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_template_payload = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "lp" || e == "hbs" || e == "adoc")
            .unwrap_or(false);
        if !is_template_payload {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(|e| CyberismoError::filesystem(&path, e))?;
        if content.contains(old) {
            fsutil::write_atomic_str(&path, &content.replace(old, new))?;
        }
    }
    Ok(())
}

/// Delete a resource. Refuses when `usage()` is non-empty, or when the
/// resource belongs to an imported module.
pub fn delete(
    cache: &mut ResourceCache,
    cards: &CardCache,
    project_root: &Path,
    version: u32,
    project_prefix: &str,
    full_name: &str,
) -> Result<(), CyberismoError> {
    let resource = cache.by_name(full_name)?;
    if resource.name().is_module_resource(project_prefix) {
        return Err(CyberismoError::PermissionDenied(format!(
            "'{full_name}' belongs to an imported module and cannot be deleted"
        )));
    }
    let used_by = usage(cache, cards, full_name)?;
    if !used_by.is_empty() {
        return Err(CyberismoError::Conflict(format!(
            "'{full_name}' is still referenced by: {}",
            used_by.join(", ")
        )));
    }
    let resource = cache.by_name(full_name)?;
    let name = resource.name().clone();
    let kind_root = paths::resource_kind_root(project_root, version, &name.kind);
    fsutil::remove_recursive(&kind_root.join(format!("{}.json", name.identifier)))?;
    if resource.is_folder_resource() {
        fsutil::remove_recursive(&kind_root.join(&name.identifier))?;
    }
    cache.remove_resource(full_name);
    Ok(())
}

/// Card keys and resource names that reference `full_name` by textual
/// match: a card type naming this workflow/field type, a card naming this
/// card type, a card's link naming this link type, or a folder resource's
/// content file containing the name literally.
pub fn usage(cache: &mut ResourceCache, cards: &CardCache, full_name: &str) -> Result<Vec<String>, CyberismoError> {
    let mut used_by = Vec::new();

    for card in cards.get_cards() {
        if card.metadata.card_type == full_name {
            used_by.push(card.key.clone());
            continue;
        }
        if card.metadata.links.iter().any(|l| l.link_type == full_name) {
            used_by.push(card.key.clone());
        }
    }

    let registry_names: Vec<String> = cache.registry_entries().map(|e| e.name.to_string()).collect();
    for name in registry_names {
        if name == full_name {
            continue;
        }
        let resource = cache.by_name(&name)?;
        if let Resource::CardType { payload, .. } = resource {
            if payload.workflow == full_name || payload.custom_fields.iter().any(|f| f.data_type == full_name) {
                used_by.push(name.clone());
                continue;
            }
        }
        if let Some(files) = resource.content_files() {
            if files.values().any(|content| content.contains(full_name)) {
                used_by.push(name.clone());
            }
        }
    }
    Ok(used_by)
}

/// Validate a resource's metadata payload against its JSON schema and any
/// kind-specific invariant (workflow state-machine shape, field-type enum
/// requirement).
pub fn validate(validator: &Validator, resource: &Resource) -> Result<(), CyberismoError> {
    let payload = resource.payload_json()?;
    validator.validate(resource.kind(), &payload)?;
    match resource {
        Resource::Workflow { payload, .. } => payload.validate(),
        Resource::FieldType { payload, .. } => payload.validate(),
        _ => Ok(()),
    }
}

/// Re-parse a resource's payload as a typed value of kind `T`, used by
/// callers that already know the kind (e.g. the transition command needs
/// a `Workflow`).
pub fn payload_as_workflow(resource: &Resource) -> Result<&Workflow, CyberismoError> {
    match resource {
        Resource::Workflow { payload, .. } => Ok(payload),
        other => Err(CyberismoError::InputValidation(format!(
            "'{}' is not a workflow",
            other.name()
        ))),
    }
}

pub fn payload_as_field_type(resource: &Resource) -> Result<&FieldType, CyberismoError> {
    match resource {
        Resource::FieldType { payload, .. } => Ok(payload),
        other => Err(CyberismoError::InputValidation(format!(
            "'{}' is not a field type",
            other.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_target_parses_element_selector() {
        assert_eq!(split_target("workflow"), ("workflow".to_string(), None));
        assert_eq!(
            split_target("customFields[severity]"),
            ("customFields".to_string(), Some("severity".to_string()))
        );
    }

    #[test]
    fn apply_add_rejects_duplicate() {
        let mut payload = serde_json::json!({ "labels": ["a"] });
        let op = UpdateOp::Add { target: "labels".into(), value: serde_json::json!("a") };
        assert!(apply_update_op(&mut payload, &op).is_err());
    }

    #[test]
    fn apply_change_scalar() {
        let mut payload = serde_json::json!({ "workflow": "dec/workflows/old" });
        let op = UpdateOp::Change { target: "workflow".into(), to: serde_json::json!("dec/workflows/new") };
        apply_update_op(&mut payload, &op).unwrap();
        assert_eq!(payload["workflow"], "dec/workflows/new");
    }

    #[test]
    fn apply_rank_moves_element() {
        let mut payload = serde_json::json!({ "customFields": [{"name":"a"},{"name":"b"},{"name":"c"}] });
        let op = UpdateOp::Rank { target: "customFields[c]".into(), new_index: 0 };
        apply_update_op(&mut payload, &op).unwrap();
        assert_eq!(payload["customFields"][0]["name"], "c");
    }

    #[test]
    fn apply_remove_drops_matching_element() {
        let mut payload = serde_json::json!({ "customFields": [{"name":"a"},{"name":"b"}] });
        let op = UpdateOp::Remove { target: "customFields[a]".into(), replacement: None };
        apply_update_op(&mut payload, &op).unwrap();
        assert_eq!(payload["customFields"].as_array().unwrap().len(), 1);
        assert_eq!(payload["customFields"][0]["name"], "b");
    }
}
