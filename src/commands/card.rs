//! Card-shaped commands: `createCard`, `editCardContent`,
//! `editCardMetadata`, `moveCard`, `createLink`/`removeLink`, and the
//! card half of `remove` (spec §4.4).

use crate::cache::card_cache::CardCache;
use crate::commands::{self, ReverseJournal};
use crate::core::error::CyberismoError;
use crate::core::lexorank;
use crate::core::paths;
use crate::migration_log::Operation;
use crate::model::card::{Card, CardLocation, CardMetadata, CardLink, ROOT};
use crate::model::resource::Resource;
use crate::project::Project;
use std::collections::HashMap;

/// Instantiate every card in `template_name` under `parent_key` (or
/// `ROOT`), returning the new keys with template roots first, sorted by
/// rank (spec §4.4 `createCard`).
pub fn create_card(
    project: &mut Project,
    template_name: &str,
    parent_key: Option<&str>,
) -> Result<Vec<String>, CyberismoError> {
    let parent = parent_key.unwrap_or(ROOT).to_string();
    if parent != ROOT {
        let parent_card = project
            .cards
            .get_card(&parent)
            .ok_or_else(|| CyberismoError::NotFound(format!("card '{parent}'")))?;
        if matches!(parent_card.location, CardLocation::Template(_)) {
            return Err(CyberismoError::PermissionDenied(format!(
                "'{parent}' is inside a template and cannot receive new cards"
            )));
        }
    }

    let template_cards: Vec<Card> = project
        .cards
        .get_cards_in_template(template_name)
        .into_iter()
        .cloned()
        .collect();
    if template_cards.is_empty() {
        return Err(CyberismoError::NotFound(format!("template '{template_name}'")));
    }

    project.write_lock().with_write_lock(|| {
        let prefix = project.config.card_key_prefix.clone();
        let key_map: HashMap<String, String> = template_cards
            .iter()
            .map(|c| (c.key.clone(), crate::model::card::new_key(&prefix)))
            .collect();

        let mut roots: Vec<&Card> = template_cards.iter().filter(|c| c.parent == ROOT).collect();
        lexorank::sort_by_rank(&mut roots, |c| c.metadata.rank.clone());
        let root_old_order: Vec<String> = roots.iter().map(|c| c.key.clone()).collect();

        let mut dest_siblings: Vec<String> = sibling_ranks(&project.cards, &parent);
        let mut journal = ReverseJournal::new();
        let mut new_cards = Vec::with_capacity(template_cards.len());

        for old in &template_cards {
            let new_key = key_map.get(&old.key).expect("every template card is keyed").clone();
            let (new_parent, new_rank) = if old.parent == ROOT {
                let rank = lexorank::rank_last(&dest_siblings);
                dest_siblings.push(rank.clone());
                (parent.clone(), rank)
            } else {
                let mapped = key_map
                    .get(&old.parent)
                    .ok_or_else(|| CyberismoError::InvariantViolation(format!(
                        "template card '{}' has a parent outside the template", old.key
                    )))?
                    .clone();
                (mapped, old.metadata.rank.clone())
            };

            let mut metadata = old.metadata.clone();
            metadata.rank = new_rank;
            metadata.last_updated = crate::core::time::now_rfc3339();
            metadata.last_transitioned = None;

            let card_path = paths::card_root(&project.root).join(path_under(&template_cards, old, &key_map));
            let new_card = Card {
                key: new_key.clone(),
                path: card_path,
                parent: new_parent,
                children: Vec::new(),
                location: CardLocation::Project,
                metadata,
                content: old.content.clone(),
                attachments: old
                    .attachments
                    .iter()
                    .map(|a| crate::model::card::Attachment {
                        card: new_key.clone(),
                        path: a.path.clone(),
                        file_name: a.file_name.clone(),
                        mime_type: a.mime_type.clone(),
                    })
                    .collect(),
            };
            if let Err(e) = write_card_to_disk(&new_card, &mut journal) {
                journal.rollback();
                return Err(e);
            }
            new_cards.push(new_card);
        }

        for card in &new_cards {
            project.cards.insert_new(card.clone())?;
        }
        project.cards.populate_children_relationships();

        project.calc.handle_new_cards(&project.cards, &new_cards)?;
        let new_keys: Vec<String> = root_old_order.iter().map(|k| key_map[k].clone()).collect();
        let all_new_keys: Vec<String> = new_cards.iter().map(|c| c.key.clone()).collect();
        let updates = crate::permissions::collect_creation_updates(&mut project.calc, &all_new_keys)?;
        for update in updates {
            commands::apply_field_update(project, &update)?;
        }

        commands::record(
            project,
            Operation::ResourceCreate,
            template_name,
            Some(serde_json::json!({ "newCardKeys": new_keys, "parent": parent })),
        )?;
        Ok(new_keys)
    })
}

/// Nested path under the destination so a template's own subtree shape is
/// preserved on disk (`cardRoot/<root>/<child>/...`).
fn path_under(all: &[Card], card: &Card, key_map: &HashMap<String, String>) -> std::path::PathBuf {
    let mut segments = vec![key_map[&card.key].clone()];
    let mut cur = card;
    while cur.parent != ROOT {
        let Some(parent) = all.iter().find(|c| c.key == cur.parent) else { break };
        segments.push(key_map[&parent.key].clone());
        cur = parent;
    }
    segments.reverse();
    segments.into_iter().collect()
}

fn sibling_ranks(cards: &CardCache, parent: &str) -> Vec<String> {
    let mut ranks: Vec<String> = if parent == ROOT {
        cards.root_children().iter().filter_map(|k| cards.get_card(k)).map(|c| c.metadata.rank.clone()).collect()
    } else {
        cards
            .get_card(parent)
            .map(|p| p.children.iter().filter_map(|k| cards.get_card(k)).map(|c| c.metadata.rank.clone()).collect())
            .unwrap_or_default()
    };
    lexorank::sort_by_rank(&mut ranks, |r| r.clone());
    ranks
}

fn write_card_to_disk(card: &Card, journal: &mut ReverseJournal) -> Result<(), CyberismoError> {
    let index_json = paths::card_index_json(&card.path);
    journal.capture(&index_json);
    crate::core::fsutil::write_atomic_str(&index_json, &serde_json::to_string_pretty(&card.metadata)?)?;

    let index_adoc = paths::card_index_adoc(&card.path);
    journal.capture(&index_adoc);
    crate::core::fsutil::write_atomic_str(&index_adoc, &card.content)?;

    for attachment in &card.attachments {
        let dest = paths::card_attachment_path(&card.path, &attachment.file_name);
        journal.capture(&dest);
        crate::core::fsutil::copy_recursive(&attachment.path, &dest)?;
    }
    Ok(())
}

/// `editCardContent(key, newContent)`.
pub fn edit_card_content(project: &mut Project, key: &str, new_content: &str) -> Result<(), CyberismoError> {
    if !project.cards.has_card(key) {
        return Err(CyberismoError::NotFound(format!("card '{key}'")));
    }
    project.write_lock().with_write_lock(|| {
        let path = {
            let card = project.cards.get_card(key).expect("checked above");
            paths::card_index_adoc(&card.path)
        };
        let mut journal = ReverseJournal::new();
        journal.capture(&path);
        crate::core::fsutil::write_atomic_str(&path, new_content)?;
        project.cards.update_card_content(key, new_content.to_string())?;
        commands::record(project, Operation::ResourceUpdate, key, Some(serde_json::json!({ "field": "content" })))?;
        Ok(())
    })
}

/// `editCardMetadata(key, fieldKey, value)`. Fails on a calculated field:
/// only fields the card's card type declares in `customFields` are
/// directly user-editable (fields a calculation writes via `updateField`
/// are, by construction, never declared there).
pub fn edit_card_metadata(
    project: &mut Project,
    key: &str,
    field_key: &str,
    raw_value: &str,
) -> Result<(), CyberismoError> {
    let card_type_name = project
        .cards
        .get_card(key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?
        .metadata
        .card_type
        .clone();

    project.write_lock().with_write_lock(|| {
        let data_type = commands::field_data_type(project, &card_type_name, field_key).map_err(|_| {
            CyberismoError::PermissionDenied(format!(
                "'{field_key}' is not a directly editable field of '{card_type_name}'"
            ))
        })?;
        let value = crate::coercion::coerce(data_type, raw_value)?;

        crate::permissions::check_edit(&mut project.calc, key, field_key)?;

        let card = project.cards.get_card_mut(key).expect("checked above");
        card.metadata.custom_fields.insert(field_key.to_string(), value);
        card.metadata.last_updated = crate::core::time::now_rfc3339();
        commands::persist_card_metadata(project, key)?;
        commands::record(
            project,
            Operation::ResourceUpdate,
            key,
            Some(serde_json::json!({ "field": field_key })),
        )?;
        Ok(())
    })
}

/// `moveCard(key, destination)`.
pub fn move_card(project: &mut Project, key: &str, destination: &str) -> Result<(), CyberismoError> {
    let card = project
        .cards
        .get_card(key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
    if matches!(card.location, CardLocation::Template(_)) {
        return Err(CyberismoError::PermissionDenied("cannot move a card between project and template".into()));
    }
    if destination != ROOT {
        let dest_card = project
            .cards
            .get_card(destination)
            .ok_or_else(|| CyberismoError::NotFound(format!("card '{destination}'")))?;
        if matches!(dest_card.location, CardLocation::Template(_)) {
            return Err(CyberismoError::PermissionDenied("cannot move a card between project and template".into()));
        }
        if is_descendant_or_self(&project.cards, destination, key) {
            return Err(CyberismoError::InvariantViolation(format!(
                "moving '{key}' under '{destination}' would create a cycle"
            )));
        }
    }

    project.write_lock().with_write_lock(|| {
        crate::permissions::check_edit(&mut project.calc, key, "parent")?;

        let old_path = project.cards.get_card(key).expect("checked above").path.clone();
        let new_parent_dir = if destination == ROOT {
            paths::card_root(&project.root)
        } else {
            project.cards.get_card(destination).expect("checked above").path.clone()
        };
        let new_path = new_parent_dir.join(key);

        let mut journal = ReverseJournal::new();
        journal.capture(&new_path);
        if old_path != new_path {
            std::fs::rename(&old_path, &new_path).map_err(|e| CyberismoError::filesystem(&new_path, e))?;
        }

        let siblings = sibling_ranks(&project.cards, destination);
        let rank = lexorank::rank_last(&siblings);

        let card = project.cards.get_card_mut(key).expect("checked above");
        card.parent = destination.to_string();
        card.path = new_path;
        card.metadata.rank = rank;
        card.metadata.last_updated = crate::core::time::now_rfc3339();
        commands::persist_card_metadata(project, key)?;
        reparent_descendant_paths(project, key)?;
        project.cards.populate_children_relationships();
        project.calc.handle_card_changed(&project.cards)?;

        commands::record(
            project,
            Operation::ResourceUpdate,
            key,
            Some(serde_json::json!({ "movedTo": destination })),
        )?;
        Ok(())
    })
}

/// After renaming a card's own directory, every descendant's cached
/// `path` must be updated to match (the directory tree moved with it).
fn reparent_descendant_paths(project: &mut Project, root_key: &str) -> Result<(), CyberismoError> {
    let mut stack: Vec<String> = project
        .cards
        .get_card(root_key)
        .map(|c| c.children.clone())
        .unwrap_or_default();
    while let Some(key) = stack.pop() {
        let parent_path = project
            .cards
            .get_card(
                &project
                    .cards
                    .get_card(&key)
                    .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?
                    .parent
                    .clone(),
            )
            .ok_or_else(|| CyberismoError::NotFound("parent card".to_string()))?
            .path
            .clone();
        let card = project.cards.get_card_mut(&key).expect("just looked up");
        card.path = parent_path.join(&key);
        stack.extend(card.children.clone());
    }
    Ok(())
}

fn is_descendant_or_self(cards: &CardCache, candidate: &str, ancestor: &str) -> bool {
    if candidate == ancestor {
        return true;
    }
    let mut stack = vec![ancestor.to_string()];
    while let Some(key) = stack.pop() {
        if let Some(card) = cards.get_card(&key) {
            if card.children.iter().any(|c| c == candidate) {
                return true;
            }
            stack.extend(card.children.clone());
        }
    }
    false
}

/// `createLink(from, to, linkType, description?)`: enforces the
/// link-type allowlist, self-link ban, description-enable flag, and
/// dedup (spec §8 invariant 4).
pub fn create_link(
    project: &mut Project,
    from: &str,
    to: &str,
    link_type_name: &str,
    description: Option<&str>,
) -> Result<(), CyberismoError> {
    if from == to {
        return Err(CyberismoError::InvariantViolation("a card cannot link to itself".into()));
    }
    let from_type = project
        .cards
        .get_card(from)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{from}'")))?
        .metadata
        .card_type
        .clone();
    let to_type = project
        .cards
        .get_card(to)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{to}'")))?
        .metadata
        .card_type
        .clone();

    project.write_lock().with_write_lock(|| {
        let link_type = match project.resources.by_type(link_type_name, "linkTypes")? {
            Resource::LinkType { payload, .. } => payload.clone(),
            _ => unreachable!("by_type guarantees kind"),
        };
        if !link_type.allows_source(&from_type) {
            return Err(CyberismoError::InvariantViolation(format!(
                "'{from_type}' is not an allowed source for link type '{link_type_name}'"
            )));
        }
        if !link_type.allows_destination(&to_type) {
            return Err(CyberismoError::InvariantViolation(format!(
                "'{to_type}' is not an allowed destination for link type '{link_type_name}'"
            )));
        }
        if description.is_some() && !link_type.enable_link_description {
            return Err(CyberismoError::InvariantViolation(format!(
                "link type '{link_type_name}' does not allow a description"
            )));
        }

        let card = project.cards.get_card(from).expect("checked above");
        if card.metadata.find_link(link_type_name, to, description).is_some() {
            return Err(CyberismoError::Conflict(format!("link '{from}' -> '{to}' already exists")));
        }

        let mut metadata = card.metadata.clone();
        metadata.links.push(CardLink {
            link_type: link_type_name.to_string(),
            card_key: to.to_string(),
            link_description: description.map(str::to_string),
        });
        metadata.last_updated = crate::core::time::now_rfc3339();
        project.cards.update_card_metadata(from, metadata)?;
        commands::persist_card_metadata(project, from)?;
        commands::record(
            project,
            Operation::ResourceUpdate,
            from,
            Some(serde_json::json!({ "createLink": { "to": to, "linkType": link_type_name } })),
        )?;
        Ok(())
    })
}

pub fn remove_link(
    project: &mut Project,
    from: &str,
    to: &str,
    link_type_name: &str,
    description: Option<&str>,
) -> Result<(), CyberismoError> {
    project.write_lock().with_write_lock(|| {
        let card = project
            .cards
            .get_card(from)
            .ok_or_else(|| CyberismoError::NotFound(format!("card '{from}'")))?;
        let idx = card
            .metadata
            .find_link(link_type_name, to, description)
            .ok_or_else(|| CyberismoError::NotFound(format!("link '{from}' -> '{to}'")))?;
        let mut metadata = card.metadata.clone();
        metadata.links.remove(idx);
        metadata.last_updated = crate::core::time::now_rfc3339();
        project.cards.update_card_metadata(from, metadata)?;
        commands::persist_card_metadata(project, from)?;
        commands::record(
            project,
            Operation::ResourceUpdate,
            from,
            Some(serde_json::json!({ "removeLink": { "to": to, "linkType": link_type_name } })),
        )?;
        Ok(())
    })
}

/// The card half of `remove`: cascades to every descendant and their
/// attachment folders.
pub fn remove_card(project: &mut Project, key: &str) -> Result<Vec<String>, CyberismoError> {
    if !project.cards.has_card(key) {
        return Err(CyberismoError::NotFound(format!("card '{key}'")));
    }
    project.write_lock().with_write_lock(|| {
        let mut removed = Vec::new();
        let mut stack = vec![key.to_string()];
        let mut ordered = Vec::new();
        while let Some(k) = stack.pop() {
            if let Some(card) = project.cards.get_card(&k) {
                stack.extend(card.children.clone());
                ordered.push(k);
            }
        }
        let path = project.cards.get_card(key).expect("checked above").path.clone();
        crate::core::fsutil::remove_recursive(&path)?;
        for k in &ordered {
            if project.cards.delete_card(k).is_some() {
                removed.push(k.clone());
            }
        }
        project.cards.populate_children_relationships();
        project.calc.handle_delete_card(&project.cards)?;
        commands::record(project, Operation::ResourceDelete, key, Some(serde_json::json!({ "cascaded": removed })))?;
        Ok(removed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_descendant_detects_self_and_children() {
        let mut cache = CardCache::new();
        let mut parent = sample("dec_1", ROOT);
        parent.children.push("dec_2".into());
        cache.insert_new(parent).unwrap();
        cache.insert_new(sample("dec_2", "dec_1")).unwrap();
        assert!(is_descendant_or_self(&cache, "dec_1", "dec_1"));
        assert!(is_descendant_or_self(&cache, "dec_2", "dec_1"));
        assert!(!is_descendant_or_self(&cache, "dec_3", "dec_1"));
    }

    fn sample(key: &str, parent: &str) -> Card {
        Card {
            key: key.to_string(),
            path: std::path::PathBuf::from("/tmp").join(key),
            parent: parent.to_string(),
            children: Vec::new(),
            location: CardLocation::Project,
            metadata: CardMetadata {
                title: "T".into(),
                card_type: "dec/cardTypes/decision".into(),
                workflow_state: "Draft".into(),
                rank: "0|m".into(),
                labels: vec![],
                links: vec![],
                last_updated: "2025-01-01T00:00:00.000Z".into(),
                last_transitioned: None,
                custom_fields: Default::default(),
            },
            content: String::new(),
            attachments: vec![],
        }
    }
}
