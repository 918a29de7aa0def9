//! Sibling re-ordering commands: `rankByIndex`, `rankBefore`, `rankFirst`,
//! and `rebalance` (spec §4.4). All four only ever touch the rank of
//! cards sharing one parent; none of them move a card between parents
//! (that's `moveCard`'s job).

use crate::cache::card_cache::CardCache;
use crate::core::error::CyberismoError;
use crate::core::lexorank;
use crate::migration_log::Operation;
use crate::model::card::ROOT;
use crate::project::Project;

/// Siblings of `key`'s current parent, sorted by rank, with `key` itself
/// excluded so it can be re-inserted relative to the others.
fn siblings_excluding(cards: &CardCache, key: &str, parent: &str) -> Vec<(String, String)> {
    let keys: Vec<String> = if parent == ROOT {
        cards.root_children()
    } else {
        cards.get_card(parent).map(|p| p.children.clone()).unwrap_or_default()
    };
    let mut pairs: Vec<(String, String)> = keys
        .into_iter()
        .filter(|k| k != key)
        .filter_map(|k| cards.get_card(&k).map(|c| (k, c.metadata.rank.clone())))
        .collect();
    pairs.sort_by(|a, b| lexorank::compare(&a.1, &b.1));
    pairs
}

fn set_rank(project: &mut Project, key: &str, rank: String) -> Result<(), CyberismoError> {
    let card = project
        .cards
        .get_card_mut(key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
    card.metadata.rank = rank;
    card.metadata.last_updated = crate::core::time::now_rfc3339();
    crate::commands::persist_card_metadata(project, key)?;
    project.cards.populate_children_relationships();
    Ok(())
}

/// `rankByIndex(key, index)`: place `key` at 0-based `index` among its
/// current siblings (spec §8: "sibling order is idempotent under repeated
/// identical rank operations").
pub fn rank_by_index(project: &mut Project, key: &str, index: usize) -> Result<(), CyberismoError> {
    let parent = project
        .cards
        .get_card(key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?
        .parent
        .clone();
    project.write_lock().with_write_lock(|| {
        let siblings = siblings_excluding(&project.cards, key, &parent);
        let ranks: Vec<String> = siblings.iter().map(|(_, r)| r.clone()).collect();
        let rank = lexorank::rank_at_index(&ranks, index);
        set_rank(project, key, rank)?;
        crate::commands::record(
            project,
            Operation::ResourceUpdate,
            key,
            Some(serde_json::json!({ "rankByIndex": index })),
        )
    })
}

/// `rankBefore(key, beforeKey)`.
pub fn rank_before(project: &mut Project, key: &str, before_key: &str) -> Result<(), CyberismoError> {
    reposition(project, key, before_key, lexorank::rank_before)
}

/// `rankFirst(key)`: place `key` before every other sibling.
pub fn rank_first(project: &mut Project, key: &str) -> Result<(), CyberismoError> {
    let parent = project
        .cards
        .get_card(key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?
        .parent
        .clone();
    project.write_lock().with_write_lock(|| {
        let siblings = siblings_excluding(&project.cards, key, &parent);
        let ranks: Vec<String> = siblings.iter().map(|(_, r)| r.clone()).collect();
        let rank = lexorank::rank_first(&ranks);
        set_rank(project, key, rank)?;
        crate::commands::record(project, Operation::ResourceUpdate, key, Some(serde_json::json!({ "rankFirst": true })))
    })
}

fn reposition(
    project: &mut Project,
    key: &str,
    reference_key: &str,
    single_bound: impl Fn(&str) -> String,
) -> Result<(), CyberismoError> {
    let parent = project
        .cards
        .get_card(key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?
        .parent
        .clone();
    let reference_parent = project
        .cards
        .get_card(reference_key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{reference_key}'")))?
        .parent
        .clone();
    if parent != reference_parent {
        return Err(CyberismoError::InvariantViolation(
            "rankBefore only reorders cards that already share a parent".into(),
        ));
    }
    project.write_lock().with_write_lock(|| {
        let reference_rank = project.cards.get_card(reference_key).expect("checked above").metadata.rank.clone();
        let rank = single_bound(&reference_rank);
        set_rank(project, key, rank)?;
        crate::commands::record(
            project,
            Operation::ResourceUpdate,
            key,
            Some(serde_json::json!({ "rankBefore": reference_key })),
        )
    })
}

/// `rebalance(parentKey)`: redistribute every direct child's rank evenly
/// across a fresh bucket, preserving relative order (spec §8: "rebalance
/// never changes relative sibling order").
pub fn rebalance(project: &mut Project, parent_key: &str) -> Result<(), CyberismoError> {
    project.write_lock().with_write_lock(|| {
        let mut pairs: Vec<(String, String)> = if parent_key == ROOT {
            project
                .cards
                .root_children()
                .into_iter()
                .filter_map(|k| project.cards.get_card(&k).map(|c| (k, c.metadata.rank.clone())))
                .collect()
        } else {
            project
                .cards
                .get_card(parent_key)
                .ok_or_else(|| CyberismoError::NotFound(format!("card '{parent_key}'")))?
                .children
                .iter()
                .filter_map(|k| project.cards.get_card(k).map(|c| (k.clone(), c.metadata.rank.clone())))
                .collect()
        };
        pairs.sort_by(|a, b| lexorank::compare(&a.1, &b.1));
        if pairs.is_empty() {
            return Ok(());
        }
        let hint = pairs[0].1.clone();
        let fresh = lexorank::rebalance(&hint, pairs.len());
        for ((key, _), rank) in pairs.into_iter().zip(fresh) {
            set_rank(project, &key, rank)?;
        }
        crate::commands::record(
            project,
            Operation::ResourceUpdate,
            parent_key,
            Some(serde_json::json!({ "rebalance": true })),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siblings_excluding_drops_self_and_sorts() {
        let mut cache = CardCache::new();
        for (key, rank) in [("dec_b", "0|n"), ("dec_a", "0|m"), ("dec_c", "0|z")] {
            cache
                .insert_new(crate::model::card::Card {
                    key: key.to_string(),
                    path: std::path::PathBuf::from("/tmp").join(key),
                    parent: ROOT.to_string(),
                    children: Vec::new(),
                    location: crate::model::card::CardLocation::Project,
                    metadata: crate::model::card::CardMetadata {
                        title: "T".into(),
                        card_type: "dec/cardTypes/t".into(),
                        workflow_state: "Draft".into(),
                        rank: rank.to_string(),
                        labels: vec![],
                        links: vec![],
                        last_updated: "2025-01-01T00:00:00.000Z".into(),
                        last_transitioned: None,
                        custom_fields: Default::default(),
                    },
                    content: String::new(),
                    attachments: vec![],
                })
                .unwrap();
        }
        let siblings = siblings_excluding(&cache, "dec_a", ROOT);
        let keys: Vec<&str> = siblings.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["dec_b", "dec_c"]);
    }
}
