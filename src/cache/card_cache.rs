//! In-memory index of every card (project + all templates) for the
//! lifetime of a process.

use crate::core::error::CyberismoError;
use crate::core::paths;
use crate::model::card::{Card, CardLocation, CardMetadata, Attachment, ROOT};
use rustc_hash::FxHashMap;
use std::path::Path;

#[derive(Debug, Default)]
pub struct CardCache {
    cards: FxHashMap<String, Card>,
}

impl CardCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_card(&self, key: &str) -> Option<&Card> {
        self.cards.get(key)
    }

    pub fn get_card_mut(&mut self, key: &str) -> Option<&mut Card> {
        self.cards.get_mut(key)
    }

    pub fn has_card(&self, key: &str) -> bool {
        self.cards.contains_key(key)
    }

    pub fn get_cards(&self) -> impl Iterator<Item = &Card> {
        self.cards.values()
    }

    pub fn get_all_template_cards(&self) -> impl Iterator<Item = &Card> {
        self.cards
            .values()
            .filter(|c| matches!(c.location, CardLocation::Template(_)))
    }

    pub fn get_cards_in_template(&self, template_name: &str) -> Vec<&Card> {
        self.cards
            .values()
            .filter(|c| matches!(&c.location, CardLocation::Template(t) if t == template_name))
            .collect()
    }

    pub fn get_project_cards(&self) -> impl Iterator<Item = &Card> {
        self.cards.values().filter(|c| c.location == CardLocation::Project)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Insert a brand-new card. Fails on duplicate key, matching the
    /// "key unique across project and templates" invariant.
    pub fn insert_new(&mut self, card: Card) -> Result<(), CyberismoError> {
        if self.cards.contains_key(&card.key) {
            return Err(CyberismoError::Conflict(format!(
                "duplicate card key '{}'",
                card.key
            )));
        }
        self.cards.insert(card.key.clone(), card);
        Ok(())
    }

    /// Upsert a card, preserving any field the caller's partial update
    /// omits.
    pub fn update_card(&mut self, card: Card) {
        self.cards.insert(card.key.clone(), card);
    }

    pub fn update_card_content(&mut self, key: &str, content: String) -> Result<(), CyberismoError> {
        let card = self
            .cards
            .get_mut(key)
            .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
        card.content = content;
        Ok(())
    }

    pub fn update_card_metadata(
        &mut self,
        key: &str,
        metadata: CardMetadata,
    ) -> Result<(), CyberismoError> {
        let card = self
            .cards
            .get_mut(key)
            .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
        card.metadata = metadata;
        Ok(())
    }

    pub fn update_card_attachments(
        &mut self,
        key: &str,
        attachments: Vec<Attachment>,
    ) -> Result<(), CyberismoError> {
        let card = self
            .cards
            .get_mut(key)
            .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
        card.attachments = attachments;
        Ok(())
    }

    /// Add an attachment, deduplicated by `(card, path, fileName)`.
    pub fn add_attachment(&mut self, key: &str, attachment: Attachment) -> Result<(), CyberismoError> {
        let card = self
            .cards
            .get_mut(key)
            .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
        if card
            .attachments
            .iter()
            .any(|a| a.dedup_key() == attachment.dedup_key())
        {
            return Err(CyberismoError::Conflict(format!(
                "duplicate attachment '{}' on card '{key}'",
                attachment.file_name
            )));
        }
        card.attachments.push(attachment);
        Ok(())
    }

    pub fn delete_attachment(&mut self, key: &str, file_name: &str) -> Result<(), CyberismoError> {
        let card = self
            .cards
            .get_mut(key)
            .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
        let before = card.attachments.len();
        card.attachments.retain(|a| a.file_name != file_name);
        if card.attachments.len() == before {
            return Err(CyberismoError::NotFound(format!(
                "attachment '{file_name}' on card '{key}'"
            )));
        }
        Ok(())
    }

    /// Remove a card. Returns it so the caller (the `remove` command) can
    /// cascade to on-disk attachment/folder cleanup.
    pub fn delete_card(&mut self, key: &str) -> Option<Card> {
        self.cards.remove(key)
    }

    /// Remove every card belonging to a template, used when a template
    /// resource is deleted.
    pub fn delete_cards_from_template(&mut self, template_name: &str) -> Vec<Card> {
        let keys: Vec<String> = self
            .cards
            .values()
            .filter(|c| matches!(&c.location, CardLocation::Template(t) if t == template_name))
            .map(|c| c.key.clone())
            .collect();
        keys.into_iter().filter_map(|k| self.cards.remove(&k)).collect()
    }

    /// Rebuild every card's `children` array by scanning every other
    /// card's `parent` field, sorted by rank within each parent.
    pub fn populate_children_relationships(&mut self) {
        let mut children_of: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for card in self.cards.values() {
            children_of.entry(card.parent.clone()).or_default().push(card.key.clone());
        }
        for (parent, mut kids) in children_of {
            kids.sort_by(|a, b| {
                let rank_a = self.cards.get(a).map(|c| c.metadata.rank.clone()).unwrap_or_default();
                let rank_b = self.cards.get(b).map(|c| c.metadata.rank.clone()).unwrap_or_default();
                crate::core::lexorank::compare(&rank_a, &rank_b)
            });
            if parent == ROOT {
                continue;
            }
            if let Some(parent_card) = self.cards.get_mut(&parent) {
                parent_card.children = kids;
            }
        }
    }

    pub fn root_children(&self) -> Vec<String> {
        let mut roots: Vec<&Card> = self.cards.values().filter(|c| c.parent == ROOT).collect();
        crate::core::lexorank::sort_by_rank(&mut roots, |c| c.metadata.rank.clone());
        roots.into_iter().map(|c| c.key.clone()).collect()
    }

    /// Recursively scan `path` for card directories (names matching the
    /// card-key regex), reading `index.json`/`index.adoc`/`a/*`, tagging
    /// every card found with `location`. Fails on a duplicate key.
    pub fn populate_from_path(
        &mut self,
        path: &Path,
        parent: &str,
        location: CardLocation,
    ) -> Result<(), CyberismoError> {
        if !path.exists() {
            return Ok(());
        }
        let entries = std::fs::read_dir(path).map_err(|e| CyberismoError::filesystem(path, e))?;
        let mut dirs: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        for dir in dirs {
            let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name == "a" {
                continue;
            }
            if !crate::model::card::is_valid_card_key(name) {
                continue;
            }
            let card = read_card_from_disk(&dir, parent, location.clone())?;
            let key = card.key.clone();
            self.insert_new(card)?;
            self.populate_from_path(&dir, &key, location.clone())?;
        }
        Ok(())
    }
}

fn read_card_from_disk(
    card_path: &Path,
    parent: &str,
    location: CardLocation,
) -> Result<Card, CyberismoError> {
    let key = card_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CyberismoError::InputValidation("card directory has no name".into()))?
        .to_string();

    let index_json_path = paths::card_index_json(card_path);
    let raw = std::fs::read_to_string(&index_json_path)
        .map_err(|e| CyberismoError::filesystem(&index_json_path, e))?;
    let mut json: serde_json::Value = serde_json::from_str(&raw)?;
    // Missing `links` array in on-disk metadata is repaired on load.
    if json.get("links").is_none() {
        if let Some(obj) = json.as_object_mut() {
            obj.insert("links".to_string(), serde_json::json!([]));
        }
    }
    let metadata: CardMetadata = serde_json::from_value(json)?;

    let index_adoc_path = paths::card_index_adoc(card_path);
    let content = std::fs::read_to_string(&index_adoc_path).unwrap_or_default();

    let attachments = read_attachments(&key, card_path)?;

    Ok(Card {
        key,
        path: card_path.to_path_buf(),
        parent: parent.to_string(),
        children: Vec::new(),
        location,
        metadata,
        content,
        attachments,
    })
}

fn read_attachments(card_key: &str, card_path: &Path) -> Result<Vec<Attachment>, CyberismoError> {
    let dir = paths::card_attachments_dir(card_path);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| CyberismoError::filesystem(&dir, e))? {
        let entry = entry.map_err(|e| CyberismoError::filesystem(&dir, e))?;
        let path = entry.path();
        if path.is_file() {
            let file_name = path.file_name().unwrap().to_string_lossy().to_string();
            let mime_type = mime_guess_simple(&file_name);
            out.push(Attachment {
                card: card_key.to_string(),
                path: path.clone(),
                file_name,
                mime_type,
            });
        }
    }
    out.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(out)
}

fn mime_guess_simple(file_name: &str) -> String {
    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::card::CardLink;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn sample_card(key: &str, parent: &str, rank: &str) -> Card {
        Card {
            key: key.to_string(),
            path: Path::new("/tmp").join(key),
            parent: parent.to_string(),
            children: Vec::new(),
            location: CardLocation::Project,
            metadata: CardMetadata {
                title: "Title".into(),
                card_type: "dec/cardTypes/decision".into(),
                workflow_state: "Draft".into(),
                rank: rank.into(),
                labels: vec![],
                links: vec![],
                last_updated: "2025-01-01T00:00:00.000Z".into(),
                last_transitioned: None,
                custom_fields: BTreeMap::new(),
            },
            content: String::new(),
            attachments: vec![],
        }
    }

    #[test]
    fn insert_new_rejects_duplicate_key() {
        let mut cache = CardCache::new();
        cache.insert_new(sample_card("dec_1", ROOT, "0|m")).unwrap();
        let err = cache.insert_new(sample_card("dec_1", ROOT, "0|n")).unwrap_err();
        assert!(matches!(err, CyberismoError::Conflict(_)));
    }

    #[test]
    fn populate_children_relationships_sorts_by_rank() {
        let mut cache = CardCache::new();
        cache.insert_new(sample_card("dec_1", ROOT, "0|n")).unwrap();
        cache.insert_new(sample_card("dec_2", ROOT, "0|m")).unwrap();
        cache.populate_children_relationships();
        assert_eq!(cache.root_children(), vec!["dec_2".to_string(), "dec_1".to_string()]);
    }

    #[test]
    fn add_attachment_dedup() {
        let mut cache = CardCache::new();
        cache.insert_new(sample_card("dec_1", ROOT, "0|m")).unwrap();
        let att = Attachment {
            card: "dec_1".into(),
            path: Path::new("/tmp/a.png").into(),
            file_name: "a.png".into(),
            mime_type: "image/png".into(),
        };
        cache.add_attachment("dec_1", att.clone()).unwrap();
        assert!(cache.add_attachment("dec_1", att).is_err());
    }

    #[test]
    fn populate_from_path_reads_cards_and_repairs_missing_links() {
        let dir = tempdir().unwrap();
        let card_dir = dir.path().join("dec_1");
        std::fs::create_dir_all(&card_dir).unwrap();
        std::fs::write(
            card_dir.join("index.json"),
            r#"{"title":"T","cardType":"dec/cardTypes/decision","workflowState":"Draft","rank":"0|m","labels":[],"lastUpdated":"2025-01-01T00:00:00.000Z"}"#,
        )
        .unwrap();
        std::fs::write(card_dir.join("index.adoc"), "hello").unwrap();

        let mut cache = CardCache::new();
        cache
            .populate_from_path(dir.path(), ROOT, CardLocation::Project)
            .unwrap();
        let card = cache.get_card("dec_1").unwrap();
        assert_eq!(card.content, "hello");
        assert!(card.metadata.links.is_empty());
    }

    #[test]
    fn delete_cards_from_template_removes_all() {
        let mut cache = CardCache::new();
        let mut c = sample_card("dec_1", ROOT, "0|m");
        c.location = CardLocation::Template("decision".into());
        cache.insert_new(c).unwrap();
        assert_eq!(cache.delete_cards_from_template("decision").len(), 1);
        assert!(!cache.has_card("dec_1"));
    }

    #[test]
    fn links_dedup_key_roundtrip() {
        let link = CardLink { link_type: "dec/linkTypes/blocks".into(), card_key: "dec_2".into(), link_description: None };
        assert_eq!(link.dedup_key().1, "dec_2");
    }
}
