//! The card: a content artefact with metadata, hierarchy, links, and
//! attachments.

use crate::core::error::CyberismoError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const ROOT: &str = "ROOT";

/// A card key must match `[a-z]+_[0-9a-z]+` and is unique across the
/// project and every template.
pub fn is_valid_card_key(key: &str) -> bool {
    static RE: once_regex::OnceRegex = once_regex::OnceRegex::new(r"^[a-z]+_[0-9a-z]+$");
    RE.get().is_match(key)
}

/// Synthesise `<prefix>_<base36 suffix>` from a random v4 UUID (spec §4.4
/// `createCard`: "synthesise a new key").
pub fn new_key(prefix: &str) -> String {
    format!("{prefix}_{}", to_base36(uuid::Uuid::new_v4().as_u128()))
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

/// Where a card lives: the live project tree, or inside a named template.
/// Derived from where a card was scanned from, never persisted as part of
/// `index.json` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardLocation {
    Project,
    Template(String),
}

impl CardLocation {
    pub fn as_str(&self) -> &str {
        match self {
            CardLocation::Project => "project",
            CardLocation::Template(name) => name.as_str(),
        }
    }
}

impl Serialize for CardLocation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardLink {
    pub link_type: String,
    pub card_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_description: Option<String>,
}

impl CardLink {
    /// Dedup identity: `(linkType, cardKey, linkDescription)`.
    pub fn dedup_key(&self) -> (String, String, Option<String>) {
        (
            self.link_type.clone(),
            self.card_key.clone(),
            self.link_description.clone(),
        )
    }
}

/// A card's metadata, mirroring the `index.json` shape on disk. Custom, cardType-declared fields are
/// captured in `custom_fields` via `#[serde(flatten)]` so round-tripping an
/// unmodified card reproduces identical bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardMetadata {
    pub title: String,
    pub card_type: String,
    pub workflow_state: String,
    pub rank: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub links: Vec<CardLink>,
    pub last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transitioned: Option<String>,
    #[serde(flatten)]
    pub custom_fields: BTreeMap<String, JsonValue>,
}

impl CardMetadata {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn find_link(
        &self,
        link_type: &str,
        card_key: &str,
        description: Option<&str>,
    ) -> Option<usize> {
        self.links.iter().position(|l| {
            l.link_type == link_type
                && l.card_key == card_key
                && l.link_description.as_deref() == description
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub card: String,
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
}

impl Attachment {
    pub fn dedup_key(&self) -> (String, PathBuf, String) {
        (self.card.clone(), self.path.clone(), self.file_name.clone())
    }
}

/// An in-memory card as held by the card cache.
#[derive(Debug, Clone)]
pub struct Card {
    pub key: String,
    pub path: PathBuf,
    pub parent: String,
    pub children: Vec<String>,
    pub location: CardLocation,
    pub metadata: CardMetadata,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl Card {
    pub fn is_root_level(&self) -> bool {
        self.parent == ROOT
    }

    pub fn validate_key(&self) -> Result<(), CyberismoError> {
        if !is_valid_card_key(&self.key) {
            return Err(CyberismoError::InputValidation(format!(
                "card key '{}' does not match [a-z]+_[0-9a-z]+",
                self.key
            )));
        }
        Ok(())
    }
}

/// Tiny lazily-compiled regex holder so `is_valid_card_key` avoids
/// recompiling the pattern on every call without pulling in a
/// once_cell/lazy_static dependency the teacher doesn't already carry.
mod once_regex {
    use regex::Regex;
    use std::sync::OnceLock;

    pub struct OnceRegex {
        pattern: &'static str,
        cell: OnceLock<Regex>,
    }

    impl OnceRegex {
        pub const fn new(pattern: &'static str) -> Self {
            Self {
                pattern,
                cell: OnceLock::new(),
            }
        }

        pub fn get(&self) -> &Regex {
            self.cell.get_or_init(|| Regex::new(self.pattern).expect("valid regex"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_regex_accepts_and_rejects() {
        assert!(is_valid_card_key("dec_1a2b3c"));
        assert!(is_valid_card_key("dec_0"));
        assert!(!is_valid_card_key("Dec_1"));
        assert!(!is_valid_card_key("dec"));
        assert!(!is_valid_card_key("dec_"));
    }

    #[test]
    fn new_key_matches_card_key_regex() {
        let key = new_key("dec");
        assert!(is_valid_card_key(&key), "{key} should match the card key regex");
        assert_ne!(new_key("dec"), new_key("dec"));
    }

    #[test]
    fn link_dedup_key_includes_description() {
        let a = CardLink {
            link_type: "dec/linkTypes/blocks".into(),
            card_key: "dec_2".into(),
            link_description: None,
        };
        let b = CardLink {
            link_type: "dec/linkTypes/blocks".into(),
            card_key: "dec_2".into(),
            link_description: Some("x".into()),
        };
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn metadata_round_trips_custom_fields() {
        let json = serde_json::json!({
            "title": "Decide on X",
            "cardType": "dec/cardTypes/decision",
            "workflowState": "Draft",
            "rank": "0|m",
            "labels": [],
            "links": [],
            "lastUpdated": "2025-01-01T00:00:00.000Z",
            "severity": "high"
        });
        let meta: CardMetadata = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(meta.custom_fields.get("severity").unwrap(), "high");
        let round_tripped = serde_json::to_value(&meta).unwrap();
        assert_eq!(round_tripped["severity"], "high");
        assert_eq!(round_tripped["cardType"], "dec/cardTypes/decision");
    }
}
