//! Link type resource: the allowlist and description policy for a class of
//! card-to-card link.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkType {
    #[serde(default)]
    pub source_card_types: Vec<String>,
    #[serde(default)]
    pub destination_card_types: Vec<String>,
    pub enable_link_description: bool,
    pub outbound_display_name: String,
    pub inbound_display_name: String,
}

impl LinkType {
    /// Empty list means unrestricted.
    pub fn allows_source(&self, card_type: &str) -> bool {
        self.source_card_types.is_empty() || self.source_card_types.iter().any(|t| t == card_type)
    }

    pub fn allows_destination(&self, card_type: &str) -> bool {
        self.destination_card_types.is_empty()
            || self.destination_card_types.iter().any(|t| t == card_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_is_unrestricted() {
        let lt = LinkType {
            source_card_types: vec![],
            destination_card_types: vec![],
            enable_link_description: false,
            outbound_display_name: "blocks".into(),
            inbound_display_name: "blocked by".into(),
        };
        assert!(lt.allows_source("anything/cardTypes/x"));
        assert!(lt.allows_destination("anything/cardTypes/y"));
    }

    #[test]
    fn nonempty_allowlist_restricts() {
        let lt = LinkType {
            source_card_types: vec!["dec/cardTypes/decision".into()],
            destination_card_types: vec![],
            enable_link_description: true,
            outbound_display_name: "blocks".into(),
            inbound_display_name: "blocked by".into(),
        };
        assert!(lt.allows_source("dec/cardTypes/decision"));
        assert!(!lt.allows_source("dec/cardTypes/other"));
    }
}
