//! Fully-qualified resource names: `<prefix>/<kind>/<identifier>`.

use crate::core::error::CyberismoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub const RESOURCE_KINDS: &[&str] = &[
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

/// Folder resources additionally own a content-file subfolder alongside
/// their `<identifier>.json`.
pub fn is_folder_resource_kind(kind: &str) -> bool {
    matches!(
        kind,
        "calculations" | "reports" | "templates" | "graphModels" | "graphViews"
    )
}

fn identifier_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceName {
    pub prefix: String,
    pub kind: String,
    pub identifier: String,
}

impl ResourceName {
    pub fn new(prefix: &str, kind: &str, identifier: &str) -> Result<Self, CyberismoError> {
        if !RESOURCE_KINDS.contains(&kind) {
            return Err(CyberismoError::InputValidation(format!(
                "unknown resource kind '{kind}'"
            )));
        }
        if !identifier_regex().is_match(identifier) {
            return Err(CyberismoError::InputValidation(format!(
                "resource identifier '{identifier}' must match [A-Za-z0-9._-]+"
            )));
        }
        Ok(Self {
            prefix: prefix.to_string(),
            kind: kind.to_string(),
            identifier: identifier.to_string(),
        })
    }

    /// Parse a fully-qualified name, failing if it is not in
    /// `<prefix>/<kind>/<identifier>` form.
    pub fn parse(full: &str) -> Result<Self, CyberismoError> {
        let parts: Vec<&str> = full.split('/').collect();
        if parts.len() != 3 {
            return Err(CyberismoError::InputValidation(format!(
                "resource name '{full}' is not fully qualified as <prefix>/<kind>/<identifier>"
            )));
        }
        Self::new(parts[0], parts[1], parts[2])
    }

    pub fn is_module_resource(&self, project_prefix: &str) -> bool {
        self.prefix != project_prefix
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.prefix, self.kind, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips() {
        let name = ResourceName::parse("dec/cardTypes/decision").unwrap();
        assert_eq!(name.prefix, "dec");
        assert_eq!(name.kind, "cardTypes");
        assert_eq!(name.identifier, "decision");
        assert_eq!(name.to_string(), "dec/cardTypes/decision");
    }

    #[test]
    fn parse_rejects_unqualified() {
        assert!(ResourceName::parse("decision").is_err());
        assert!(ResourceName::parse("dec/cardTypes/decision/extra").is_err());
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        assert!(ResourceName::parse("dec/bogusKind/x").is_err());
    }

    #[test]
    fn folder_resource_kinds() {
        assert!(is_folder_resource_kind("templates"));
        assert!(is_folder_resource_kind("calculations"));
        assert!(!is_folder_resource_kind("cardTypes"));
        assert!(!is_folder_resource_kind("fieldTypes"));
    }

    #[test]
    fn module_resource_detection() {
        let name = ResourceName::parse("other/cardTypes/x").unwrap();
        assert!(name.is_module_resource("dec"));
        assert!(!name.is_module_resource("other"));
    }
}
