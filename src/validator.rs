//! Per-project JSON schema validator. One instance per [`crate::project::Project`],
//! compiled once from the embedded schemas and reused for every
//! `resource.validate()` call — the teacher's "global validator singleton"
//! becomes a context field per DESIGN NOTES §9.

use crate::assets;
use crate::core::error::CyberismoError;
use jsonschema::Validator as CompiledSchema;
use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;

pub struct Validator {
    compiled: FxHashMap<String, CompiledSchema>,
}

impl Validator {
    /// Compile every embedded resource schema up front; a broken embedded
    /// schema is a build-time defect, not a runtime one, so this panics
    /// rather than returning a `Result`.
    pub fn new() -> Self {
        let mut compiled = FxHashMap::default();
        for kind in assets::all_schema_kinds() {
            let source = assets::schema_source(&kind).expect("embedded schema disappeared");
            let schema: JsonValue =
                serde_json::from_str(&source).expect("embedded schema is valid JSON");
            let validator = jsonschema::validator_for(&schema).expect("embedded schema compiles");
            compiled.insert(kind, validator);
        }
        Self { compiled }
    }

    /// Validate `instance` against the schema for `kind` (e.g. `"cardTypes"`).
    /// Returns every violation found, not just the first.
    pub fn validate(&self, kind: &str, instance: &JsonValue) -> Result<(), CyberismoError> {
        let schema = self
            .compiled
            .get(kind)
            .ok_or_else(|| CyberismoError::InputValidation(format!("no schema for kind '{kind}'")))?;
        let errors: Vec<String> = schema.iter_errors(instance).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CyberismoError::SchemaValidation(errors.join("; ")))
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_card_type_passes() {
        let v = Validator::new();
        let instance = serde_json::json!({
            "workflow": "dec/workflows/decision",
            "alwaysVisibleFields": [],
            "optionallyVisibleFields": [],
            "customFields": []
        });
        assert!(v.validate("cardTypes", &instance).is_ok());
    }

    #[test]
    fn missing_required_field_fails() {
        let v = Validator::new();
        let instance = serde_json::json!({ "alwaysVisibleFields": [] });
        assert!(v.validate("cardTypes", &instance).is_err());
    }

    #[test]
    fn unknown_kind_errors() {
        let v = Validator::new();
        assert!(v.validate("bogusKind", &serde_json::json!({})).is_err());
    }
}
