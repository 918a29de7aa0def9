//! Embedded assets shipped with the engine: JSON schemas for resource
//! validation, the canned Clingo `base.lp`/`queryLanguage.lp` programs the
//! calculation engine concatenates onto every generated model, and the
//! default `.gitignore` written into a freshly created project.
//!
//! Mirrors the teacher's `src/core/assets.rs` (embedded constitution docs);
//! here the payload is schemas and Clingo source instead of markdown.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/schemas/"]
#[include = "*.json"]
struct SchemaAssets;

#[derive(RustEmbed)]
#[folder = "assets/clingo/"]
#[include = "*.lp"]
struct ClingoAssets;

#[derive(RustEmbed)]
#[folder = "assets/defaults/"]
struct DefaultAssets;

#[derive(RustEmbed)]
#[folder = "assets/queries/"]
#[include = "*.hbs"]
struct QueryAssets;

/// Raw JSON schema text for a resource kind (e.g. `"cardTypes"`), or `None`
/// if no schema ships for it.
pub fn schema_source(kind: &str) -> Option<String> {
    SchemaAssets::get(&format!("{kind}.json"))
        .map(|f| String::from_utf8_lossy(&f.data).into_owned())
}

pub fn all_schema_kinds() -> Vec<String> {
    SchemaAssets::iter()
        .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
        .collect()
}

pub fn clingo_base() -> String {
    ClingoAssets::get("base.lp")
        .map(|f| String::from_utf8_lossy(&f.data).into_owned())
        .unwrap_or_default()
}

pub fn clingo_query_language() -> String {
    ClingoAssets::get("queryLanguage.lp")
        .map(|f| String::from_utf8_lossy(&f.data).into_owned())
        .unwrap_or_default()
}

pub fn default_gitignore() -> String {
    DefaultAssets::get("gitignore")
        .map(|f| String::from_utf8_lossy(&f.data).into_owned())
        .unwrap_or_default()
}

/// Built-in action-guard/validation query templates shipped with the
/// engine itself (`onTransition`, `onEdit`, `onCreation`, `validate`), as
/// opposed to a report/graph resource's own `query.lp.hbs`.
pub fn builtin_query_template(name: &str) -> Option<String> {
    QueryAssets::get(&format!("{name}.lp.hbs")).map(|f| String::from_utf8_lossy(&f.data).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_nine_resource_schemas_are_embedded() {
        let kinds = all_schema_kinds();
        for kind in crate::model::resource_name::RESOURCE_KINDS {
            assert!(kinds.iter().any(|k| k == kind), "missing schema for {kind}");
        }
    }

    #[test]
    fn clingo_canned_programs_are_non_empty() {
        assert!(clingo_base().contains("descendantOf"));
        assert!(clingo_query_language().contains("isOpen"));
    }

    #[test]
    fn gitignore_default_is_embedded() {
        assert!(default_gitignore().contains(".calc/"));
    }

    #[test]
    fn builtin_query_templates_are_embedded() {
        assert!(builtin_query_template("onTransition").unwrap().contains("denyTransition"));
        assert!(builtin_query_template("onCreation").unwrap().contains("updateFieldOnCreation"));
        assert!(builtin_query_template("missing").is_none());
    }
}
