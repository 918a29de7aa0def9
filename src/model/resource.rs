//! The resource variant type: one case per resource kind, dispatched by
//! exhaustive pattern matching rather than dynamic dispatch. A `Resource` pairs a fully-qualified
//! `ResourceName` with its typed payload; folder resources additionally
//! carry a `content_files` map of file name -> raw text for their
//! Clingo/Handlebars payload.

use crate::model::card_type::CardType;
use crate::model::field_type::FieldType;
use crate::model::link_type::LinkType;
use crate::model::resource_name::ResourceName;
use crate::model::workflow::Workflow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ContentFiles = BTreeMap<String, String>;

/// Canonical content-file set for each folder-resource kind.
pub fn canonical_content_files(kind: &str) -> &'static [&'static str] {
    match kind {
        "reports" => &["report.json", "query.lp.hbs", "content.adoc.hbs"],
        "graphModels" => &["model.lp", "query.lp.hbs"],
        "graphViews" => &["view.lp", "query.lp.hbs"],
        "calculations" => &["calculation.lp"],
        "templates" => &[],
        _ => &[],
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphModelPayload {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphViewPayload {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationPayload {
    pub name: String,
}

/// A template's persisted metadata; the template's card tree itself lives
/// in the card cache under `CardLocation::Template(name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePayload {
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Resource {
    CardType { name: ResourceName, payload: CardType },
    FieldType { name: ResourceName, payload: FieldType },
    Workflow { name: ResourceName, payload: Workflow },
    LinkType { name: ResourceName, payload: LinkType },
    Template { name: ResourceName, payload: TemplatePayload, content_files: ContentFiles },
    Report { name: ResourceName, payload: ReportPayload, content_files: ContentFiles },
    GraphModel { name: ResourceName, payload: GraphModelPayload, content_files: ContentFiles },
    GraphView { name: ResourceName, payload: GraphViewPayload, content_files: ContentFiles },
    Calculation { name: ResourceName, payload: CalculationPayload, content_files: ContentFiles },
}

impl Resource {
    pub fn name(&self) -> &ResourceName {
        match self {
            Resource::CardType { name, .. }
            | Resource::FieldType { name, .. }
            | Resource::Workflow { name, .. }
            | Resource::LinkType { name, .. }
            | Resource::Template { name, .. }
            | Resource::Report { name, .. }
            | Resource::GraphModel { name, .. }
            | Resource::GraphView { name, .. }
            | Resource::Calculation { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Resource::CardType { .. } => "cardTypes",
            Resource::FieldType { .. } => "fieldTypes",
            Resource::Workflow { .. } => "workflows",
            Resource::LinkType { .. } => "linkTypes",
            Resource::Template { .. } => "templates",
            Resource::Report { .. } => "reports",
            Resource::GraphModel { .. } => "graphModels",
            Resource::GraphView { .. } => "graphViews",
            Resource::Calculation { .. } => "calculations",
        }
    }

    pub fn is_folder_resource(&self) -> bool {
        matches!(
            self,
            Resource::Template { .. }
                | Resource::Report { .. }
                | Resource::GraphModel { .. }
                | Resource::GraphView { .. }
                | Resource::Calculation { .. }
        )
    }

    pub fn content_files(&self) -> Option<&ContentFiles> {
        match self {
            Resource::Template { content_files, .. }
            | Resource::Report { content_files, .. }
            | Resource::GraphModel { content_files, .. }
            | Resource::GraphView { content_files, .. }
            | Resource::Calculation { content_files, .. } => Some(content_files),
            _ => None,
        }
    }

    /// JSON schema id this resource's metadata file is validated against.
    pub fn schema_id(&self) -> String {
        format!("cyberismo/schemas/{}.json", self.kind())
    }

    /// Serialize just the metadata payload (not content files) back to the
    /// `<identifier>.json` shape.
    pub fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Resource::CardType { payload, .. } => serde_json::to_value(payload),
            Resource::FieldType { payload, .. } => serde_json::to_value(payload),
            Resource::Workflow { payload, .. } => serde_json::to_value(payload),
            Resource::LinkType { payload, .. } => serde_json::to_value(payload),
            Resource::Template { payload, .. } => serde_json::to_value(payload),
            Resource::Report { payload, .. } => serde_json::to_value(payload),
            Resource::GraphModel { payload, .. } => serde_json::to_value(payload),
            Resource::GraphView { payload, .. } => serde_json::to_value(payload),
            Resource::Calculation { payload, .. } => serde_json::to_value(payload),
        }
    }
}

/// The four update operations from the data model, parameterised over the
/// property `K` (an array element selector or scalar property name) and
/// the JSON value being written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum UpdateOp {
    /// Append `value` to array property `target` if absent; fails on duplicate.
    Add {
        target: String,
        value: serde_json::Value,
    },
    /// Replace a scalar, or a matching array element, with `to`.
    Change {
        target: String,
        to: serde_json::Value,
    },
    /// Move the array element matching `target` to `new_index` (clamped).
    Rank {
        target: String,
        #[serde(rename = "newIndex")]
        new_index: usize,
    },
    /// Remove the array element matching `target`; if `replacement` is
    /// given, other resources still referencing `target` are rewritten to
    /// it first.
    Remove {
        target: String,
        #[serde(default)]
        replacement: Option<serde_json::Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_schema_id() {
        let res = Resource::LinkType {
            name: ResourceName::new("dec", "linkTypes", "blocks").unwrap(),
            payload: LinkType {
                source_card_types: vec![],
                destination_card_types: vec![],
                enable_link_description: false,
                outbound_display_name: "blocks".into(),
                inbound_display_name: "blocked by".into(),
            },
        };
        assert_eq!(res.kind(), "linkTypes");
        assert_eq!(res.schema_id(), "cyberismo/schemas/linkTypes.json");
        assert!(!res.is_folder_resource());
    }

    #[test]
    fn canonical_files_for_reports() {
        assert_eq!(
            canonical_content_files("reports"),
            &["report.json", "query.lp.hbs", "content.adoc.hbs"]
        );
    }

    #[test]
    fn update_op_serializes_tagged() {
        let op = UpdateOp::Rank { target: "x".into(), new_index: 2 };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "rank");
        assert_eq!(json["newIndex"], 2);
    }
}
