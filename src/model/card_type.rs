//! Card type resource: the schema binding a card to a workflow and
//! declaring its fields.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldSpec {
    pub name: String,
    pub data_type: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardType {
    /// Fully-qualified workflow resource name.
    pub workflow: String,
    #[serde(default)]
    pub always_visible_fields: Vec<String>,
    #[serde(default)]
    pub optionally_visible_fields: Vec<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldSpec>,
}

impl CardType {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.custom_fields.iter().map(|f| f.name.as_str())
    }

    pub fn find_field(&self, name: &str) -> Option<&CustomFieldSpec> {
        self.custom_fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_field_by_name() {
        let ct = CardType {
            workflow: "dec/workflows/decision".into(),
            always_visible_fields: vec!["severity".into()],
            optionally_visible_fields: vec![],
            custom_fields: vec![CustomFieldSpec {
                name: "severity".into(),
                data_type: "dec/fieldTypes/severity".into(),
                display_name: "Severity".into(),
            }],
        };
        assert!(ct.find_field("severity").is_some());
        assert!(ct.find_field("missing").is_none());
    }
}
