//! Field type resource: the data type contract behind a card type's custom
//! fields.

use crate::core::error::CyberismoError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    ShortText,
    LongText,
    Number,
    Integer,
    Boolean,
    Enum,
    List,
    Date,
    DateTime,
    Person,
}

impl DataType {
    pub fn requires_enum_values(&self) -> bool {
        matches!(self, DataType::Enum | DataType::List)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldType {
    pub name: String,
    pub data_type: DataType,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl FieldType {
    pub fn validate(&self) -> Result<(), CyberismoError> {
        let has_values = self
            .enum_values
            .as_ref()
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        if self.data_type.requires_enum_values() && !has_values {
            return Err(CyberismoError::SchemaValidation(format!(
                "field type '{}' with dataType {:?} requires non-empty enumValues",
                self.name, self.data_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_without_values_fails() {
        let ft = FieldType {
            name: "severity".into(),
            data_type: DataType::Enum,
            display_name: "Severity".into(),
            enum_values: None,
        };
        assert!(ft.validate().is_err());
    }

    #[test]
    fn short_text_needs_no_enum_values() {
        let ft = FieldType {
            name: "summary".into(),
            data_type: DataType::ShortText,
            display_name: "Summary".into(),
            enum_values: None,
        };
        assert!(ft.validate().is_ok());
    }
}
