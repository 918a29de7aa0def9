//! Field-type coercion table (spec §8): converts a raw Clingo-answer string
//! (or a raw JSON value supplied by `editCardMetadata`) into the typed
//! value a field's `dataType` expects.

use crate::core::error::CyberismoError;
use crate::core::time::normalize_to_rfc3339;
use crate::model::field_type::DataType;
use serde_json::Value as JsonValue;

/// Coerce a raw string (as produced by the Clingo answer parser, or typed
/// by a user at the CLI) into the JSON value appropriate for `data_type`.
/// `"null"` literal and the empty string are universal sentinels handled
/// before the per-type rules.
pub fn coerce(data_type: DataType, raw: &str) -> Result<JsonValue, CyberismoError> {
    if raw == "null" {
        return Ok(JsonValue::Null);
    }
    if raw.is_empty() {
        return Ok(JsonValue::String(String::new()));
    }
    match data_type {
        DataType::Boolean => Ok(JsonValue::Bool(raw == "true")),
        DataType::Number => {
            let n: f64 = raw.parse().map_err(|_| {
                CyberismoError::InputValidation(format!("'{raw}' is not a valid number"))
            })?;
            Ok(serde_json::json!(n))
        }
        DataType::Integer => {
            let n: f64 = raw.parse().map_err(|_| {
                CyberismoError::InputValidation(format!("'{raw}' is not a valid integer"))
            })?;
            Ok(serde_json::json!(n.trunc() as i64))
        }
        DataType::ShortText | DataType::LongText | DataType::Enum => {
            Ok(JsonValue::String(raw.to_string()))
        }
        DataType::List => Ok(JsonValue::Array(coerce_list(raw).into_iter().map(JsonValue::String).collect())),
        DataType::Date => coerce_date(raw),
        DataType::DateTime => normalize_to_rfc3339(raw)
            .map(JsonValue::String)
            .or_else(|| coerce_date_only(raw).map(JsonValue::String))
            .ok_or_else(|| CyberismoError::InputValidation(format!("'{raw}' is not a valid dateTime"))),
        DataType::Person => {
            if raw.contains('@') {
                Ok(JsonValue::String(raw.to_string()))
            } else {
                Ok(JsonValue::Null)
            }
        }
    }
}

/// `"(a, b)"` -> `["a", "b"]`; `"()"` -> `[]`.
fn coerce_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner.split(',').map(|s| s.trim().to_string()).collect()
}

/// ISO date from an ISO dateTime, or a bare `"YYYY"` -> `"YYYY-01-01"`.
fn coerce_date(raw: &str) -> Result<JsonValue, CyberismoError> {
    if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
        return Ok(JsonValue::String(format!("{raw}-01-01")));
    }
    if let Some(date_part) = raw.split('T').next() {
        if date_part.len() == 10 {
            return Ok(JsonValue::String(date_part.to_string()));
        }
    }
    Err(CyberismoError::InputValidation(format!(
        "'{raw}' is not a valid date"
    )))
}

fn coerce_date_only(raw: &str) -> Option<String> {
    if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("{raw}-01-01T00:00:00.000Z"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_empty_sentinels() {
        assert_eq!(coerce(DataType::Number, "null").unwrap(), JsonValue::Null);
        assert_eq!(
            coerce(DataType::ShortText, "").unwrap(),
            JsonValue::String(String::new())
        );
    }

    #[test]
    fn boolean_coercion() {
        assert_eq!(coerce(DataType::Boolean, "true").unwrap(), JsonValue::Bool(true));
        assert_eq!(coerce(DataType::Boolean, "nope").unwrap(), JsonValue::Bool(false));
    }

    #[test]
    fn number_preserves_precision() {
        let v = coerce(DataType::Number, "-1.4000001").unwrap();
        assert_eq!(v.as_f64().unwrap(), -1.4000001);
    }

    #[test]
    fn integer_truncates_toward_zero() {
        assert_eq!(coerce(DataType::Integer, "3.9").unwrap(), serde_json::json!(3));
        assert_eq!(coerce(DataType::Integer, "-3.9").unwrap(), serde_json::json!(-3));
    }

    #[test]
    fn list_parses_parenthesised_csv() {
        assert_eq!(
            coerce(DataType::List, "(a, b)").unwrap(),
            serde_json::json!(["a", "b"])
        );
        assert_eq!(coerce(DataType::List, "()").unwrap(), serde_json::json!([]));
    }

    #[test]
    fn date_from_year_only() {
        assert_eq!(
            coerce(DataType::Date, "2025").unwrap(),
            JsonValue::String("2025-01-01".into())
        );
    }

    #[test]
    fn date_time_normalises_to_z() {
        let v = coerce(DataType::DateTime, "2025-01-01T00:00:00+02:00").unwrap();
        assert_eq!(v, JsonValue::String("2024-12-31T22:00:00.000Z".into()));
    }

    #[test]
    fn person_requires_at_sign() {
        assert_eq!(
            coerce(DataType::Person, "a@b.com").unwrap(),
            JsonValue::String("a@b.com".into())
        );
        assert_eq!(coerce(DataType::Person, "nope").unwrap(), JsonValue::Null);
    }
}
