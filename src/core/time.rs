//! Timestamp and identifier helpers shared across commands, the migration
//! log, and command output envelopes.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Current time as an RFC 3339 string with millisecond precision and a `Z`
/// suffix, the format used by `CardMetadata.lastUpdated`/`lastTransitioned`
/// and migration-log timestamps.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// New UUID v4, the migration-log entry identifier format.
pub fn new_uuid_v4() -> String {
    Uuid::new_v4().to_string()
}

/// Parse an arbitrary timestamp-ish string into RFC 3339 `Z` form, used by
/// the `dateTime` field coercion rule.
pub fn normalize_to_rfc3339(raw: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_rfc3339_is_utc_z_suffixed() {
        let ts = now_rfc3339();
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn uuids_are_unique_v4() {
        let a = new_uuid_v4();
        let b = new_uuid_v4();
        assert_ne!(a, b);
        assert_eq!(Uuid::parse_str(&a).unwrap().get_version_num(), 4);
    }

    #[test]
    fn normalize_rejects_bare_date() {
        assert!(normalize_to_rfc3339("2025-01-01").is_none());
        assert!(normalize_to_rfc3339("2025-01-01T00:00:00Z").is_some());
    }
}
