//! Compact output rendering for the CLI surface: a standard JSON envelope
//! for `--format json`, and terminal-friendly line collapsing/truncation
//! for human-readable output.

use crate::core::time::{new_uuid_v4, now_rfc3339};
use serde_json::Value as JsonValue;

/// Standard command-result envelope, the JSON shape every CLI subcommand
/// renders when invoked with `--format json`.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelopeVersion": "1.0.0",
        "ts": now_rfc3339(),
        "eventId": new_uuid_v4(),
        "cmd": cmd,
        "status": status,
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

/// Collapse whitespace/newlines and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{preview}...")
    } else {
        preview
    }
}

/// Render up to `max_items` messages compactly, joined with `" | "`, with
/// a trailing `(+N more)` marker when truncated.
pub fn preview_messages(messages: &[String], max_items: usize, max_chars: usize) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let shown = messages
        .iter()
        .take(max_items)
        .map(|m| compact_line(m, max_chars))
        .collect::<Vec<_>>()
        .join(" | ");
    if messages.len() > max_items {
        format!("{shown} (+{} more)", messages.len() - max_items)
    } else {
        shown
    }
}

/// The outcome of one CLI command invocation: a cmd name, a status, a
/// one-line human summary, and whatever structured detail the command
/// wants to carry into `--format json`. Every CLI entry point builds
/// exactly one of these and renders it, so text and JSON output never
/// drift apart.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub cmd: String,
    pub status: OutcomeStatus,
    pub summary: String,
    pub detail: JsonValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Ok,
    Error,
}

impl OutcomeStatus {
    fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Ok => "ok",
            OutcomeStatus::Error => "error",
        }
    }
}

impl CommandOutcome {
    pub fn ok(cmd: impl Into<String>, summary: impl Into<String>, detail: JsonValue) -> Self {
        Self { cmd: cmd.into(), status: OutcomeStatus::Ok, summary: summary.into(), detail }
    }

    pub fn error(cmd: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            status: OutcomeStatus::Error,
            summary: summary.into(),
            detail: JsonValue::Null,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OutcomeStatus::Ok
    }

    pub fn envelope(&self) -> JsonValue {
        command_envelope(
            &self.cmd,
            self.status.as_str(),
            serde_json::json!({ "summary": self.summary, "detail": self.detail }),
        )
    }

    /// Write this outcome to stdout/stderr per `format` ("json" or "text"),
    /// the way every CLI subcommand renders its result.
    pub fn print(&self, format: &str) {
        if format == "json" {
            match serde_json::to_string_pretty(&self.envelope()) {
                Ok(rendered) => println!("{rendered}"),
                Err(e) => eprintln!("failed to render envelope: {e}"),
            }
            return;
        }
        use colored::Colorize;
        match self.status {
            OutcomeStatus::Ok => println!("{} {}", "●".bright_green(), self.summary.bright_white()),
            OutcomeStatus::Error => {
                eprintln!("{} {}", "●".bright_red(), self.summary.bright_white())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_envelope_carries_summary_and_detail() {
        let outcome =
            CommandOutcome::ok("card.create", "created dec_1", serde_json::json!({"key": "dec_1"}));
        let env = outcome.envelope();
        assert_eq!(env["cmd"], "card.create");
        assert_eq!(env["status"], "ok");
        assert_eq!(env["summary"], "created dec_1");
        assert_eq!(env["detail"]["key"], "dec_1");
    }

    #[test]
    fn error_outcome_has_null_detail() {
        let outcome = CommandOutcome::error("card.create", "boom");
        assert!(!outcome.is_ok());
        assert!(outcome.envelope()["detail"].is_null());
    }

    #[test]
    fn envelope_has_required_keys() {
        let env = command_envelope("card.create", "ok", serde_json::json!({"key": "dec_1"}));
        assert_eq!(env["cmd"], "card.create");
        assert_eq!(env["status"], "ok");
        assert_eq!(env["key"], "dec_1");
        assert!(env["ts"].is_string());
        assert!(env["eventId"].is_string());
    }

    #[test]
    fn compact_line_truncates() {
        let long = "a ".repeat(100);
        let out = compact_line(&long, 10);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 13);
    }

    #[test]
    fn preview_messages_counts_overflow() {
        let msgs: Vec<String> = (0..5).map(|i| format!("msg{i}")).collect();
        let out = preview_messages(&msgs, 2, 20);
        assert!(out.contains("(+3 more)"));
    }
}
