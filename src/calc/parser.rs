//! Parses Clingo stable-model output into facts, and facts into the typed
//! tree/result shapes spec §4.5 describes: "each fact whose first argument
//! matches a previously seen `parent/2` fact is attached as a child;
//! scalar fields come from `field(Parent, Key, Value)` facts whose
//! `Value` is coerced via the field type's `dataType`".

use crate::core::error::CyberismoError;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub predicate: String,
    pub args: Vec<String>,
}

/// Parse one stable model's worth of `predicate(arg1, arg2).` lines (the
/// body between `Answer: N` and the next `Answer:`/`SATISFIABLE` marker).
pub fn parse_facts(raw: &str) -> Vec<Fact> {
    let mut facts = Vec::new();
    for token in tokenize_atoms(raw) {
        if let Some(fact) = parse_atom(&token) {
            facts.push(fact);
        }
    }
    facts
}

/// Clingo prints one answer set as space-separated atoms, possibly spread
/// over several lines; split on whitespace that is not inside a quoted
/// string.
fn tokenize_atoms(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut depth = 0i32;
    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '(' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quotes => {
                depth -= 1;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes && depth == 0 => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Parse a single `predicate(arg, "arg", ...).` atom, stripping the
/// trailing period Clingo's pretty-printer sometimes keeps attached.
fn parse_atom(atom: &str) -> Option<Fact> {
    let atom = atom.trim().trim_end_matches('.');
    let open = atom.find('(')?;
    let close = atom.rfind(')')?;
    if close < open {
        return None;
    }
    let predicate = atom[..open].to_string();
    let inner = &atom[open + 1..close];
    let args = split_args(inner);
    Some(Fact { predicate, args })
}

/// Split a Clingo argument list on top-level commas, respecting quotes and
/// nested parens so `(a, b)` inside an arg isn't split.
fn split_args(inner: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '(' if !in_quotes => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quotes => {
                depth -= 1;
                current.push(c);
            }
            ',' if !in_quotes && depth == 0 => {
                args.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }
    args.into_iter().map(unquote).collect()
}

fn unquote(raw: String) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw[1..raw.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\")
    } else {
        raw
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldUpdate {
    pub card_key: String,
    pub field_key: String,
    pub value: String,
}

/// The action guard's result shape: an optional deny reason plus any
/// follow-up field writes (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct ActionGuardResult {
    pub deny: Option<String>,
    pub update_fields: Vec<FieldUpdate>,
}

pub fn build_action_guard_result(facts: &[Fact]) -> ActionGuardResult {
    let mut result = ActionGuardResult::default();
    for fact in facts {
        match fact.predicate.as_str() {
            "deny" if !fact.args.is_empty() => result.deny = Some(fact.args[0].clone()),
            "updateField" if fact.args.len() == 3 => result.update_fields.push(FieldUpdate {
                card_key: fact.args[0].clone(),
                field_key: fact.args[1].clone(),
                value: fact.args[2].clone(),
            }),
            _ => {}
        }
    }
    result
}

/// A minimal card node assembled from `card/1`, `parent/2`, `field/3`
/// facts, used by report/graph result trees.
#[derive(Debug, Clone, Default)]
pub struct CardNode {
    pub key: String,
    pub parent: Option<String>,
    pub fields: HashMap<String, String>,
    pub children: Vec<String>,
}

/// Assemble a card-key -> node map from a flat fact list, attaching
/// children under whichever `parent/2` fact named them.
pub fn build_card_tree(facts: &[Fact]) -> HashMap<String, CardNode> {
    let mut nodes: HashMap<String, CardNode> = HashMap::new();
    for fact in facts {
        if fact.predicate == "card" && fact.args.len() == 1 {
            nodes.entry(fact.args[0].clone()).or_insert_with(|| CardNode {
                key: fact.args[0].clone(),
                ..Default::default()
            });
        }
    }
    for fact in facts {
        match fact.predicate.as_str() {
            "parent" if fact.args.len() == 2 => {
                let (child, parent) = (fact.args[0].clone(), fact.args[1].clone());
                nodes.entry(child.clone()).or_insert_with(|| CardNode { key: child.clone(), ..Default::default() });
                if let Some(node) = nodes.get_mut(&child) {
                    node.parent = Some(parent.clone());
                }
                nodes.entry(parent.clone()).or_insert_with(|| CardNode { key: parent.clone(), ..Default::default() });
                if let Some(parent_node) = nodes.get_mut(&parent) {
                    if !parent_node.children.contains(&child) {
                        parent_node.children.push(child);
                    }
                }
            }
            "field" if fact.args.len() == 3 => {
                let node = nodes
                    .entry(fact.args[0].clone())
                    .or_insert_with(|| CardNode { key: fact.args[0].clone(), ..Default::default() });
                node.fields.insert(fact.args[1].clone(), fact.args[2].clone());
            }
            _ => {}
        }
    }
    nodes
}

/// Raise a `SolverError` out of Clingo's stderr/exit status.
pub fn solver_error(context: &str, stderr: &str) -> CyberismoError {
    CyberismoError::SolverError(format!("{context}: {}", stderr.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_and_nested_args() {
        let facts = parse_facts(r#"card("dec_1") parent("dec_1", "ROOT") field("dec_1", "severity", "high")"#);
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0], Fact { predicate: "card".into(), args: vec!["dec_1".into()] });
        assert_eq!(facts[2].args, vec!["dec_1", "severity", "high"]);
    }

    #[test]
    fn unescapes_quotes_inside_strings() {
        let facts = parse_facts(r#"field("dec_1", "note", "has \"quotes\"")"#);
        assert_eq!(facts[0].args[2], "has \"quotes\"");
    }

    #[test]
    fn action_guard_collects_deny_and_updates() {
        let facts = parse_facts(r#"deny("not allowed") updateField("dec_1", "severity", "high")"#);
        let result = build_action_guard_result(&facts);
        assert_eq!(result.deny.as_deref(), Some("not allowed"));
        assert_eq!(result.update_fields.len(), 1);
        assert_eq!(result.update_fields[0].field_key, "severity");
    }

    #[test]
    fn builds_card_tree_with_children_and_fields() {
        let facts = parse_facts(
            r#"card("dec_1") card("dec_2") parent("dec_2", "dec_1") field("dec_2", "severity", "high")"#,
        );
        let tree = build_card_tree(&facts);
        assert_eq!(tree["dec_1"].children, vec!["dec_2".to_string()]);
        assert_eq!(tree["dec_2"].parent.as_deref(), Some("dec_1"));
        assert_eq!(tree["dec_2"].fields["severity"], "high");
    }
}
