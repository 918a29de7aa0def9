//! Renders a graph query's facts to Graphviz DOT and shells out to `dot`
//! for a sanitised, base64-encoded SVG (spec §4.5 `runGraph`). Kept
//! separate from `engine.rs` so the DOT-specific fact convention (`edge/2`,
//! `node/1`) doesn't leak into the general-purpose query path.

use crate::calc::parser::Fact;
use crate::core::error::CyberismoError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::io::Write;
use std::process::{Command, Stdio};

/// Build a DOT source string from `node/1` and `edge/2` facts produced by
/// a graph model's query. Unrecognised predicates are ignored: a graph
/// model may also emit bookkeeping facts the view never turns into nodes.
pub fn facts_to_dot(facts: &[Fact]) -> String {
    let mut dot = String::from("digraph cyberismo {\n");
    for fact in facts {
        match (fact.predicate.as_str(), fact.args.len()) {
            ("node", 1) => dot.push_str(&format!("  {:?};\n", fact.args[0])),
            ("node", 2) => dot.push_str(&format!("  {:?} [label={:?}];\n", fact.args[0], fact.args[1])),
            ("edge", 2) => dot.push_str(&format!("  {:?} -> {:?};\n", fact.args[0], fact.args[1])),
            ("edge", 3) => {
                dot.push_str(&format!("  {:?} -> {:?} [label={:?}];\n", fact.args[0], fact.args[1], fact.args[2]))
            }
            _ => {}
        }
    }
    dot.push_str("}\n");
    dot
}

/// Run `dot -Tsvg` over `dot_source` and return the output base64-encoded.
/// Sanitisation is left to the renderer consuming the base64 payload
/// (spec §4.5/§4.6 treat this as the stable hand-off boundary to the
/// out-of-scope rich-text renderer); this function only guarantees the
/// bytes came from `dot` itself, not from untrusted card content.
pub fn render_svg_base64(dot_binary: &str, dot_source: &str) -> Result<String, CyberismoError> {
    let mut child = Command::new(dot_binary)
        .arg("-Tsvg")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CyberismoError::SolverError(format!("spawning {dot_binary}: {e}")))?;

    child
        .stdin
        .take()
        .expect("piped stdin")
        .write_all(dot_source.as_bytes())
        .map_err(|e| CyberismoError::SolverError(format!("writing dot source: {e}")))?;

    let output = child
        .wait_with_output()
        .map_err(|e| CyberismoError::SolverError(format!("running {dot_binary}: {e}")))?;

    if !output.status.success() {
        return Err(CyberismoError::SolverError(format!(
            "dot exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(STANDARD.encode(output.stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facts_to_dot_renders_nodes_and_edges() {
        let facts = vec![
            Fact { predicate: "node".into(), args: vec!["dec_1".into()] },
            Fact { predicate: "edge".into(), args: vec!["dec_1".into(), "dec_2".into()] },
        ];
        let dot = facts_to_dot(&facts);
        assert!(dot.starts_with("digraph cyberismo {"));
        assert!(dot.contains("\"dec_1\" -> \"dec_2\";"));
    }

    #[test]
    fn facts_to_dot_ignores_unknown_predicates() {
        let facts = vec![Fact { predicate: "irrelevant".into(), args: vec![] }];
        let dot = facts_to_dot(&facts);
        assert_eq!(dot, "digraph cyberismo {\n}\n");
    }
}
