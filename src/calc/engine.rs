//! The calculation engine (spec §4.5): assembles a Clingo program from
//! labelled, independently replaceable sections, solves it by shelling out
//! to the `clingo` binary under a process-wide mutex (the solver is not
//! re-entrant), and parses the stable model into typed results.

use crate::cache::card_cache::CardCache;
use crate::cache::resource_cache::ResourceCache;
use crate::calc::builder::ClingoProgramBuilder;
use crate::calc::parser::{self, ActionGuardResult, Fact};
use crate::config::ProjectConfiguration;
use crate::core::error::CyberismoError;
use crate::model::card::Card;
use handlebars::Handlebars;
use serde_json::Value as JsonValue;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// Section names the engine keeps as independently hot-swappable slots.
pub const SECTION_MODULES: &str = "modules";
pub const SECTION_CARDS: &str = "cards";
pub const SECTION_RESOURCES: &str = "resources";

fn section_marker(name: &str, end: bool) -> String {
    format!("% SECTION: {}_{}", name.to_uppercase(), if end { "END" } else { "START" })
}

fn wrap_section(name: &str, body: &str) -> String {
    format!("{}\n{body}\n{}\n", section_marker(name, false), section_marker(name, true))
}

pub struct CalculationEngine {
    sections: Vec<(String, String)>,
    handlebars: Handlebars<'static>,
    /// Clingo is not re-entrant; every solve takes this process-wide lock
    /// (spec §5 "a second, global mutex").
    solver_lock: Mutex<()>,
    clingo_binary: String,
    dot_binary: String,
}

impl Default for CalculationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculationEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        Self {
            sections: Vec::new(),
            handlebars,
            solver_lock: Mutex::new(()),
            clingo_binary: std::env::var("CYBERISMO_CLINGO_BIN").unwrap_or_else(|_| "clingo".to_string()),
            dot_binary: std::env::var("CYBERISMO_DOT_BIN").unwrap_or_else(|_| "dot".to_string()),
        }
    }

    fn set_section(&mut self, name: &str, body: String) {
        let wrapped = wrap_section(name, &body);
        if let Some(slot) = self.sections.iter_mut().find(|(n, _)| n == name) {
            slot.1 = wrapped;
        } else {
            self.sections.push((name.to_string(), wrapped));
        }
    }

    /// Rebuild the `modules`, `cards`, and `resources` sections from
    /// scratch. `card_key` limits the `cards` section to that card's
    /// subtree; `None` rebuilds the whole tree.
    pub fn generate(
        &mut self,
        cards: &CardCache,
        resources: &mut ResourceCache,
        config: &ProjectConfiguration,
        card_key: Option<&str>,
    ) -> Result<(), CyberismoError> {
        let mut modules_builder = ClingoProgramBuilder::new();
        modules_builder.emit_modules(config);
        self.set_section(SECTION_MODULES, modules_builder.finish());

        let mut cards_builder = ClingoProgramBuilder::new();
        match card_key {
            Some(key) => cards_builder.emit_cards(ClingoProgramBuilder::cards_in_subtree(cards, key).into_iter()),
            None => cards_builder.emit_cards(cards.get_cards()),
        }
        self.set_section(SECTION_CARDS, cards_builder.finish());

        let mut resources_builder = ClingoProgramBuilder::new();
        resources_builder.emit_resources(resources);
        self.set_section(SECTION_RESOURCES, resources_builder.finish());
        Ok(())
    }

    /// Replace only the `cards` section with a freshly built tree
    /// containing `new_cards`, added on top of whatever is already there.
    pub fn handle_new_cards(&mut self, cards: &CardCache, new_cards: &[Card]) -> Result<(), CyberismoError> {
        let mut builder = ClingoProgramBuilder::new();
        builder.emit_cards(cards.get_cards());
        let _ = new_cards; // new_cards are already in `cards` by the time commands call this
        self.set_section(SECTION_CARDS, builder.finish());
        Ok(())
    }

    pub fn handle_card_changed(&mut self, cards: &CardCache) -> Result<(), CyberismoError> {
        let mut builder = ClingoProgramBuilder::new();
        builder.emit_cards(cards.get_cards());
        self.set_section(SECTION_CARDS, builder.finish());
        Ok(())
    }

    pub fn handle_delete_card(&mut self, cards: &CardCache) -> Result<(), CyberismoError> {
        let mut builder = ClingoProgramBuilder::new();
        builder.emit_cards(cards.get_cards());
        self.set_section(SECTION_CARDS, builder.finish());
        Ok(())
    }

    /// Concatenate the canned `base.lp`/`queryLanguage.lp` with every
    /// current section, snapshotting slot contents before the solve so a
    /// concurrent writer (were one ever to run under a different lock)
    /// can't tear a solve's view of the program.
    fn assemble(&self, extra: &str) -> String {
        let mut program = String::new();
        program.push_str(&crate::assets::clingo_base());
        program.push('\n');
        program.push_str(&crate::assets::clingo_query_language());
        program.push('\n');
        for (_, body) in &self.sections {
            program.push_str(body);
        }
        program.push_str(extra);
        program
    }

    /// Render `name`'s Handlebars query template with `options`, solve the
    /// assembled program, and parse the resulting facts with `parse`.
    pub fn run_query<T>(
        &mut self,
        name: &str,
        template: &str,
        options: &JsonValue,
        parse: impl FnOnce(&[Fact]) -> T,
    ) -> Result<T, CyberismoError> {
        let rendered = self.handlebars.render_template(template, options)?;
        let facts = self.solve(&rendered, name)?;
        Ok(parse(&facts))
    }

    pub fn run_action_guard(
        &mut self,
        name: &str,
        template: &str,
        options: &JsonValue,
    ) -> Result<ActionGuardResult, CyberismoError> {
        self.run_query(name, template, options, |facts| parser::build_action_guard_result(facts))
    }

    /// Expose the raw-input path for ad-hoc user calculations (spec §4.5
    /// `runLogicProgram`).
    pub fn run_logic_program(&mut self, raw: &str) -> Result<Vec<Fact>, CyberismoError> {
        self.solve(raw, "adhoc")
    }

    fn solve(&mut self, extra_program: &str, context_tag: &str) -> Result<Vec<Fact>, CyberismoError> {
        let program = self.assemble(extra_program);
        let _guard = self.solver_lock.lock().unwrap_or_else(|p| p.into_inner());

        let mut child = Command::new(&self.clingo_binary)
            .arg("--outf=3")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| parser::solver_error(&format!("spawning clingo for {context_tag}"), &e.to_string()))?;

        child
            .stdin
            .take()
            .expect("piped stdin")
            .write_all(program.as_bytes())
            .map_err(|e| parser::solver_error(&format!("writing clingo program for {context_tag}"), &e.to_string()))?;

        let output = child
            .wait_with_output()
            .map_err(|e| parser::solver_error(&format!("running clingo for {context_tag}"), &e.to_string()))?;

        // clingo's exit code is 10/20/30 for SAT/UNSAT/UNKNOWN combinations,
        // not the POSIX 0/1 convention; only a spawn-level failure (no
        // stdout at all) is treated as an error here.
        if output.stdout.is_empty() {
            return Err(parser::solver_error(context_tag, &String::from_utf8_lossy(&output.stderr)));
        }
        parse_clingo_json(&output.stdout, context_tag)
    }

    /// Render and solve a graph query, pass the stable model to Graphviz
    /// `dot`, and return a sanitised base64-encoded SVG (spec §4.5
    /// `runGraph`).
    pub fn run_graph(&mut self, model: &str, view_template: &str, options: &JsonValue) -> Result<String, CyberismoError> {
        let rendered = self.handlebars.render_template(view_template, options)?;
        let facts = self.solve(&format!("{model}\n{rendered}"), "graph")?;
        let dot_source = crate::calc::graph::facts_to_dot(&facts);
        crate::calc::graph::render_svg_base64(&self.dot_binary, &dot_source)
    }
}

/// Parse clingo's `--outf=3` JSON output into a flat fact list from the
/// first witness of the first solve call result.
fn parse_clingo_json(stdout: &[u8], context_tag: &str) -> Result<Vec<Fact>, CyberismoError> {
    let text = String::from_utf8_lossy(stdout);
    let json: JsonValue = serde_json::from_str(&text)
        .map_err(|e| parser::solver_error(&format!("parsing clingo output for {context_tag}"), &e.to_string()))?;

    let result_kind = json["Result"].as_str().unwrap_or("");
    if result_kind == "UNSATISFIABLE" {
        return Err(CyberismoError::SolverError(format!("{context_tag}: program is unsatisfiable")));
    }

    let witness = json["Call"]
        .get(0)
        .and_then(|c| c["Witnesses"].as_array())
        .and_then(|w| w.last())
        .and_then(|w| w["Value"].as_array());

    let Some(atoms) = witness else { return Ok(Vec::new()) };
    let joined = atoms
        .iter()
        .filter_map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(parser::parse_facts(&joined))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_wraps_sections_with_markers() {
        let mut engine = CalculationEngine::new();
        engine.set_section(SECTION_CARDS, "card(\"dec_1\").".to_string());
        let program = engine.assemble("");
        assert!(program.contains("% SECTION: CARDS_START"));
        assert!(program.contains("card(\"dec_1\")."));
        assert!(program.contains("% SECTION: CARDS_END"));
    }

    #[test]
    fn set_section_replaces_in_place() {
        let mut engine = CalculationEngine::new();
        engine.set_section(SECTION_CARDS, "a.".to_string());
        engine.set_section(SECTION_CARDS, "b.".to_string());
        assert_eq!(engine.sections.len(), 1);
        assert!(engine.sections[0].1.contains("b."));
    }

    #[test]
    fn parse_clingo_json_reads_last_witness() {
        let stdout = br#"{"Result":"SATISFIABLE","Call":[{"Witnesses":[{"Value":["card(\"dec_1\")"]}]}]}"#;
        let facts = parse_clingo_json(stdout, "test").unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].predicate, "card");
    }

    #[test]
    fn parse_clingo_json_errors_on_unsat() {
        let stdout = br#"{"Result":"UNSATISFIABLE","Call":[]}"#;
        assert!(parse_clingo_json(stdout, "test").is_err());
    }
}
