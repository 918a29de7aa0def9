//! `ClingoProgramBuilder`: emits Clingo facts for the card tree and
//! resources. One builder call per predicate family; callers concatenate
//! the resulting strings into a labelled section (spec §4.5 "Facts are
//! produced by a ClingoProgramBuilder that emits predicate(arg, "string",
//! (nested, args)). lines").

use crate::cache::card_cache::CardCache;
use crate::cache::resource_cache::ResourceCache;
use crate::config::ProjectConfiguration;
use crate::model::card::{Card, ROOT};
use crate::model::resource::Resource;
use crate::model::workflow::StateCategory;
use std::fmt::Write as _;

#[derive(Default)]
pub struct ClingoProgramBuilder {
    buf: String,
}

impl ClingoProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        self.buf
    }

    /// A Clingo string literal: backslash- and quote-escaped.
    fn lit(s: &str) -> String {
        let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    }

    fn fact(&mut self, predicate: &str, args: &[String]) {
        let _ = writeln!(self.buf, "{predicate}({}).", args.join(", "));
    }

    pub fn include(&mut self, path: &str) {
        let _ = writeln!(self.buf, "#include {}.", Self::lit(path));
    }

    pub fn comment(&mut self, text: &str) {
        let _ = writeln!(self.buf, "% {text}");
    }

    /// Emit every card/parent/metadata/field fact for `cards`, optionally
    /// restricted to the subtree rooted at `root_key`.
    pub fn emit_cards<'a>(&mut self, cards: impl Iterator<Item = &'a Card>) {
        let all: Vec<&Card> = cards.collect();
        for card in &all {
            self.fact("card", &[Self::lit(&card.key)]);
            self.fact("parent", &[Self::lit(&card.key), Self::lit(&card.parent)]);
            self.fact("cardType", &[Self::lit(&card.key), Self::lit(&card.metadata.card_type)]);
            self.fact(
                "workflowState",
                &[Self::lit(&card.key), Self::lit(&card.metadata.workflow_state)],
            );
            self.fact("rank", &[Self::lit(&card.key), Self::lit(&card.metadata.rank)]);
            for label in &card.metadata.labels {
                self.fact("label", &[Self::lit(&card.key), Self::lit(label)]);
            }
            for link in &card.metadata.links {
                self.fact(
                    "link",
                    &[Self::lit(&card.key), Self::lit(&link.link_type), Self::lit(&link.card_key)],
                );
            }
            for (key, value) in &card.metadata.custom_fields {
                self.fact("field", &[Self::lit(&card.key), Self::lit(key), Self::lit(&value.to_string())]);
            }
        }
    }

    /// Subtree of `cards` rooted at `root_key` (inclusive), by walking
    /// `children` from the card cache.
    pub fn cards_in_subtree<'a>(cache: &'a CardCache, root_key: &str) -> Vec<&'a Card> {
        let mut out = Vec::new();
        let mut stack = vec![root_key.to_string()];
        while let Some(key) = stack.pop() {
            if let Some(card) = cache.get_card(&key) {
                out.push(card);
                stack.extend(card.children.iter().cloned());
            }
        }
        out
    }

    pub fn emit_modules(&mut self, config: &ProjectConfiguration) {
        for module in &config.modules {
            self.fact(
                "module",
                &[Self::lit(&module.name), Self::lit(&module.card_key_prefix)],
            );
        }
    }

    pub fn emit_resources(&mut self, resources: &mut ResourceCache) {
        let names: Vec<String> = resources.registry_entries().map(|e| e.name.to_string()).collect();
        for name in names {
            let Ok(resource) = resources.by_name(&name) else { continue };
            match resource {
                Resource::Workflow { name, payload } => {
                    for state in &payload.states {
                        self.fact(
                            "state",
                            &[Self::lit(&name.to_string()), Self::lit(&state.name)],
                        );
                        let category = match state.category {
                            StateCategory::Initial => "initial",
                            StateCategory::Active => "active",
                            StateCategory::Closed => "closed",
                        };
                        self.fact("category", &[Self::lit(&state.name), category.to_string()]);
                        if state.category == StateCategory::Initial {
                            self.fact("initialState", &[Self::lit(&name.to_string()), Self::lit(&state.name)]);
                        }
                    }
                    for transition in &payload.transitions {
                        for from in &transition.from_state {
                            self.fact(
                                "transition",
                                &[
                                    Self::lit(&name.to_string()),
                                    Self::lit(&transition.name),
                                    Self::lit(from),
                                    Self::lit(&transition.to_state),
                                ],
                            );
                        }
                    }
                }
                Resource::CardType { name, payload } => {
                    self.fact("workflow", &[Self::lit(&name.to_string()), Self::lit(&payload.workflow)]);
                    for field in &payload.custom_fields {
                        self.fact(
                            "cardTypeField",
                            &[Self::lit(&name.to_string()), Self::lit(&field.name), Self::lit(&field.data_type)],
                        );
                    }
                }
                Resource::LinkType { name, payload } => {
                    self.fact(
                        "linkTypeDescriptionEnabled",
                        &[Self::lit(&name.to_string()), payload.enable_link_description.to_string()],
                    );
                    for src in &payload.source_card_types {
                        self.fact("linkTypeSource", &[Self::lit(&name.to_string()), Self::lit(src)]);
                    }
                    for dst in &payload.destination_card_types {
                        self.fact("linkTypeDestination", &[Self::lit(&name.to_string()), Self::lit(dst)]);
                    }
                }
                Resource::Report { name, .. } => {
                    self.fact("report", &[Self::lit(&name.to_string())]);
                }
                _ => {}
            }
        }
    }

    pub fn root_marker() -> &'static str {
        ROOT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::card::{Card, CardLocation, CardMetadata};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn card(key: &str) -> Card {
        Card {
            key: key.to_string(),
            path: PathBuf::from("/tmp"),
            parent: ROOT.to_string(),
            children: vec![],
            location: CardLocation::Project,
            metadata: CardMetadata {
                title: "T".into(),
                card_type: "dec/cardTypes/decision".into(),
                workflow_state: "Draft".into(),
                rank: "0|m".into(),
                labels: vec!["x".into()],
                links: vec![],
                last_updated: "2025-01-01T00:00:00.000Z".into(),
                last_transitioned: None,
                custom_fields: BTreeMap::new(),
            },
            content: String::new(),
            attachments: vec![],
        }
    }

    #[test]
    fn emits_card_and_label_facts() {
        let mut builder = ClingoProgramBuilder::new();
        builder.emit_cards(std::iter::once(&card("dec_1")));
        let out = builder.finish();
        assert!(out.contains("card(\"dec_1\")."));
        assert!(out.contains("label(\"dec_1\", \"x\")."));
    }

    #[test]
    fn escapes_quotes_in_literals() {
        let mut builder = ClingoProgramBuilder::new();
        let mut c = card("dec_1");
        c.metadata.title = "has \"quotes\"".into();
        // title isn't emitted as a fact directly; verify escaping via a custom field instead.
        c.metadata.custom_fields.insert("note".into(), serde_json::json!("has \"quotes\""));
        builder.emit_cards(std::iter::once(&c));
        let out = builder.finish();
        assert!(out.contains("\\\""));
    }
}
