//! `import`/`export` (spec §4.4): CSV card import and AsciiDoc/HTML tree
//! export. The rich-text AsciiDoc -> HTML renderer and macro runtime are
//! out of scope (spec §1 Non-goals); export here is a faithful
//! file-per-card dump, not content transformation.

use crate::commands::{self, ReverseJournal};
use crate::core::error::CyberismoError;
use crate::core::lexorank;
use crate::core::paths;
use crate::migration_log::Operation;
use crate::model::card::{Card, CardLocation, CardMetadata, ROOT};
use crate::project::Project;
use std::collections::BTreeMap;
use std::path::Path;

/// `import(csvPath, cardType, parentKey?)`: one new card per CSV data row.
/// The header row must include a `title` column; every other header names
/// a custom field of `cardType`, coerced per that field's declared
/// `dataType`. Blank cells leave the field unset.
pub fn import_csv(
    project: &mut Project,
    csv_path: &Path,
    card_type_name: &str,
    parent_key: Option<&str>,
) -> Result<Vec<String>, CyberismoError> {
    let parent = parent_key.unwrap_or(ROOT).to_string();
    if parent != ROOT {
        let parent_card = project
            .cards
            .get_card(&parent)
            .ok_or_else(|| CyberismoError::NotFound(format!("card '{parent}'")))?;
        if matches!(parent_card.location, CardLocation::Template(_)) {
            return Err(CyberismoError::PermissionDenied(format!(
                "'{parent}' is inside a template and cannot receive new cards"
            )));
        }
    }

    let card_type = match project.resources.by_type(card_type_name, "cardTypes")? {
        crate::model::resource::Resource::CardType { payload, .. } => payload.clone(),
        _ => unreachable!("by_type guarantees kind"),
    };
    let initial_state = crate::resources::payload_as_workflow(project.resources.by_name(&card_type.workflow)?)?
        .initial_state()
        .ok_or_else(|| {
            CyberismoError::InvariantViolation(format!("workflow '{}' has no initial state", card_type.workflow))
        })?
        .name
        .clone();

    let mut reader = csv::Reader::from_path(csv_path)?;
    let headers = reader.headers()?.clone();
    let title_idx = headers
        .iter()
        .position(|h| h == "title")
        .ok_or_else(|| CyberismoError::InputValidation("CSV header row must include a 'title' column".into()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?);
    }
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    project.write_lock().with_write_lock(|| {
        let prefix = project.config.card_key_prefix.clone();
        let mut siblings = sibling_ranks(project, &parent);
        let mut journal = ReverseJournal::new();
        let mut new_cards = Vec::with_capacity(rows.len());

        for record in &rows {
            let title = record.get(title_idx).unwrap_or_default().to_string();
            let mut custom_fields = BTreeMap::new();
            for (idx, header) in headers.iter().enumerate() {
                if idx == title_idx || header.is_empty() {
                    continue;
                }
                let raw = record.get(idx).unwrap_or_default();
                if raw.is_empty() {
                    continue;
                }
                let data_type = commands::field_data_type(project, card_type_name, header)?;
                custom_fields.insert(header.to_string(), crate::coercion::coerce(data_type, raw)?);
            }

            let key = crate::model::card::new_key(&prefix);
            let rank = lexorank::rank_last(&siblings);
            siblings.push(rank.clone());
            let card = Card {
                key: key.clone(),
                path: paths::card_root(&project.root).join(&key),
                parent: parent.clone(),
                children: Vec::new(),
                location: CardLocation::Project,
                metadata: CardMetadata {
                    title,
                    card_type: card_type_name.to_string(),
                    workflow_state: initial_state.clone(),
                    rank,
                    labels: Vec::new(),
                    links: Vec::new(),
                    last_updated: crate::core::time::now_rfc3339(),
                    last_transitioned: None,
                    custom_fields,
                },
                content: String::new(),
                attachments: Vec::new(),
            };
            if let Err(e) = write_card_to_disk(&card, &mut journal) {
                journal.rollback();
                return Err(e);
            }
            new_cards.push(card);
        }

        for card in &new_cards {
            project.cards.insert_new(card.clone())?;
        }
        project.cards.populate_children_relationships();
        project.calc.handle_new_cards(&project.cards, &new_cards)?;

        let new_keys: Vec<String> = new_cards.iter().map(|c| c.key.clone()).collect();
        let updates = crate::permissions::collect_creation_updates(&mut project.calc, &new_keys)?;
        for update in updates {
            commands::apply_field_update(project, &update)?;
        }

        commands::record(
            project,
            Operation::ResourceCreate,
            card_type_name,
            Some(serde_json::json!({
                "importedFrom": csv_path.display().to_string(),
                "newCardKeys": new_keys,
            })),
        )?;
        Ok(new_keys)
    })
}

fn sibling_ranks(project: &Project, parent: &str) -> Vec<String> {
    let mut ranks: Vec<String> = if parent == ROOT {
        project
            .cards
            .root_children()
            .iter()
            .filter_map(|k| project.cards.get_card(k))
            .map(|c| c.metadata.rank.clone())
            .collect()
    } else {
        project
            .cards
            .get_card(parent)
            .map(|p| {
                p.children
                    .iter()
                    .filter_map(|k| project.cards.get_card(k))
                    .map(|c| c.metadata.rank.clone())
                    .collect()
            })
            .unwrap_or_default()
    };
    lexorank::sort_by_rank(&mut ranks, |r| r.clone());
    ranks
}

fn write_card_to_disk(card: &Card, journal: &mut ReverseJournal) -> Result<(), CyberismoError> {
    let index_json = paths::card_index_json(&card.path);
    journal.capture(&index_json);
    crate::core::fsutil::write_atomic_str(&index_json, &serde_json::to_string_pretty(&card.metadata)?)?;

    let index_adoc = paths::card_index_adoc(&card.path);
    journal.capture(&index_adoc);
    crate::core::fsutil::write_atomic_str(&index_adoc, &card.content)
}

/// Export format for [`export_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One `<key>/index.adoc` + `<key>/index.json` pair per card.
    Adoc,
    /// One `<key>/index.html` per card: title as `<h1>`, content escaped
    /// and wrapped in `<pre>` since the AsciiDoc renderer is out of scope.
    Html,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Result<Self, CyberismoError> {
        match raw {
            "adoc" => Ok(ExportFormat::Adoc),
            "html" => Ok(ExportFormat::Html),
            other => Err(CyberismoError::InputValidation(format!(
                "unknown export format '{other}', expected 'adoc' or 'html'"
            ))),
        }
    }
}

/// `export(outDir, format)`: a read-only dump of every project card's
/// tree, mirroring the card key hierarchy under `outDir`. Templates and
/// module content are not exported since the tree always represents the
/// project's own published state.
pub fn export_tree(project: &Project, out_dir: &Path, format: ExportFormat) -> Result<usize, CyberismoError> {
    let mut count = 0;
    for key in project.cards.root_children() {
        count += export_subtree(project, &key, out_dir, format)?;
    }
    Ok(count)
}

fn export_subtree(project: &Project, key: &str, out_dir: &Path, format: ExportFormat) -> Result<usize, CyberismoError> {
    let card = project.cards.get_card(key).ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
    let card_dir = out_dir.join(key);
    let mut count = 0;
    match format {
        ExportFormat::Adoc => {
            crate::core::fsutil::write_atomic_str(&card_dir.join("index.adoc"), &card.content)?;
            crate::core::fsutil::write_atomic_str(
                &card_dir.join("index.json"),
                &serde_json::to_string_pretty(&card.metadata)?,
            )?;
        }
        ExportFormat::Html => {
            crate::core::fsutil::write_atomic_str(&card_dir.join("index.html"), &render_html(card))?;
        }
    }
    count += 1;
    for child in &card.children {
        count += export_subtree(project, child, out_dir, format)?;
    }
    Ok(count)
}

fn render_html(card: &Card) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<h1>{}</h1>\n<pre>{}</pre>\n</body></html>\n",
        escape_html(&card.metadata.title),
        escape_html(&card.metadata.title),
        escape_html(&card.content),
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_known_values() {
        assert_eq!(ExportFormat::parse("adoc").unwrap(), ExportFormat::Adoc);
        assert_eq!(ExportFormat::parse("html").unwrap(), ExportFormat::Html);
        assert!(ExportFormat::parse("pdf").is_err());
    }

    #[test]
    fn html_escapes_markup() {
        let card = Card {
            key: "dec_1".into(),
            path: std::path::PathBuf::from("/tmp/dec_1"),
            parent: ROOT.to_string(),
            children: Vec::new(),
            location: CardLocation::Project,
            metadata: CardMetadata {
                title: "<script>".into(),
                card_type: "dec/cardTypes/decision".into(),
                workflow_state: "Draft".into(),
                rank: "0|m".into(),
                labels: vec![],
                links: vec![],
                last_updated: "2025-01-01T00:00:00.000Z".into(),
                last_transitioned: None,
                custom_fields: Default::default(),
            },
            content: "a & b".into(),
            attachments: vec![],
        };
        let html = render_html(&card);
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a &amp; b"));
    }
}
