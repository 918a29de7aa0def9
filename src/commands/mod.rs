//! The mutating command layer (spec §4.4): one function per command.
//! Every command acquires the project's write lock for its entire
//! duration, validates, mutates the in-memory caches, persists to disk,
//! appends a migration-log entry, and notifies the calculation engine —
//! the five-step sequence spec §5 describes for the single writer.

pub mod card;
pub mod export;
pub mod rank;
pub mod resource_ops;
pub mod transition;

use crate::core::error::CyberismoError;
use crate::migration_log::{self, MigrationLogEntry, Operation};
use crate::project::Project;
use std::path::PathBuf;

/// Append one line to the current draft version's migration log.
pub(crate) fn record(
    project: &Project,
    operation: Operation,
    target: &str,
    parameters: Option<serde_json::Value>,
) -> Result<(), CyberismoError> {
    let entry = MigrationLogEntry::new(operation, target, parameters);
    migration_log::append(&project.root, project.draft_version(), &entry)
}

/// Prior on-disk state of one path, captured before a command's
/// filesystem step so a `FilesystemError` partway through can be undone
/// (spec §5 "a per-command journal held in memory").
enum PriorState {
    Absent,
    File(Vec<u8>),
}

/// Records every path a command's filesystem step touches, in order, so
/// the command can roll itself back if a later write in the same command
/// fails. Grounded in the teacher's data-backup/restore pair, generalized
/// here to per-path granularity instead of a whole-directory snapshot.
#[derive(Default)]
pub(crate) struct ReverseJournal {
    entries: Vec<(PathBuf, PriorState)>,
}

impl ReverseJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `path`'s current bytes (or absence) before writing to it.
    pub fn capture(&mut self, path: &std::path::Path) {
        let prior = std::fs::read(path).map(PriorState::File).unwrap_or(PriorState::Absent);
        self.entries.push((path.to_path_buf(), prior));
    }

    /// Undo every captured write, most recent first. Best-effort: a
    /// rollback failure is not itself propagated, since the caller is
    /// already unwinding from the original `FilesystemError`.
    pub fn rollback(&self) {
        for (path, prior) in self.entries.iter().rev() {
            match prior {
                PriorState::Absent => {
                    let _ = crate::core::fsutil::remove_recursive(path);
                }
                PriorState::File(bytes) => {
                    let _ = crate::core::fsutil::write_atomic(path, bytes);
                }
            }
        }
    }
}

/// Apply one calculation-collected field write to a card's metadata,
/// coercing the raw string via the field's declared `dataType`. Shared by
/// `createCard`'s `onCreation` follow-up and `transition`'s `onTransition`
/// follow-up (spec §4.6: "the caller applies the `updateFields`
/// atomically").
pub(crate) fn apply_field_update(
    project: &mut Project,
    update: &crate::calc::parser::FieldUpdate,
) -> Result<(), CyberismoError> {
    let Some(card) = project.cards.get_card(&update.card_key) else {
        return Err(CyberismoError::NotFound(format!("card '{}'", update.card_key)));
    };
    let card_type_name = card.metadata.card_type.clone();
    let data_type = field_data_type(project, &card_type_name, &update.field_key)?;
    let value = crate::coercion::coerce(data_type, &update.value)?;

    let card = project
        .cards
        .get_card_mut(&update.card_key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{}'", update.card_key)))?;
    card.metadata.custom_fields.insert(update.field_key.clone(), value);
    card.metadata.last_updated = crate::core::time::now_rfc3339();
    persist_card_metadata(project, &update.card_key)
}

/// Look up the `dataType` a card type declares for one of its custom
/// fields, resolving the field type resource it names.
pub(crate) fn field_data_type(
    project: &mut Project,
    card_type_name: &str,
    field_key: &str,
) -> Result<crate::model::field_type::DataType, CyberismoError> {
    let card_type = match project.resources.by_type(card_type_name, "cardTypes")? {
        crate::model::resource::Resource::CardType { payload, .. } => payload.clone(),
        _ => unreachable!("by_type guarantees kind"),
    };
    let field_spec = card_type
        .find_field(field_key)
        .ok_or_else(|| CyberismoError::NotFound(format!("field '{field_key}' on card type '{card_type_name}'")))?;
    let field_type_name = field_spec.data_type.clone();
    let field_type = crate::resources::payload_as_field_type(project.resources.by_name(&field_type_name)?)?;
    Ok(field_type.data_type)
}

/// Re-serialise a card's current in-memory metadata to `index.json`.
pub(crate) fn persist_card_metadata(project: &Project, key: &str) -> Result<(), CyberismoError> {
    let card = project
        .cards
        .get_card(key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?;
    let path = crate::core::paths::card_index_json(&card.path);
    let json = serde_json::to_string_pretty(&card.metadata)?;
    crate::core::fsutil::write_atomic_str(&path, &json)
}
