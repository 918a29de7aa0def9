//! `transition(key, transitionName)` (spec §4.4): move a card to the
//! `toState` of a transition its card type's workflow declares as legal
//! from the card's current state, subject to the action guard.

use crate::core::error::CyberismoError;
use crate::model::resource::Resource;
use crate::project::Project;

pub fn transition(project: &mut Project, key: &str, transition_name: &str) -> Result<(), CyberismoError> {
    let card_type_name = project
        .cards
        .get_card(key)
        .ok_or_else(|| CyberismoError::NotFound(format!("card '{key}'")))?
        .metadata
        .card_type
        .clone();
    let current_state = project.cards.get_card(key).expect("checked above").metadata.workflow_state.clone();

    project.write_lock().with_write_lock(|| {
        let card_type = match project.resources.by_type(&card_type_name, "cardTypes")? {
            Resource::CardType { payload, .. } => payload.clone(),
            _ => unreachable!("by_type guarantees kind"),
        };
        let workflow = match project.resources.by_name(&card_type.workflow)? {
            Resource::Workflow { payload, .. } => payload.clone(),
            _ => {
                return Err(CyberismoError::InvariantViolation(format!(
                    "'{}' does not name a workflow resource",
                    card_type.workflow
                )))
            }
        };
        let transition = workflow
            .find_transition(transition_name)
            .ok_or_else(|| CyberismoError::NotFound(format!("transition '{transition_name}'")))?;
        if !transition.allows_from(&current_state) {
            return Err(CyberismoError::InvariantViolation(format!(
                "transition '{transition_name}' is not legal from state '{current_state}'"
            )));
        }
        let to_state = transition.to_state.clone();

        let updates = crate::permissions::check_transition(&mut project.calc, key, transition_name)?;

        let card = project.cards.get_card_mut(key).expect("checked above");
        card.metadata.workflow_state = to_state;
        card.metadata.last_transitioned = Some(crate::core::time::now_rfc3339());
        card.metadata.last_updated = card.metadata.last_transitioned.clone().expect("just set");
        crate::commands::persist_card_metadata(project, key)?;

        for update in updates {
            crate::commands::apply_field_update(project, &update)?;
        }

        project.calc.handle_card_changed(&project.cards)?;
        crate::commands::record(
            project,
            crate::migration_log::Operation::ResourceUpdate,
            key,
            Some(serde_json::json!({ "transition": transition_name })),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::{StateCategory, Workflow, WorkflowState, WorkflowTransition};

    #[test]
    fn transition_rejects_illegal_from_state() {
        let workflow = Workflow {
            states: vec![
                WorkflowState { name: "Draft".into(), category: StateCategory::Initial },
                WorkflowState { name: "Approved".into(), category: StateCategory::Closed },
            ],
            transitions: vec![WorkflowTransition {
                name: "Approve".into(),
                from_state: vec!["Draft".into()],
                to_state: "Approved".into(),
            }],
        };
        let transition = workflow.find_transition("Approve").unwrap();
        assert!(!transition.allows_from("Approved"));
    }
}
