//! Workflow resource: states and legal transitions for a card type.

use crate::core::error::CyberismoError;
use serde::{Deserialize, Serialize};

pub const WILDCARD_STATE: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateCategory {
    Initial,
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub name: String,
    pub category: StateCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTransition {
    pub name: String,
    pub from_state: Vec<String>,
    pub to_state: String,
}

impl WorkflowTransition {
    pub fn allows_from(&self, state: &str) -> bool {
        self.from_state.iter().any(|s| s == WILDCARD_STATE || s == state)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub states: Vec<WorkflowState>,
    pub transitions: Vec<WorkflowTransition>,
}

impl Workflow {
    pub fn initial_state(&self) -> Option<&WorkflowState> {
        self.states.iter().find(|s| s.category == StateCategory::Initial)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.iter().any(|s| s.name == name)
    }

    pub fn find_transition(&self, name: &str) -> Option<&WorkflowTransition> {
        self.transitions.iter().find(|t| t.name == name)
    }

    /// Invariants from the data model: exactly one initial state, every `toState`
    /// exists, every non-wildcard `fromState` exists.
    pub fn validate(&self) -> Result<(), CyberismoError> {
        let initial_count = self
            .states
            .iter()
            .filter(|s| s.category == StateCategory::Initial)
            .count();
        if initial_count != 1 {
            return Err(CyberismoError::SchemaValidation(format!(
                "workflow must have exactly one initial state, found {initial_count}"
            )));
        }
        for t in &self.transitions {
            if !self.has_state(&t.to_state) {
                return Err(CyberismoError::SchemaValidation(format!(
                    "transition '{}' targets unknown state '{}'",
                    t.name, t.to_state
                )));
            }
            for from in &t.from_state {
                if from != WILDCARD_STATE && !self.has_state(from) {
                    return Err(CyberismoError::SchemaValidation(format!(
                        "transition '{}' references unknown fromState '{}'",
                        t.name, from
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Workflow {
        Workflow {
            states: vec![
                WorkflowState { name: "Draft".into(), category: StateCategory::Initial },
                WorkflowState { name: "Approved".into(), category: StateCategory::Closed },
            ],
            transitions: vec![WorkflowTransition {
                name: "Approve".into(),
                from_state: vec!["Draft".into()],
                to_state: "Approved".into(),
            }],
        }
    }

    #[test]
    fn valid_workflow_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn wildcard_from_state_allowed() {
        let mut wf = sample();
        wf.transitions.push(WorkflowTransition {
            name: "Reopen".into(),
            from_state: vec![WILDCARD_STATE.into()],
            to_state: "Draft".into(),
        });
        assert!(wf.validate().is_ok());
        assert!(wf.find_transition("Reopen").unwrap().allows_from("Approved"));
    }

    #[test]
    fn two_initial_states_fails() {
        let mut wf = sample();
        wf.states.push(WorkflowState { name: "Also".into(), category: StateCategory::Initial });
        assert!(wf.validate().is_err());
    }

    #[test]
    fn unknown_to_state_fails() {
        let mut wf = sample();
        wf.transitions[0].to_state = "Nowhere".into();
        assert!(wf.validate().is_err());
    }
}
