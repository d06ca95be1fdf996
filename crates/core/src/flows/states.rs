use serde::{Deserialize, Serialize};

use crate::domain::journey::StateMachine;
use crate::errors::DomainError;
use crate::keys::{canonicalize, is_canonical_state_key};

/// Fallback default when a journey has no states yet.
pub const SEED_STATE: &str = "new";

/// Operator-facing editor for a journey's ordered state list.
///
/// Never fails: labels are canonicalized, empties and repeats are dropped, and the
/// default is re-derived whenever it stops pointing at a listed state. Whether a
/// resulting machine is good enough to save is decided by [`validate_for_catalog`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachineBuilder {
    states: Vec<String>,
    default_state: Option<String>,
}

impl StateMachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels<I, S>(labels: I, default_label: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = Self::new();
        for label in labels {
            builder.append(label.as_ref());
        }
        builder.set_default(default_label);
        builder
    }

    pub fn from_machine(machine: &StateMachine) -> Self {
        Self::from_labels(&machine.states, &machine.default_state)
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Adds a state unless it canonicalizes to empty or is already present.
    /// Returns the key that was added.
    pub fn append(&mut self, label: &str) -> Option<String> {
        let key = canonicalize(label);
        if key.is_empty() || self.states.contains(&key) {
            return None;
        }
        self.states.push(key.clone());
        Some(key)
    }

    pub fn remove(&mut self, label: &str) -> bool {
        let key = canonicalize(label);
        let Some(index) = self.states.iter().position(|state| *state == key) else {
            return false;
        };
        self.states.remove(index);
        if self.default_state.as_deref() == Some(key.as_str()) {
            self.default_state = self.states.first().cloned();
        }
        true
    }

    /// Takes the state at `from` out and re-inserts it at `to` (clamped to the end).
    pub fn move_state(&mut self, from: usize, to: usize) -> bool {
        if from >= self.states.len() {
            return false;
        }
        let state = self.states.remove(from);
        let to = to.min(self.states.len());
        self.states.insert(to, state);
        true
    }

    pub fn set_default(&mut self, label: &str) {
        let key = canonicalize(label);
        self.default_state = (!key.is_empty()).then_some(key);
    }

    pub fn build(&self) -> StateMachine {
        let default_state = match &self.default_state {
            Some(state) if self.states.contains(state) => state.clone(),
            _ => self.states.first().cloned().unwrap_or_else(|| SEED_STATE.to_string()),
        };
        StateMachine { states: self.states.clone(), default_state }
    }
}

/// Business rules the catalog-write path applies before a machine is persisted.
pub fn validate_for_catalog(machine: &StateMachine, min_states: usize) -> Result<(), DomainError> {
    if machine.states.len() < min_states {
        return Err(DomainError::TooFewStates { found: machine.states.len(), minimum: min_states });
    }

    for (index, state) in machine.states.iter().enumerate() {
        if state.is_empty() {
            return Err(DomainError::EmptyStateKey { raw: state.clone() });
        }
        if !is_canonical_state_key(state) {
            return Err(DomainError::NonCanonicalStateKey { state: state.clone() });
        }
        if machine.states[..index].contains(state) {
            return Err(DomainError::DuplicateState { state: state.clone() });
        }
    }

    if !machine.contains(&machine.default_state) {
        return Err(DomainError::DefaultStateNotInStates { state: machine.default_state.clone() });
    }

    Ok(())
}
