//! Tick phases as `impl World` blocks, applied by the orchestrator in a fixed
//! order after the decision barrier:
//! actions, predators, toxins on agents, poison on food, decay, reconcile, respawn.

mod actions;
mod decay;
mod lifecycle;
mod predation;
mod respawn;
mod toxins;

use std::collections::BTreeMap;

use super::entities::EntityId;

pub use lifecycle::ReconcileReport;

/// What each agent experienced during one tick, in the order it happened.
/// Fed back to the agent as the prior-cycle outcome on its next decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeNotes {
    by_agent: BTreeMap<EntityId, Vec<String>>,
}

impl OutcomeNotes {
    pub fn push(&mut self, agent: EntityId, note: impl Into<String>) {
        self.by_agent.entry(agent).or_default().push(note.into());
    }

    pub fn for_agent(&self, agent: EntityId) -> &[String] {
        self.by_agent.get(&agent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn take(&mut self, agent: EntityId) -> Vec<String> {
        self.by_agent.remove(&agent).unwrap_or_default()
    }

    pub fn forget(&mut self, agent: EntityId) {
        self.by_agent.remove(&agent);
    }

    pub fn is_empty(&self) -> bool {
        self.by_agent.is_empty()
    }
}
