//! Observers the orchestrator reports into. The orchestrator keeps no UI
//! state; anything that wants to show stats or the decision log subscribes here.

use std::collections::VecDeque;

use serde::Serialize;

use crate::agent::harness::DecisionRecord;
use crate::llm::TokenUsage;
use crate::world::{EntityId, PopulationCounts};

/// Bounded decision log; the oldest record is evicted first.
#[derive(Debug, Clone)]
pub struct DecisionLog {
    entries: VecDeque<DecisionRecord>,
    capacity: usize,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1_024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, record: DecisionRecord) {
        self.entries.push_back(record);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.entries.iter()
    }

    pub fn for_agent(&self, agent: EntityId) -> impl Iterator<Item = &DecisionRecord> {
        self.entries.iter().filter(move |r| r.agent == agent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentHud {
    pub id: EntityId,
    pub energy: f64,
    pub in_motion: bool,
}

/// Aggregate figures recomputed at the end of every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleStats {
    pub cycle: u64,
    pub seed: u32,
    pub population: PopulationCounts,
    pub agents: Vec<AgentHud>,
    pub decisions: usize,
    pub deaths: usize,
    pub spawned: usize,
    pub tokens: TokenUsage,
    pub elapsed_ms: u64,
}

pub trait StatsSink: Send + Sync {
    fn publish(&self, stats: &CycleStats);
}

pub trait LogSink: Send + Sync {
    fn append(&self, record: &DecisionRecord);
}

/// Default sink: structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StatsSink for TracingSink {
    fn publish(&self, stats: &CycleStats) {
        tracing::info!(
            cycle = stats.cycle,
            amoebas = stats.population.amoebas,
            enemies = stats.population.enemies,
            food = stats.population.food,
            poison = stats.population.poison,
            tombstones = stats.population.tombstones,
            decisions = stats.decisions,
            deaths = stats.deaths,
            prompt_tokens = stats.tokens.prompt_tokens,
            generated_tokens = stats.tokens.generated_tokens,
            elapsed_ms = stats.elapsed_ms,
            "cycle.stats"
        );
    }
}

impl LogSink for TracingSink {
    fn append(&self, record: &DecisionRecord) {
        tracing::debug!(
            cycle = record.cycle,
            agent = %record.agent,
            attempt = record.attempt,
            outcome = record.outcome.label(),
            details = %record.details(),
            "decision.log"
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StatsSink for NullSink {
    fn publish(&self, _stats: &CycleStats) {}
}

impl LogSink for NullSink {
    fn append(&self, _record: &DecisionRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::harness::{DecisionOutcome, PipelineStage};
    use crate::agent::wire::Action;
    use crate::world::EntityKind;

    fn record(cycle: u64, seq: u64) -> DecisionRecord {
        DecisionRecord {
            cycle,
            agent: EntityId {
                kind: EntityKind::Amoeba,
                seq,
            },
            attempt: 0,
            stage: PipelineStage::Accepted,
            outcome: DecisionOutcome::Accepted {
                action: Action::Idle,
            },
            messages: Vec::new(),
            raw_response: None,
        }
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut log = DecisionLog::new(3);
        for cycle in 1..=5 {
            log.push(record(cycle, 0));
        }
        let cycles: Vec<_> = log.iter().map(|r| r.cycle).collect();
        assert_eq!(cycles, [3, 4, 5]);

        log.set_capacity(1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.iter().next().map(|r| r.cycle), Some(5));
    }

    #[test]
    fn filters_by_agent() {
        let mut log = DecisionLog::new(10);
        log.push(record(1, 0));
        log.push(record(1, 1));
        log.push(record(2, 0));
        let agent = EntityId {
            kind: EntityKind::Amoeba,
            seq: 0,
        };
        assert_eq!(log.for_agent(agent).count(), 2);
    }
}
