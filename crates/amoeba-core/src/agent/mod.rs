//! Agent decision primitives: request building, response validation, legality
//! and the per-agent pipeline that ties them to the decision service.
//!
//! The pipeline only reads a world snapshot and returns an owned
//! [`harness::Decision`]; applying it is the orchestrator's job.

pub mod harness;
pub mod legality;
pub mod memory;
pub mod prompt;
pub mod wire;

pub use harness::{
    Decision, DecisionContext, DecisionOutcome, DecisionRecord, LlmClient, PipelineStage, decide,
};
pub use legality::Rejection;
pub use memory::{AgentMemory, HistoryEntry};
pub use wire::{Action, ActionWire, Direction, MoveBounds, ParseFailure, parse_action};
