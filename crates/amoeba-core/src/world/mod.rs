//! Simulation state: entities, the world root and its per-tick phases.

pub mod entities;
pub mod phases;
mod world_state;

pub use entities::{
    Cell, CellState, EnergyLimits, EntityId, EntityKind, IdAllocator, Reach, ResourceKind,
    ResourceNode, ResourceState, Tombstone, TombstoneState, Vec2,
};
pub use phases::{OutcomeNotes, ReconcileReport};
pub use world_state::{PopulationCounts, World};
