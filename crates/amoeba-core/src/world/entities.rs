use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{RangePolicy, SimConfig};

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Vec2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// `other - self`.
    pub fn offset_to(&self, other: &Vec2) -> Vec2 {
        Vec2::new(other.x - self.x, other.y - self.y)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Amoeba,
    Enemy,
    Food,
    Poison,
    Tombstone,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Amoeba => "amoeba",
            EntityKind::Enemy => "enemy",
            EntityKind::Food => "food",
            EntityKind::Poison => "poison",
            EntityKind::Tombstone => "tombstone",
        }
    }

    fn slot(self) -> usize {
        match self {
            EntityKind::Amoeba => 0,
            EntityKind::Enemy => 1,
            EntityKind::Food => 2,
            EntityKind::Poison => 3,
            EntityKind::Tombstone => 4,
        }
    }
}

/// Stable identity, unique within one [`super::World`].
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    pub kind: EntityKind,
    pub seq: u64,
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.label(), self.seq)
    }
}

/// Per-world id counters, one sequence per entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    next: [u64; 5],
}

impl IdAllocator {
    pub fn allocate(&mut self, kind: EntityKind) -> EntityId {
        let slot = &mut self.next[kind.slot()];
        let id = EntityId { kind, seq: *slot };
        *slot += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyLimits {
    pub max: f64,
    /// At or below this an organism dies.
    pub death_threshold: f64,
}

impl EnergyLimits {
    pub fn amoeba(cfg: &SimConfig) -> Self {
        Self {
            max: cfg.max_energy,
            death_threshold: cfg.death_threshold,
        }
    }

    pub fn enemy(cfg: &SimConfig) -> Self {
        Self {
            max: cfg.max_energy,
            death_threshold: cfg.enemy_death_threshold,
        }
    }
}

/// Snapshot handed to renderers and HUDs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CellState {
    pub id: EntityId,
    pub position: Vec2,
    pub energy: f64,
    pub alive: bool,
    pub in_motion: bool,
}

/// A mobile organism: amoebas and enemies share this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub id: EntityId,
    pub position: Vec2,
    energy: f64,
    alive: bool,
    /// Set while a move is still resolving for the motion collaborator.
    pub in_motion: bool,
}

impl Cell {
    pub fn new(id: EntityId, position: Vec2, energy: f64, limits: EnergyLimits) -> Self {
        let mut cell = Self {
            id,
            position,
            energy: 0.0,
            alive: true,
            in_motion: false,
        };
        cell.set_energy(energy, limits);
        cell
    }

    pub fn state(&self) -> CellState {
        CellState {
            id: self.id,
            position: self.position,
            energy: self.energy,
            alive: self.alive,
            in_motion: self.in_motion,
        }
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn alive(&self) -> bool {
        self.alive
    }

    /// Eligible for a decision round.
    pub fn is_ready(&self) -> bool {
        self.alive && !self.in_motion
    }

    pub fn set_energy(&mut self, energy: f64, limits: EnergyLimits) {
        self.energy = if energy.is_finite() {
            energy.clamp(0.0, limits.max)
        } else {
            0.0
        };
        self.check_death(limits);
    }

    pub fn add_energy(&mut self, amount: f64, limits: EnergyLimits) {
        self.set_energy(self.energy + amount.max(0.0), limits);
    }

    /// Movement cost; identical to damage but kept separate for call-site clarity.
    pub fn spend_energy(&mut self, amount: f64, limits: EnergyLimits) {
        self.take_damage(amount, limits);
    }

    pub fn take_damage(&mut self, amount: f64, limits: EnergyLimits) {
        if !self.alive {
            return;
        }
        self.set_energy(self.energy - amount.max(0.0), limits);
    }

    pub fn can_divide(&self, threshold: f64) -> bool {
        self.alive && self.energy >= threshold
    }

    /// Splits energy evenly with a new cell at `child_position`.
    pub fn divide(
        &mut self,
        child_id: EntityId,
        child_position: Vec2,
        threshold: f64,
        limits: EnergyLimits,
    ) -> Option<Cell> {
        if !self.can_divide(threshold) {
            return None;
        }
        let half = self.energy / 2.0;
        self.set_energy(half, limits);
        Some(Cell::new(child_id, child_position, half, limits))
    }

    fn check_death(&mut self, limits: EnergyLimits) {
        if self.alive && self.energy <= limits.death_threshold {
            self.energy = 0.0;
            self.alive = false;
            self.in_motion = false;
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Food,
    Poison,
}

/// How far a node's influence reaches under a given policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reach {
    pub policy: RangePolicy,
    pub halo_multiplier: f64,
}

impl Reach {
    pub fn feeding(cfg: &SimConfig) -> Self {
        Self {
            policy: cfg.feeding_range,
            halo_multiplier: cfg.halo_multiplier,
        }
    }

    pub fn toxin(cfg: &SimConfig) -> Self {
        Self {
            policy: cfg.poison_drain_range,
            halo_multiplier: cfg.halo_multiplier,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResourceState {
    pub id: EntityId,
    pub kind: ResourceKind,
    pub position: Vec2,
    pub radius_cm: f64,
    pub max_energy: f64,
    pub remaining_energy: f64,
}

/// A food or poison deposit whose reach shrinks as it is used up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: EntityId,
    pub kind: ResourceKind,
    pub position: Vec2,
    /// Nominal radius at spawn.
    pub radius_cm: f64,
    max_energy: f64,
    remaining_energy: f64,
}

impl ResourceNode {
    pub fn new(id: EntityId, kind: ResourceKind, position: Vec2, radius_cm: f64, energy: f64) -> Self {
        let max_energy = energy.max(0.0);
        Self {
            id,
            kind,
            position,
            radius_cm: radius_cm.max(0.0),
            max_energy,
            remaining_energy: max_energy,
        }
    }

    pub fn state(&self) -> ResourceState {
        ResourceState {
            id: self.id,
            kind: self.kind,
            position: self.position,
            radius_cm: self.radius_cm,
            max_energy: self.max_energy,
            remaining_energy: self.remaining_energy,
        }
    }

    pub fn max_energy(&self) -> f64 {
        self.max_energy
    }

    pub fn remaining_energy(&self) -> f64 {
        self.remaining_energy
    }

    pub fn energy_ratio(&self) -> f64 {
        if self.max_energy <= 0.0 {
            return 0.0;
        }
        (self.remaining_energy / self.max_energy).clamp(0.0, 1.0)
    }

    pub fn effective_radius(&self, reach: Reach) -> f64 {
        match reach.policy {
            RangePolicy::Nominal => self.radius_cm,
            RangePolicy::EnergyScaled => self.radius_cm * self.energy_ratio(),
        }
    }

    pub fn halo_radius(&self, reach: Reach) -> f64 {
        self.effective_radius(reach) * reach.halo_multiplier.max(1.0)
    }

    /// 1 inside the core, falling linearly to 0 at the halo edge.
    pub fn intensity_at(&self, distance_cm: f64, reach: Reach) -> f64 {
        let core = self.effective_radius(reach);
        if core <= 0.0 {
            return 0.0;
        }
        if distance_cm <= core {
            return 1.0;
        }
        let halo = self.halo_radius(reach);
        if distance_cm > halo || halo <= core {
            return 0.0;
        }
        1.0 - (distance_cm - core) / (halo - core)
    }

    pub fn energy_at(&self, distance_cm: f64, reach: Reach) -> f64 {
        self.intensity_at(distance_cm, reach) * self.remaining_energy
    }

    pub fn in_range(&self, distance_cm: f64, reach: Reach) -> bool {
        self.intensity_at(distance_cm, reach) > 0.0
    }

    /// Removes up to one unit and returns what was taken.
    pub fn consume(&mut self) -> f64 {
        let taken = self.remaining_energy.min(1.0).max(0.0);
        self.drain(taken);
        taken
    }

    pub fn drain(&mut self, amount: f64) {
        self.remaining_energy = (self.remaining_energy - amount.max(0.0)).clamp(0.0, self.max_energy);
    }

    pub fn decay(&mut self, per_cycle: f64) {
        self.drain(per_cycle);
    }

    pub fn is_depleted(&self, threshold: f64) -> bool {
        self.remaining_energy < threshold
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TombstoneState {
    pub id: EntityId,
    pub position: Vec2,
}

/// Marker left where an amoeba died.
#[derive(Debug, Clone, PartialEq)]
pub struct Tombstone {
    pub id: EntityId,
    pub position: Vec2,
}

impl Tombstone {
    pub fn state(&self) -> TombstoneState {
        TombstoneState {
            id: self.id,
            position: self.position,
        }
    }
}
