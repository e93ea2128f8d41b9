//! Local sensing: what one organism can perceive around it.
//!
//! Results are ordered by ascending distance with a stable sort, so equal
//! distances keep the scan order food, poison, enemy, agent.

use serde::Serialize;

use crate::config::SimConfig;
use crate::world::{Cell, EntityId, Reach, ResourceNode, Vec2};

/// Radius and reach rules for one kind of viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionParams {
    pub radius_cm: f64,
    pub feeding: Reach,
    pub toxin: Reach,
    pub depletion_threshold: f64,
}

impl VisionParams {
    pub fn agent(cfg: &SimConfig) -> Self {
        Self::with_radius(cfg, cfg.agent_vision_cm)
    }

    pub fn enemy(cfg: &SimConfig) -> Self {
        Self::with_radius(cfg, cfg.enemy_vision_cm)
    }

    fn with_radius(cfg: &SimConfig, radius_cm: f64) -> Self {
        Self {
            radius_cm,
            feeding: Reach::feeding(cfg),
            toxin: Reach::toxin(cfg),
            depletion_threshold: cfg.depletion_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensedKind {
    Food {
        radius_cm: f64,
        remaining_energy: f64,
        /// Energy on offer at the viewer's position.
        energy_here: f64,
    },
    Poison {
        radius_cm: f64,
        remaining_energy: f64,
        /// Whether the viewer is currently inside the drain region.
        draining: bool,
    },
    Enemy {
        energy: f64,
    },
    Agent {
        energy: f64,
    },
}

impl SensedKind {
    pub fn label(&self) -> &'static str {
        match self {
            SensedKind::Food { .. } => "food",
            SensedKind::Poison { .. } => "poison",
            SensedKind::Enemy { .. } => "enemy",
            SensedKind::Agent { .. } => "amoeba",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensedObject {
    pub id: EntityId,
    /// Target position minus viewer position, in centimetres.
    pub offset: Vec2,
    pub distance_cm: f64,
    pub kind: SensedKind,
}

/// Everything `viewer` perceives.
///
/// Organisms count when within the vision radius. Resource nodes count when
/// within the vision radius plus their current halo, so a large deposit is
/// noticed before its centre is in view. The viewer never sees itself.
pub fn surroundings_of(
    viewer: &Cell,
    agents: &[Cell],
    enemies: &[Cell],
    food: &[ResourceNode],
    poison: &[ResourceNode],
    params: &VisionParams,
) -> Vec<SensedObject> {
    let origin = viewer.position;
    let mut sensed = Vec::new();

    for node in food
        .iter()
        .filter(|n| !n.is_depleted(params.depletion_threshold))
    {
        let distance_cm = origin.distance(&node.position);
        if distance_cm <= params.radius_cm + node.halo_radius(params.feeding) {
            sensed.push(SensedObject {
                id: node.id,
                offset: origin.offset_to(&node.position),
                distance_cm,
                kind: SensedKind::Food {
                    radius_cm: node.radius_cm,
                    remaining_energy: node.remaining_energy(),
                    energy_here: node.energy_at(distance_cm, params.feeding),
                },
            });
        }
    }

    for node in poison
        .iter()
        .filter(|n| !n.is_depleted(params.depletion_threshold))
    {
        let distance_cm = origin.distance(&node.position);
        if distance_cm <= params.radius_cm + node.halo_radius(params.toxin) {
            sensed.push(SensedObject {
                id: node.id,
                offset: origin.offset_to(&node.position),
                distance_cm,
                kind: SensedKind::Poison {
                    radius_cm: node.radius_cm,
                    remaining_energy: node.remaining_energy(),
                    draining: node.in_range(distance_cm, params.toxin),
                },
            });
        }
    }

    for enemy in enemies.iter().filter(|e| e.alive()) {
        let distance_cm = origin.distance(&enemy.position);
        if distance_cm <= params.radius_cm {
            sensed.push(SensedObject {
                id: enemy.id,
                offset: origin.offset_to(&enemy.position),
                distance_cm,
                kind: SensedKind::Enemy {
                    energy: enemy.energy(),
                },
            });
        }
    }

    for other in agents.iter().filter(|a| a.alive() && a.id != viewer.id) {
        let distance_cm = origin.distance(&other.position);
        if distance_cm <= params.radius_cm {
            sensed.push(SensedObject {
                id: other.id,
                offset: origin.offset_to(&other.position),
                distance_cm,
                kind: SensedKind::Agent {
                    energy: other.energy(),
                },
            });
        }
    }

    sensed.sort_by(|a, b| a.distance_cm.total_cmp(&b.distance_cm));
    sensed
}

/// Predator view: the closest living agent in range, and whether any poison
/// is draining the viewer at `position`.
pub fn nearest_agent_and_toxin_exposure(
    position: Vec2,
    agents: &[Cell],
    poisons: &[ResourceNode],
    params: &VisionParams,
) -> (Option<EntityId>, bool) {
    let nearest = agents
        .iter()
        .filter(|a| a.alive())
        .map(|a| (a.id, position.distance(&a.position)))
        .filter(|(_, d)| *d <= params.radius_cm)
        .fold(None::<(EntityId, f64)>, |best, (id, d)| match best {
            Some((_, top)) if top <= d => best,
            _ => Some((id, d)),
        })
        .map(|(id, _)| id);

    let exposed = poisons.iter().any(|p| {
        !p.is_depleted(params.depletion_threshold)
            && p.in_range(position.distance(&p.position), params.toxin)
    });

    (nearest, exposed)
}
