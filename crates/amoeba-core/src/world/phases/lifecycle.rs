use serde::Serialize;

use super::super::World;
use crate::config::SimConfig;
use crate::world::entities::{Cell, EntityId};

/// What [`World::reconcile`] removed and created.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub dead_agents: Vec<EntityId>,
    pub tombstones: Vec<EntityId>,
    pub dead_enemies: usize,
    pub depleted_food: usize,
    pub depleted_poison: usize,
}

impl World {
    /// Drops dead organisms and depleted nodes. Each dead agent leaves a
    /// tombstone at its last position; enemies leave nothing.
    pub fn reconcile(&mut self, cfg: &SimConfig) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut fallen = Vec::new();
        self.amoebas.retain(|a| {
            if !a.alive() {
                fallen.push((a.id, a.position));
            }
            a.alive()
        });
        for (agent, position) in fallen {
            let tombstone = self.add_tombstone(position);
            tracing::info!(
                agent = %agent,
                tombstone = %tombstone,
                x = position.x,
                y = position.y,
                "world.death"
            );
            report.dead_agents.push(agent);
            report.tombstones.push(tombstone);
        }

        let before = self.enemies.len();
        self.enemies.retain(Cell::alive);
        report.dead_enemies = before - self.enemies.len();

        let threshold = cfg.depletion_threshold;
        let before = self.food.len();
        self.food.retain(|f| !f.is_depleted(threshold));
        report.depleted_food = before - self.food.len();

        let before = self.poison.len();
        self.poison.retain(|p| !p.is_depleted(threshold));
        report.depleted_poison = before - self.poison.len();

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{EnergyLimits, Vec2};

    #[test]
    fn dead_agent_leaves_a_tombstone_where_it_fell() {
        let cfg = SimConfig::default();
        let mut world = World::empty(&cfg, 12);
        let survivor = world.add_amoeba(Vec2::new(1.0, 1.0), 50.0, &cfg);
        let victim = world.add_amoeba(Vec2::new(3.0, 2.0), 50.0, &cfg);
        world
            .amoeba_mut(victim)
            .unwrap()
            .set_energy(0.05, EnergyLimits::amoeba(&cfg));

        let report = world.reconcile(&cfg);

        assert_eq!(report.dead_agents, vec![victim]);
        assert_eq!(world.amoebas.len(), 1);
        assert_eq!(world.amoebas[0].id, survivor);
        assert_eq!(world.tombstones.len(), 1);
        assert_eq!(world.tombstones[0].position, Vec2::new(3.0, 2.0));
        assert_eq!(report.tombstones, vec![world.tombstones[0].id]);
    }

    #[test]
    fn enemies_and_depleted_nodes_vanish_without_trace() {
        let cfg = SimConfig::default();
        let mut world = World::empty(&cfg, 12);
        world.add_enemy(Vec2::new(1.0, 1.0), 0.0, &cfg);
        world.add_enemy(Vec2::new(2.0, 1.0), 10.0, &cfg);
        world.add_food(Vec2::new(1.0, 1.0), 0.05, 0.05);
        world.add_food(Vec2::new(1.0, 2.0), 0.05, 5.0);
        world.add_poison(Vec2::new(1.0, 3.0), 0.05, 0.0);

        let report = world.reconcile(&cfg);

        assert_eq!(report.dead_enemies, 1);
        assert_eq!(report.depleted_food, 1);
        assert_eq!(report.depleted_poison, 1);
        assert_eq!(world.enemies.len(), 1);
        assert_eq!(world.food.len(), 1);
        assert!(world.poison.is_empty());
        assert!(world.tombstones.is_empty());
    }
}
