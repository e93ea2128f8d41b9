use super::super::World;
use super::OutcomeNotes;
use crate::config::SimConfig;
use crate::world::entities::{EnergyLimits, Reach};

impl World {
    /// Every poison node whose drain region covers a living agent takes
    /// `poison_drain_per_cycle` from it.
    pub fn step_toxin_phase(&mut self, cfg: &SimConfig, notes: &mut OutcomeNotes) {
        let reach = Reach::toxin(cfg);
        let limits = EnergyLimits::amoeba(cfg);
        for agent in self.amoebas.iter_mut().filter(|a| a.alive()) {
            let hits = self
                .poison
                .iter()
                .filter(|p| !p.is_depleted(cfg.depletion_threshold))
                .filter(|p| p.in_range(p.position.distance(&agent.position), reach))
                .count();
            if hits == 0 {
                continue;
            }
            let drained = hits as f64 * cfg.poison_drain_per_cycle;
            agent.take_damage(drained, limits);
            notes.push(agent.id, format!("Poison drained {drained:.1} energy from you."));
        }
    }

    /// Food whose core overlaps a poison halo spoils by
    /// `poison_food_drain_per_cycle` per overlapping poison node.
    pub fn step_poison_on_food_phase(&mut self, cfg: &SimConfig) {
        let toxin = Reach::toxin(cfg);
        let feeding = Reach::feeding(cfg);
        for food in self
            .food
            .iter_mut()
            .filter(|f| !f.is_depleted(cfg.depletion_threshold))
        {
            let overlaps = self
                .poison
                .iter()
                .filter(|p| !p.is_depleted(cfg.depletion_threshold))
                .filter(|p| {
                    p.position.distance(&food.position)
                        < p.halo_radius(toxin) + food.effective_radius(feeding)
                })
                .count();
            if overlaps > 0 {
                food.drain(overlaps as f64 * cfg.poison_food_drain_per_cycle);
            }
        }
    }
}
