use super::super::World;
use crate::config::SimConfig;

impl World {
    pub fn step_decay_phase(&mut self, cfg: &SimConfig) {
        for node in self.food.iter_mut().chain(self.poison.iter_mut()) {
            if !node.is_depleted(cfg.depletion_threshold) {
                node.decay(cfg.decay_per_cycle);
            }
        }
    }
}
