use super::super::World;
use crate::config::SimConfig;

impl World {
    /// Tops food, poison and enemies back up to quota. Returns how many
    /// entities were spawned.
    pub fn step_respawn_phase(&mut self, cfg: &SimConfig) -> usize {
        let mut spawned = 0;
        while self.food.len() < cfg.food_quota {
            self.spawn_random_food(cfg);
            spawned += 1;
        }
        while self.poison.len() < cfg.poison_quota {
            self.spawn_random_poison(cfg);
            spawned += 1;
        }
        while self.enemies.len() < cfg.enemy_quota {
            self.spawn_random_enemy(cfg);
            spawned += 1;
        }
        if spawned > 0 {
            tracing::debug!(spawned, "world.respawn");
        }
        spawned
    }
}
