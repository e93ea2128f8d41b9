use super::super::World;
use super::OutcomeNotes;
use crate::config::SimConfig;
use crate::motion::MotionRequest;
use crate::vision::{VisionParams, nearest_agent_and_toxin_exposure};
use crate::world::entities::{EnergyLimits, Vec2};

impl World {
    /// Enemy turn. Each ready enemy takes poison damage if exposed, then
    /// chases the nearest agent it can see (or wanders), pays for the move and
    /// drains every agent within its drain radius.
    pub fn step_predator_phase(
        &mut self,
        cfg: &SimConfig,
        notes: &mut OutcomeNotes,
    ) -> Vec<MotionRequest> {
        let params = VisionParams::enemy(cfg);
        let enemy_limits = EnergyLimits::enemy(cfg);
        let agent_limits = EnergyLimits::amoeba(cfg);
        let drain_radius = cfg.body_radius_cm() * cfg.enemy_drain_radius_multiplier;
        let max_chase = cfg.from_body_lengths(cfg.max_move_body_lengths);
        let mut motions = Vec::new();

        for index in 0..self.enemies.len() {
            if !self.enemies[index].is_ready() {
                continue;
            }
            let from = self.enemies[index].position;
            let (target, exposed) =
                nearest_agent_and_toxin_exposure(from, &self.amoebas, &self.poison, &params);

            if exposed {
                let enemy = &mut self.enemies[index];
                enemy.take_damage(cfg.poison_drain_per_cycle, enemy_limits);
                if !enemy.alive() {
                    tracing::debug!(enemy = %enemy.id, "world.enemy_poisoned");
                    continue;
                }
            }

            let prey = target.and_then(|id| self.amoeba(id)).map(|a| a.position);
            let to = match prey {
                Some(prey) => {
                    let gap = from.distance(&prey);
                    if gap <= f64::EPSILON {
                        from
                    } else {
                        let ratio = gap.min(max_chase) / gap;
                        let offset = from.offset_to(&prey);
                        self.clamp_to_bounds(Vec2::new(
                            from.x + offset.x * ratio,
                            from.y + offset.y * ratio,
                        ))
                    }
                }
                None => {
                    let rng = self.rng_mut();
                    let angle = rng.angle();
                    let body_lengths = rng.range(
                        cfg.enemy_wander_min_body_lengths,
                        cfg.enemy_wander_max_body_lengths,
                    );
                    let step = cfg.from_body_lengths(body_lengths);
                    self.clamp_to_bounds(Vec2::new(
                        from.x + angle.cos() * step,
                        from.y + angle.sin() * step,
                    ))
                }
            };

            let travelled = cfg.to_body_lengths(from.distance(&to));
            let enemy = &mut self.enemies[index];
            enemy.position = to;
            enemy.spend_energy(travelled * cfg.move_cost_per_body_length, enemy_limits);
            if !enemy.alive() {
                continue;
            }
            if travelled > 0.0 {
                enemy.in_motion = true;
                motions.push(MotionRequest {
                    entity: enemy.id,
                    from,
                    to,
                });
            }

            let enemy_id = enemy.id;
            for agent in self.amoebas.iter_mut().filter(|a| a.alive()) {
                if agent.position.distance(&to) <= drain_radius {
                    agent.take_damage(cfg.enemy_drain_per_cycle, agent_limits);
                    notes.push(
                        agent.id,
                        format!(
                            "{enemy_id} caught you and drained {:.1} energy.",
                            cfg.enemy_drain_per_cycle
                        ),
                    );
                }
            }
        }
        motions
    }
}
