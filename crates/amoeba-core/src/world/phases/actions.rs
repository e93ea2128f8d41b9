use super::super::World;
use super::OutcomeNotes;
use crate::agent::wire::{Action, Direction};
use crate::config::SimConfig;
use crate::motion::MotionRequest;
use crate::world::entities::{EnergyLimits, EntityId, EntityKind, Reach};

impl World {
    /// Applies one accepted action to a living amoeba. A move that changes
    /// position marks the mover `in_motion` and returns the transition to start.
    pub fn apply_action(
        &mut self,
        agent: EntityId,
        action: Action,
        cfg: &SimConfig,
        notes: &mut OutcomeNotes,
    ) -> Option<MotionRequest> {
        if !self.amoeba(agent).is_some_and(|a| a.alive()) {
            return None;
        }
        match action {
            Action::Move {
                direction,
                distance,
            } => self.apply_move(agent, direction, distance, cfg, notes),
            Action::Feed => {
                self.apply_feed(agent, cfg, notes);
                None
            }
            Action::Divide => {
                self.apply_divide(agent, cfg, notes);
                None
            }
            Action::Idle => {
                notes.push(agent, "You stayed where you were.");
                None
            }
        }
    }

    fn apply_move(
        &mut self,
        agent: EntityId,
        direction: Direction,
        body_lengths: f64,
        cfg: &SimConfig,
        notes: &mut OutcomeNotes,
    ) -> Option<MotionRequest> {
        let from = self.amoeba(agent)?.position;
        let to = self.move_destination(from, direction, body_lengths, cfg);
        let travelled = cfg.to_body_lengths(from.distance(&to));
        let cost = travelled * cfg.move_cost_per_body_length;
        let limits = EnergyLimits::amoeba(cfg);

        let cell = self.amoeba_mut(agent)?;
        cell.position = to;
        cell.spend_energy(cost, limits);
        if travelled <= 0.0 {
            notes.push(
                agent,
                format!("You tried to move {direction} but the world edge blocked you."),
            );
            return None;
        }
        notes.push(
            agent,
            format!("You moved {direction} {travelled:.2} body-lengths for {cost:.2} energy."),
        );
        if !cell.alive() {
            return None;
        }
        cell.in_motion = true;
        Some(MotionRequest {
            entity: agent,
            from,
            to,
        })
    }

    fn apply_feed(&mut self, agent: EntityId, cfg: &SimConfig, notes: &mut OutcomeNotes) {
        let Some(position) = self.amoeba(agent).map(|a| a.position) else {
            return;
        };
        let reach = Reach::feeding(cfg);
        let best = self
            .food
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_depleted(cfg.depletion_threshold))
            .map(|(i, f)| (i, f.energy_at(f.position.distance(&position), reach)))
            .filter(|(_, here)| *here >= 1.0)
            .fold(None::<(usize, f64)>, |best, (i, here)| match best {
                Some((_, top)) if top >= here => best,
                _ => Some((i, here)),
            });

        let Some((index, _)) = best else {
            notes.push(agent, "You tried to feed but no food was within reach.");
            return;
        };
        let consumed = self.food[index].consume();
        let gain = consumed * cfg.feeding_gain;
        let food_id = self.food[index].id;
        if let Some(cell) = self.amoeba_mut(agent) {
            cell.add_energy(gain, EnergyLimits::amoeba(cfg));
        }
        notes.push(agent, format!("You fed on {food_id} and gained {gain:.2} energy."));
    }

    fn apply_divide(&mut self, agent: EntityId, cfg: &SimConfig, notes: &mut OutcomeNotes) {
        let Some(parent) = self.amoeba(agent) else {
            return;
        };
        if !parent.can_divide(cfg.division_threshold) {
            notes.push(
                agent,
                format!(
                    "You tried to divide but had only {:.1} energy.",
                    parent.energy()
                ),
            );
            return;
        }
        let parent_position = parent.position;
        let child_id = self.allocate_id(EntityKind::Amoeba);
        let child_position = self.offspring_position(parent_position, cfg);
        let limits = EnergyLimits::amoeba(cfg);

        let Some(child) = self.amoeba_mut(agent).and_then(|parent| {
            parent.divide(child_id, child_position, cfg.division_threshold, limits)
        }) else {
            return;
        };
        tracing::info!(
            parent = %agent,
            child = %child_id,
            energy = child.energy(),
            "world.division"
        );
        notes.push(
            agent,
            format!(
                "You divided. You and your offspring {child_id} each have {:.1} energy.",
                child.energy()
            ),
        );
        notes.push(child_id, format!("You were just born by division from {agent}."));
        self.amoebas.push(child);
    }
}
