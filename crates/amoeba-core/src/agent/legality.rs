use std::fmt;

use crate::agent::wire::Action;
use crate::config::SimConfig;
use crate::world::{Cell, Reach, World};

/// Why a well-formed action cannot be carried out right now. The reason is
/// written for the model and is sent back verbatim as the corrective turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

pub fn check(agent: &Cell, action: &Action, world: &World, cfg: &SimConfig) -> Option<Rejection> {
    match *action {
        Action::Move {
            direction,
            distance,
        } => {
            let to = world.move_destination(agent.position, direction, distance, cfg);
            let clearance = cfg.tombstone_clearance_cm();
            let tomb = world.tombstone_near(to, clearance)?;
            Some(Rejection {
                reason: format!(
                    "You cannot move {direction} {distance:.1} body-lengths: you would end up {:.1} body-lengths from the tombstone {}, and you must stay at least {:.1} body-lengths away from tombstones. Choose a different direction or distance.",
                    cfg.to_body_lengths(tomb.position.distance(&to)),
                    tomb.id,
                    cfg.tombstone_clearance_body_lengths,
                ),
            })
        }
        Action::Feed => {
            let reach = Reach::feeding(cfg);
            let can_feed = world.food.iter().any(|f| {
                !f.is_depleted(cfg.depletion_threshold)
                    && f.energy_at(f.position.distance(&agent.position), reach) >= 1.0
            });
            (!can_feed).then(|| Rejection {
                reason: "You cannot feed here: your center is not within reach of any food that has at least 1 energy to give. Move closer to a food source first, or choose a different action.".to_string(),
            })
        }
        Action::Divide => (agent.energy() < cfg.division_threshold).then(|| Rejection {
            reason: format!(
                "You cannot divide: your energy is {:.1} but you need at least {:.0}. Choose a different action.",
                agent.energy(),
                cfg.division_threshold
            ),
        }),
        Action::Idle => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::wire::Direction;
    use crate::world::{EnergyLimits, Vec2};

    fn setup(energy: f64) -> (World, SimConfig) {
        let cfg = SimConfig::default();
        let mut world = World::empty(&cfg, 21);
        world.add_amoeba(Vec2::new(2.5, 2.5), energy, &cfg);
        (world, cfg)
    }

    #[test]
    fn moves_ending_near_a_tombstone_are_rejected() {
        let (mut world, cfg) = setup(50.0);
        // Three body-lengths to the right.
        world.add_tombstone(Vec2::new(2.575, 2.5));
        let agent = world.amoebas[0].clone();

        let near = Action::Move {
            direction: Direction::Right,
            distance: 2.0,
        };
        let rejection = check(&agent, &near, &world, &cfg).expect("rejected");
        assert!(rejection.reason.contains("tombstone-0"), "{rejection}");

        let away = Action::Move {
            direction: Direction::Left,
            distance: 2.0,
        };
        assert_eq!(check(&agent, &away, &world, &cfg), None);
    }

    #[test]
    fn exactly_at_the_clearance_is_far_enough() {
        let cfg = SimConfig {
            body_length_cm: 0.25,
            ..SimConfig::default()
        };
        let mut world = World::empty(&cfg, 22);
        let id = world.add_amoeba(Vec2::new(2.5, 2.5), 50.0, &cfg);
        // One body-length right lands at 2.75, two body-lengths short of it.
        world.add_tombstone(Vec2::new(3.25, 2.5));
        let agent = world.amoeba(id).unwrap().clone();
        let step = Action::Move {
            direction: Direction::Right,
            distance: 1.0,
        };
        assert_eq!(check(&agent, &step, &world, &cfg), None);

        let further = Action::Move {
            direction: Direction::Right,
            distance: 1.5,
        };
        assert!(check(&agent, &further, &world, &cfg).is_some());
    }

    #[test]
    fn clamped_destination_is_what_gets_checked() {
        let (mut world, cfg) = setup(50.0);
        world.amoeba_mut(world.amoebas[0].id).unwrap().position = Vec2::new(0.01, 2.5);
        world.add_tombstone(Vec2::new(0.0, 2.5));
        let agent = world.amoebas[0].clone();
        let far_left = Action::Move {
            direction: Direction::Left,
            distance: 5.0,
        };
        assert!(check(&agent, &far_left, &world, &cfg).is_some());
    }

    #[test]
    fn feed_needs_a_unit_of_food_on_offer() {
        let (mut world, cfg) = setup(50.0);
        let agent = world.amoebas[0].clone();
        assert!(check(&agent, &Action::Feed, &world, &cfg).is_some());

        world.add_food(Vec2::new(2.5125, 2.5), 0.05, 10.0);
        assert_eq!(check(&agent, &Action::Feed, &world, &cfg), None);
    }

    #[test]
    fn feed_in_a_thin_halo_is_rejected() {
        let (mut world, cfg) = setup(50.0);
        // Intensity 0.25 at 0.0875 cm offers 0.5 energy.
        world.add_food(Vec2::new(2.5875, 2.5), 0.05, 2.0);
        let agent = world.amoebas[0].clone();
        assert!(check(&agent, &Action::Feed, &world, &cfg).is_some());
    }

    #[test]
    fn divide_threshold() {
        let (mut world, cfg) = setup(89.9);
        let agent = world.amoebas[0].clone();
        let rejection = check(&agent, &Action::Divide, &world, &cfg).expect("rejected");
        assert!(rejection.reason.contains("89.9"));

        let id = agent.id;
        world
            .amoeba_mut(id)
            .unwrap()
            .set_energy(95.0, EnergyLimits::amoeba(&cfg));
        let agent = world.amoebas[0].clone();
        assert_eq!(check(&agent, &Action::Divide, &world, &cfg), None);
        assert_eq!(check(&agent, &Action::Idle, &world, &cfg), None);
    }
}
