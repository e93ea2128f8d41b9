use std::fmt::Write;

use crate::agent::wire::Direction;
use crate::config::SimConfig;
use crate::llm::ChatMessage;
use crate::vision::{SensedKind, SensedObject};
use crate::world::{CellState, Vec2};

/// Builds the `(system, user)` pair for one decision. The user turn is plain
/// text with every distance in body-lengths.
pub fn build(
    system_prompt: &str,
    state: &CellState,
    sensed: &[SensedObject],
    cfg: &SimConfig,
) -> (ChatMessage, ChatMessage) {
    (
        ChatMessage::system(system_prompt),
        ChatMessage::user(describe_state(state, sensed, cfg)),
    )
}

pub fn describe_state(state: &CellState, sensed: &[SensedObject], cfg: &SimConfig) -> String {
    let bl = |cm: f64| cfg.to_body_lengths(cm);
    let mut out = String::new();

    let _ = writeln!(out, "You are {}.", state.id);
    let _ = writeln!(
        out,
        "Position: x={:.1} y={:.1} body-lengths (world is {:.0} x {:.0}).",
        bl(state.position.x),
        bl(state.position.y),
        bl(cfg.world_width_cm),
        bl(cfg.world_height_cm)
    );
    let _ = writeln!(out, "Energy: {:.1} / {:.0}", state.energy, cfg.max_energy);

    if sensed.is_empty() {
        out.push_str("Nearby: nothing within sight.");
        return out;
    }

    out.push_str("Nearby (dx grows right, dy grows down):");
    for object in sensed {
        let _ = write!(
            out,
            "\n- {} {}: dx={:+.1} dy={:+.1}, {:.1} body-lengths {}",
            object.kind.label(),
            object.id,
            bl(object.offset.x),
            bl(object.offset.y),
            bl(object.distance_cm),
            heading(object.offset).map_or("here", Direction::label),
        );
        match &object.kind {
            SensedKind::Food {
                radius_cm,
                remaining_energy,
                energy_here,
            } => {
                let _ = write!(
                    out,
                    "; radius {:.1} bl, energy {remaining_energy:.1}, available here {energy_here:.1}",
                    bl(*radius_cm)
                );
            }
            SensedKind::Poison {
                radius_cm,
                remaining_energy,
                draining,
            } => {
                let _ = write!(
                    out,
                    "; radius {:.1} bl, strength {remaining_energy:.1}{}",
                    bl(*radius_cm),
                    if *draining { ", draining you now" } else { "" }
                );
            }
            SensedKind::Enemy { energy } | SensedKind::Agent { energy } => {
                let _ = write!(out, "; energy {energy:.1}");
            }
        }
    }
    out
}

/// Closest of the eight move directions to `offset`, or `None` when the
/// target is on top of the viewer.
pub fn heading(offset: Vec2) -> Option<Direction> {
    if offset.x.hypot(offset.y) <= f64::EPSILON {
        return None;
    }
    let degrees = (-offset.y).atan2(offset.x).to_degrees().rem_euclid(360.0);
    let index = (degrees / 45.0).round() as usize % Direction::ALL.len();
    Some(Direction::ALL[index])
}
