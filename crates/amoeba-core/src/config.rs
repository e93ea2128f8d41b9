//! Simulation and decision-service settings.
//!
//! Spatial values are centimetres unless the field name says body-lengths.
//! The orchestrator takes a snapshot of [`Settings`] at the start of each tick;
//! nothing in the core reads or writes persistent storage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the brain of a single-celled amoeba living on a microscopic 2D surface. \
Each cycle you receive your position, your energy and a list of nearby objects. \
Distances are given in body-lengths (one body-length is your own diameter). \
The x axis grows to the right and the y axis grows downward.

Choose exactly one action and reply with ONLY a JSON object:
{\"action\": \"move\", \"direction\": \"up-right\", \"distance\": 1.5}
{\"action\": \"feed\", \"direction\": null, \"distance\": null}
{\"action\": \"divide\", \"direction\": null, \"distance\": null}
{\"action\": \"idle\", \"direction\": null, \"distance\": null}

Actions:
- move: travel 0.5 to 5 body-lengths in one of: right, up-right, up, up-left, left, down-left, down, down-right. Costs 0.1 energy per body-length.
- feed: absorb 1 energy from a food source. Only works when you sit on or inside the halo of food.
- divide: split into two amoebas, each with half your energy. Requires 90 energy or more.
- idle: do nothing.

Survival:
- Food (green) decays 0.1 energy per cycle and disappears when exhausted.
- Poison (purple) drains 1 energy per cycle while you are inside its halo, and slowly spoils nearby food.
- Enemies (red) drain 2 energy per cycle when they touch you.
- Tombstones mark where amoebas died; you may not end a move within 2 body-lengths of one.
- At 0 energy you die.";

/// How a resource node's reach is measured when applying an effect.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RangePolicy {
    /// Radius and halo stay at their spawn size until the node is removed.
    Nominal,
    /// Radius and halo shrink linearly with the remaining-energy ratio.
    #[default]
    EnergyScaled,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("{low_field} ({low}) must not exceed {high_field} ({high})")]
    InvertedRange {
        low_field: &'static str,
        low: f64,
        high_field: &'static str,
        high: f64,
    },
    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub world_width_cm: f64,
    pub world_height_cm: f64,
    /// One body-length: the diameter of an amoeba.
    pub body_length_cm: f64,

    pub agent_vision_cm: f64,
    pub enemy_vision_cm: f64,

    pub min_move_body_lengths: f64,
    pub max_move_body_lengths: f64,
    pub move_cost_per_body_length: f64,
    pub enemy_wander_min_body_lengths: f64,
    pub enemy_wander_max_body_lengths: f64,

    pub starting_energy: f64,
    pub max_energy: f64,
    pub death_threshold: f64,
    pub enemy_death_threshold: f64,
    pub division_threshold: f64,
    pub feeding_gain: f64,
    pub poison_drain_per_cycle: f64,
    pub enemy_drain_per_cycle: f64,
    /// Enemy drain reach, in amoeba radii.
    pub enemy_drain_radius_multiplier: f64,

    pub food_min_radius_cm: f64,
    pub food_max_radius_cm: f64,
    pub food_min_energy: f64,
    pub food_max_energy: f64,
    pub poison_min_radius_cm: f64,
    pub poison_max_radius_cm: f64,
    pub poison_min_energy: f64,
    pub poison_max_energy: f64,
    /// Halo reach as a multiple of the node radius.
    pub halo_multiplier: f64,
    pub decay_per_cycle: f64,
    pub depletion_threshold: f64,
    pub poison_food_drain_per_cycle: f64,
    pub feeding_range: RangePolicy,
    pub poison_drain_range: RangePolicy,

    pub initial_agents: usize,
    pub food_quota: usize,
    pub poison_quota: usize,
    pub enemy_quota: usize,
    pub min_enemy_spawn_distance_cm: f64,
    pub tombstone_clearance_body_lengths: f64,

    pub cycle_interval_ms: u64,
    pub motion_duration_ms: u64,
    pub retry_budget: u32,
    /// Accepted (request, response) pairs each amoeba remembers.
    pub history_pairs: usize,
    pub log_capacity: usize,
    /// 0 picks a random seed at world generation.
    pub random_seed: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_width_cm: 5.0,
            world_height_cm: 5.0,
            body_length_cm: 0.025,

            agent_vision_cm: 0.3,
            enemy_vision_cm: 0.05,

            min_move_body_lengths: 0.5,
            max_move_body_lengths: 5.0,
            move_cost_per_body_length: 0.1,
            enemy_wander_min_body_lengths: 1.0,
            enemy_wander_max_body_lengths: 3.0,

            starting_energy: 50.0,
            max_energy: 100.0,
            death_threshold: 0.1,
            enemy_death_threshold: 0.0,
            division_threshold: 90.0,
            feeding_gain: 1.0,
            poison_drain_per_cycle: 1.0,
            enemy_drain_per_cycle: 2.0,
            enemy_drain_radius_multiplier: 2.0,

            food_min_radius_cm: 0.005,
            food_max_radius_cm: 0.1,
            food_min_energy: 2.0,
            food_max_energy: 200.0,
            poison_min_radius_cm: 0.005,
            poison_max_radius_cm: 0.1,
            poison_min_energy: 2.0,
            poison_max_energy: 200.0,
            halo_multiplier: 2.0,
            decay_per_cycle: 0.1,
            depletion_threshold: 0.1,
            poison_food_drain_per_cycle: 0.5,
            feeding_range: RangePolicy::EnergyScaled,
            poison_drain_range: RangePolicy::EnergyScaled,

            initial_agents: 1,
            food_quota: 50,
            poison_quota: 15,
            enemy_quota: 10,
            min_enemy_spawn_distance_cm: 0.5,
            tombstone_clearance_body_lengths: 2.0,

            cycle_interval_ms: 2_000,
            motion_duration_ms: 600,
            retry_budget: 3,
            history_pairs: 5,
            log_capacity: 200,
            random_seed: 0,
        }
    }
}

impl SimConfig {
    pub fn body_radius_cm(&self) -> f64 {
        self.body_length_cm / 2.0
    }

    pub fn to_body_lengths(&self, cm: f64) -> f64 {
        cm / self.body_length_cm
    }

    pub fn from_body_lengths(&self, body_lengths: f64) -> f64 {
        body_lengths * self.body_length_cm
    }

    pub fn tombstone_clearance_cm(&self) -> f64 {
        self.from_body_lengths(self.tombstone_clearance_body_lengths)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("world_width_cm", self.world_width_cm)?;
        positive("world_height_cm", self.world_height_cm)?;
        positive("body_length_cm", self.body_length_cm)?;
        positive("agent_vision_cm", self.agent_vision_cm)?;
        positive("enemy_vision_cm", self.enemy_vision_cm)?;
        positive("max_energy", self.max_energy)?;
        positive("halo_multiplier", self.halo_multiplier)?;
        positive("min_move_body_lengths", self.min_move_body_lengths)?;
        non_negative("move_cost_per_body_length", self.move_cost_per_body_length)?;
        non_negative("death_threshold", self.death_threshold)?;
        non_negative("enemy_death_threshold", self.enemy_death_threshold)?;
        non_negative("decay_per_cycle", self.decay_per_cycle)?;
        non_negative("depletion_threshold", self.depletion_threshold)?;
        non_negative("poison_food_drain_per_cycle", self.poison_food_drain_per_cycle)?;
        non_negative("tombstone_clearance_body_lengths", self.tombstone_clearance_body_lengths)?;
        non_negative("min_enemy_spawn_distance_cm", self.min_enemy_spawn_distance_cm)?;
        ordered(
            ("min_move_body_lengths", self.min_move_body_lengths),
            ("max_move_body_lengths", self.max_move_body_lengths),
        )?;
        ordered(
            ("enemy_wander_min_body_lengths", self.enemy_wander_min_body_lengths),
            ("enemy_wander_max_body_lengths", self.enemy_wander_max_body_lengths),
        )?;
        ordered(
            ("food_min_radius_cm", self.food_min_radius_cm),
            ("food_max_radius_cm", self.food_max_radius_cm),
        )?;
        ordered(
            ("food_min_energy", self.food_min_energy),
            ("food_max_energy", self.food_max_energy),
        )?;
        ordered(
            ("poison_min_radius_cm", self.poison_min_radius_cm),
            ("poison_max_radius_cm", self.poison_max_radius_cm),
        )?;
        ordered(
            ("poison_min_energy", self.poison_min_energy),
            ("poison_max_energy", self.poison_max_energy),
        )?;
        ordered(
            ("starting_energy", self.starting_energy),
            ("max_energy", self.max_energy),
        )?;
        ordered(
            ("death_threshold", self.death_threshold),
            ("starting_energy", self.starting_energy),
        )?;
        // The exclusion disc must leave room for enemies to spawn.
        let half_diagonal = 0.5 * self.world_width_cm.hypot(self.world_height_cm);
        ordered(
            ("min_enemy_spawn_distance_cm", self.min_enemy_spawn_distance_cm),
            ("world half-diagonal", half_diagonal),
        )?;
        if self.cycle_interval_ms == 0 {
            return Err(ConfigError::ZeroCount("cycle_interval_ms"));
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::ZeroCount("log_capacity"));
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn ordered(low: (&'static str, f64), high: (&'static str, f64)) -> Result<(), ConfigError> {
    if low.1 <= high.1 {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange {
            low_field: low.0,
            low: low.1,
            high_field: high.0,
            high: high.1,
        })
    }
}

/// Connection and prompting parameters for the decision service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URL; `/chat/completions` is appended.
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
    /// Per-request timeout for the HTTP client.
    pub request_timeout_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 150,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Everything the orchestrator needs for one tick.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub sim: SimConfig,
    pub llm: LlmSettings,
}
