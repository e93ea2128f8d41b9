use serde::{Deserialize, Serialize};

use crate::agent::wire::Direction;
use crate::config::SimConfig;
use crate::rng::StreamRng;

use super::entities::{
    Cell, EnergyLimits, EntityId, EntityKind, IdAllocator, ResourceKind, ResourceNode, Tombstone,
    Vec2,
};

/// Rejection-sampling cap for the enemy exclusion disc.
const MAX_SPAWN_ATTEMPTS: usize = 1_000;

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PopulationCounts {
    pub amoebas: usize,
    pub enemies: usize,
    pub food: usize,
    pub poison: usize,
    pub tombstones: usize,
}

/// All entities of one simulation. Mutated only by the orchestrator between
/// decision rounds; decision tasks see an `Arc<World>` snapshot.
#[derive(Debug, Clone)]
pub struct World {
    pub width_cm: f64,
    pub height_cm: f64,
    pub amoebas: Vec<Cell>,
    pub enemies: Vec<Cell>,
    pub food: Vec<ResourceNode>,
    pub poison: Vec<ResourceNode>,
    pub tombstones: Vec<Tombstone>,
    ids: IdAllocator,
    rng: StreamRng,
    seed: u32,
}

impl World {
    /// A world with no entities. `seed` follows [`StreamRng::seed`] rules.
    pub fn empty(cfg: &SimConfig, seed: u32) -> Self {
        let (rng, seed) = StreamRng::seeded(seed);
        Self {
            width_cm: cfg.world_width_cm,
            height_cm: cfg.world_height_cm,
            amoebas: Vec::new(),
            enemies: Vec::new(),
            food: Vec::new(),
            poison: Vec::new(),
            tombstones: Vec::new(),
            ids: IdAllocator::default(),
            rng,
            seed,
        }
    }

    /// Populates a fresh world: amoebas (the first at the centre), then food,
    /// poison and enemies, all drawn from the seeded stream in that order.
    pub fn generate(cfg: &SimConfig) -> Self {
        let mut world = Self::empty(cfg, cfg.random_seed);
        let centre = world.centre();
        for i in 0..cfg.initial_agents {
            let position = if i == 0 {
                centre
            } else {
                world.random_position()
            };
            world.add_amoeba(position, cfg.starting_energy, cfg);
        }
        for _ in 0..cfg.food_quota {
            world.spawn_random_food(cfg);
        }
        for _ in 0..cfg.poison_quota {
            world.spawn_random_poison(cfg);
        }
        for _ in 0..cfg.enemy_quota {
            world.spawn_random_enemy(cfg);
        }
        world
    }

    /// Seed actually used for this world's stream.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StreamRng {
        &mut self.rng
    }

    pub(crate) fn allocate_id(&mut self, kind: EntityKind) -> EntityId {
        self.ids.allocate(kind)
    }

    pub fn centre(&self) -> Vec2 {
        Vec2::new(self.width_cm / 2.0, self.height_cm / 2.0)
    }

    pub fn clamp_to_bounds(&self, p: Vec2) -> Vec2 {
        Vec2::new(p.x.clamp(0.0, self.width_cm), p.y.clamp(0.0, self.height_cm))
    }

    /// Where a move from `from` ends, after clamping to the world edge.
    pub fn move_destination(
        &self,
        from: Vec2,
        direction: Direction,
        body_lengths: f64,
        cfg: &SimConfig,
    ) -> Vec2 {
        let step = cfg.from_body_lengths(body_lengths);
        let unit = direction.unit();
        self.clamp_to_bounds(Vec2::new(from.x + unit.x * step, from.y + unit.y * step))
    }

    fn random_position(&mut self) -> Vec2 {
        let x = self.rng.range(0.0, self.width_cm);
        let y = self.rng.range(0.0, self.height_cm);
        Vec2::new(x, y)
    }

    pub fn add_amoeba(&mut self, position: Vec2, energy: f64, cfg: &SimConfig) -> EntityId {
        let id = self.ids.allocate(EntityKind::Amoeba);
        let position = self.clamp_to_bounds(position);
        self.amoebas
            .push(Cell::new(id, position, energy, EnergyLimits::amoeba(cfg)));
        id
    }

    pub fn add_enemy(&mut self, position: Vec2, energy: f64, cfg: &SimConfig) -> EntityId {
        let id = self.ids.allocate(EntityKind::Enemy);
        let position = self.clamp_to_bounds(position);
        self.enemies
            .push(Cell::new(id, position, energy, EnergyLimits::enemy(cfg)));
        id
    }

    pub fn add_food(&mut self, position: Vec2, radius_cm: f64, energy: f64) -> EntityId {
        let id = self.ids.allocate(EntityKind::Food);
        let position = self.clamp_to_bounds(position);
        self.food.push(ResourceNode::new(
            id,
            ResourceKind::Food,
            position,
            radius_cm,
            energy,
        ));
        id
    }

    pub fn add_poison(&mut self, position: Vec2, radius_cm: f64, energy: f64) -> EntityId {
        let id = self.ids.allocate(EntityKind::Poison);
        let position = self.clamp_to_bounds(position);
        self.poison.push(ResourceNode::new(
            id,
            ResourceKind::Poison,
            position,
            radius_cm,
            energy,
        ));
        id
    }

    pub fn add_tombstone(&mut self, position: Vec2) -> EntityId {
        let id = self.ids.allocate(EntityKind::Tombstone);
        self.tombstones.push(Tombstone { id, position });
        id
    }

    pub fn spawn_random_food(&mut self, cfg: &SimConfig) -> EntityId {
        let position = self.random_position();
        let radius = self.rng.range(cfg.food_min_radius_cm, cfg.food_max_radius_cm);
        let energy = (cfg.food_min_energy
            + (self.rng.next_f64() * (cfg.food_max_energy - cfg.food_min_energy)).floor())
        .max(cfg.food_min_energy);
        self.add_food(position, radius, energy)
    }

    pub fn spawn_random_poison(&mut self, cfg: &SimConfig) -> EntityId {
        let position = self.random_position();
        let radius = self
            .rng
            .range(cfg.poison_min_radius_cm, cfg.poison_max_radius_cm);
        let energy = (cfg.poison_min_energy
            + (self.rng.next_f64() * (cfg.poison_max_energy - cfg.poison_min_energy)).floor())
        .max(cfg.poison_min_energy);
        self.add_poison(position, radius, energy)
    }

    /// Enemies never appear within `min_enemy_spawn_distance_cm` of the centre.
    pub fn spawn_random_enemy(&mut self, cfg: &SimConfig) -> EntityId {
        let centre = self.centre();
        let mut position = None;
        for _ in 0..MAX_SPAWN_ATTEMPTS {
            let candidate = self.random_position();
            if candidate.distance(&centre) >= cfg.min_enemy_spawn_distance_cm {
                position = Some(candidate);
                break;
            }
        }
        // Corners are the farthest points from the centre.
        let position = position.unwrap_or_else(|| {
            let corner = Vec2::new(0.0, 0.0);
            tracing::warn!(
                attempts = MAX_SPAWN_ATTEMPTS,
                distance_cm = corner.distance(&centre),
                min_distance_cm = cfg.min_enemy_spawn_distance_cm,
                "world.enemy_spawn_fallback"
            );
            corner
        });
        self.add_enemy(position, cfg.starting_energy, cfg)
    }

    /// Places an offspring three radii away from `parent` at a random angle.
    pub(crate) fn offspring_position(&mut self, parent: Vec2, cfg: &SimConfig) -> Vec2 {
        let angle = self.rng.angle();
        let offset = cfg.body_radius_cm() * 3.0;
        self.clamp_to_bounds(Vec2::new(
            parent.x + angle.cos() * offset,
            parent.y + angle.sin() * offset,
        ))
    }

    pub fn amoeba(&self, id: EntityId) -> Option<&Cell> {
        self.amoebas.iter().find(|a| a.id == id)
    }

    pub fn amoeba_mut(&mut self, id: EntityId) -> Option<&mut Cell> {
        self.amoebas.iter_mut().find(|a| a.id == id)
    }

    pub fn enemy(&self, id: EntityId) -> Option<&Cell> {
        self.enemies.iter().find(|e| e.id == id)
    }

    pub fn cell_mut(&mut self, id: EntityId) -> Option<&mut Cell> {
        match id.kind {
            EntityKind::Amoeba => self.amoebas.iter_mut().find(|a| a.id == id),
            EntityKind::Enemy => self.enemies.iter_mut().find(|e| e.id == id),
            _ => None,
        }
    }

    pub fn living_amoebas(&self) -> impl Iterator<Item = &Cell> {
        self.amoebas.iter().filter(|a| a.alive())
    }

    pub fn is_extinct(&self) -> bool {
        self.living_amoebas().next().is_none()
    }

    pub fn counts(&self, cfg: &SimConfig) -> PopulationCounts {
        PopulationCounts {
            amoebas: self.living_amoebas().count(),
            enemies: self.enemies.iter().filter(|e| e.alive()).count(),
            food: self
                .food
                .iter()
                .filter(|f| !f.is_depleted(cfg.depletion_threshold))
                .count(),
            poison: self
                .poison
                .iter()
                .filter(|p| !p.is_depleted(cfg.depletion_threshold))
                .count(),
            tombstones: self.tombstones.len(),
        }
    }

    /// First tombstone strictly closer than `clearance_cm`. A position exactly
    /// at the clearance is far enough.
    pub fn tombstone_near(&self, position: Vec2, clearance_cm: f64) -> Option<&Tombstone> {
        self.tombstones
            .iter()
            .find(|t| t.position.distance(&position) < clearance_cm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg(seed: u32) -> SimConfig {
        SimConfig {
            random_seed: seed,
            food_quota: 20,
            poison_quota: 5,
            enemy_quota: 8,
            ..SimConfig::default()
        }
    }

    #[test]
    fn generation_is_reproducible_for_a_seed() {
        let cfg = small_cfg(2024);
        let a = World::generate(&cfg);
        let b = World::generate(&cfg);
        assert_eq!(a.seed(), 2024);
        assert_eq!(a.food, b.food);
        assert_eq!(a.poison, b.poison);
        assert_eq!(a.enemies, b.enemies);
    }

    #[test]
    fn generation_fills_quotas_and_centres_the_first_amoeba() {
        let cfg = small_cfg(7);
        let world = World::generate(&cfg);
        let counts = world.counts(&cfg);
        assert_eq!(counts.amoebas, 1);
        assert_eq!(counts.food, 20);
        assert_eq!(counts.poison, 5);
        assert_eq!(counts.enemies, 8);
        assert_eq!(world.amoebas[0].position, world.centre());
        assert_eq!(world.amoebas[0].energy(), cfg.starting_energy);
    }

    #[test]
    fn enemies_respect_the_centre_exclusion_disc() {
        let cfg = SimConfig {
            enemy_quota: 200,
            ..small_cfg(11)
        };
        let world = World::generate(&cfg);
        let centre = world.centre();
        for enemy in &world.enemies {
            assert!(enemy.position.distance(&centre) >= cfg.min_enemy_spawn_distance_cm);
        }
    }

    #[test]
    fn crowded_exclusion_disc_falls_back_to_a_corner() {
        let mut cfg = small_cfg(8);
        cfg.min_enemy_spawn_distance_cm = 0.5 * cfg.world_width_cm.hypot(cfg.world_height_cm);
        cfg.validate().unwrap();
        let mut world = World::empty(&cfg, 8);

        let id = world.spawn_random_enemy(&cfg);

        let enemy = world.enemy(id).unwrap();
        assert_eq!(enemy.position, Vec2::new(0.0, 0.0));
        let gap = enemy.position.distance(&world.centre()) - cfg.min_enemy_spawn_distance_cm;
        assert!(gap.abs() < 1e-12, "{gap}");
    }

    #[test]
    fn tombstone_clearance_boundary_is_allowed() {
        let cfg = small_cfg(1);
        let mut world = World::empty(&cfg, 1);
        world.add_tombstone(Vec2::new(0.75, 0.5));

        assert!(world.tombstone_near(Vec2::new(0.5, 0.5), 0.25).is_none());
        assert!(world.tombstone_near(Vec2::new(0.625, 0.5), 0.25).is_some());
    }

    #[test]
    fn random_resources_stay_within_configured_ranges() {
        let cfg = small_cfg(3);
        let world = World::generate(&cfg);
        for f in &world.food {
            assert!(f.radius_cm >= cfg.food_min_radius_cm && f.radius_cm <= cfg.food_max_radius_cm);
            assert!(f.max_energy() >= cfg.food_min_energy && f.max_energy() <= cfg.food_max_energy);
            assert!(f.position.x >= 0.0 && f.position.x <= cfg.world_width_cm);
        }
    }

    #[test]
    fn separate_worlds_allocate_ids_independently() {
        let cfg = SimConfig::default();
        let mut a = World::empty(&cfg, 1);
        let mut b = World::empty(&cfg, 1);
        let first = a.add_amoeba(Vec2::new(1.0, 1.0), 50.0, &cfg);
        a.add_amoeba(Vec2::new(1.0, 1.0), 50.0, &cfg);
        let other = b.add_amoeba(Vec2::new(1.0, 1.0), 50.0, &cfg);
        assert_eq!(first, other);
        assert_eq!(a.amoebas[1].id.seq, 1);
    }

    #[test]
    fn move_destination_is_clamped_to_the_world() {
        let cfg = SimConfig::default();
        let world = World::empty(&cfg, 1);
        let to = world.move_destination(Vec2::new(0.01, 2.0), Direction::Left, 5.0, &cfg);
        assert_eq!(to, Vec2::new(0.0, 2.0));

        let to = world.move_destination(Vec2::new(2.0, 2.0), Direction::Up, 4.0, &cfg);
        assert!((to.y - 1.9).abs() < 1e-12);
        assert!((to.x - 2.0).abs() < 1e-12);
    }
}
