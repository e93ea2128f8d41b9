//! Seeded float stream used for world generation and respawn.
//!
//! Mulberry32 over plain `u32` wrapping arithmetic, so a seed yields the same
//! sequence on every platform. The stream is owned by a [`crate::world::World`];
//! there is no process-wide generator.

use std::f64::consts::TAU;

/// Seed value meaning "pick one for me".
pub const UNSET_SEED: u32 = 0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRng {
    state: u32,
}

impl StreamRng {
    /// Builds a stream and seeds it, returning the seed actually used alongside.
    pub fn seeded(seed: u32) -> (Self, u32) {
        let mut rng = Self::default();
        let actual = rng.seed(seed);
        (rng, actual)
    }

    /// Resets the stream. A seed of [`UNSET_SEED`] draws a random non-zero seed,
    /// which is returned so callers can display or reuse it.
    pub fn seed(&mut self, value: u32) -> u32 {
        let actual = if value != UNSET_SEED {
            value
        } else {
            loop {
                let candidate: u32 = rand::random();
                if candidate != UNSET_SEED {
                    break candidate;
                }
            }
        };
        self.state = actual;
        actual
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(1);
        mulberry32(self.state)
    }

    /// Uniform value in `[lo, hi)`.
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next_f64() * (hi - lo)
    }

    /// Uniform angle in radians, `[0, 2π)`.
    pub fn angle(&mut self) -> f64 {
        self.next_f64() * TAU
    }
}

fn mulberry32(s: u32) -> f64 {
    let s = s.wrapping_add(0x6d2b_79f5);
    let mut t = (s ^ (s >> 15)).wrapping_mul(1 | s);
    t = t.wrapping_add((t ^ (t >> 7)).wrapping_mul(61 | t)) ^ t;
    f64::from(t ^ (t >> 14)) / 4_294_967_296.0
}
