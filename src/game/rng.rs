//! Seeded random number streams for the deterministic simulation.
//!
//! The session seed is fixed at match start and shared by all peers. Every
//! unit draws from its own substream keyed by its id, so spawning or ticking
//! units in a different interleaving cannot shift anyone else's sequence.
//! Decorative randomness draws from a separate visual stream that must never
//! feed back into simulation state.

use bevy::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Shared seed for the deterministic session.
#[derive(Resource, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSeed(pub u64);

impl Default for SessionSeed {
    fn default() -> Self {
        Self(0x6D65_7269_6469_616E)
    }
}

/// Non-authoritative stream for decorative jitter (dust, marker wobble).
/// Simulation code must never read from this.
#[derive(Resource)]
pub struct VisualRng(pub SmallRng);

const VISUAL_STREAM_TAG: u64 = 0x5649_5355_414C;

/// Finalizer from splitmix64; decorrelates nearby ids into distant seeds.
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Simulation substream for one unit.
pub fn unit_stream(seed: SessionSeed, unit_id: u32) -> SmallRng {
    SmallRng::seed_from_u64(seed.0 ^ mix(u64::from(unit_id).wrapping_add(1)))
}

/// The decorative stream for the whole session.
pub fn visual_stream(seed: SessionSeed) -> SmallRng {
    SmallRng::seed_from_u64(seed.0 ^ mix(VISUAL_STREAM_TAG))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn substreams_are_reproducible() {
        let seed = SessionSeed(42);
        let mut ra = unit_stream(seed, 7);
        let mut rb = unit_stream(seed, 7);
        let a: Vec<u32> = (0..8).map(|_| ra.random()).collect();
        let b: Vec<u32> = (0..8).map(|_| rb.random()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn substreams_differ_per_unit() {
        let seed = SessionSeed(42);
        let a: u64 = unit_stream(seed, 0).random();
        let b: u64 = unit_stream(seed, 1).random();
        assert_ne!(a, b);
    }

    #[test]
    fn visual_stream_is_distinct_from_unit_streams() {
        let seed = SessionSeed(42);
        let v: u64 = visual_stream(seed).random();
        for id in 0..64 {
            let u: u64 = unit_stream(seed, id).random();
            assert_ne!(v, u);
        }
    }
}
