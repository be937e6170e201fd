//! Rock obstacle field and the collide-and-slide oracle.
//!
//! Rocks are circular obstacles anchored to the terrain surface, scattered
//! once from the session seed and immutable afterwards. Movement that would
//! end inside a rock is slid along the obstacle boundary when the motion has
//! a usable lateral component, and stopped hard otherwise.

use bevy::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::game::config::InitialConfig;
use crate::game::terrain::TerrainOracle;

#[derive(Debug, Clone, Copy)]
pub struct Rock {
    pub center: Vec3,
    pub radius: f32,
}

/// Result of resolving a proposed move against the rock field.
#[derive(Debug, Clone, Copy)]
pub struct SlideResult {
    pub position: Vec3,
    pub collided: bool,
    pub bounce_dir: Option<Vec3>,
}

#[derive(Resource, Clone, Default)]
pub struct RockField {
    rocks: Vec<Rock>,
}

/// Fraction of forward progress a slide must preserve to count as a slide
/// rather than a hard stop.
const SLIDE_PROGRESS_MIN: f32 = 0.05;

impl RockField {
    /// Scatter rocks over dry land from the world seed.
    pub fn generate(config: &InitialConfig, terrain: &TerrainOracle) -> Self {
        let mut rng = SmallRng::seed_from_u64(config.session_seed ^ 0x524F_434B);
        let mut rocks = Vec::with_capacity(config.rock_count);
        let mut attempts = 0;
        while rocks.len() < config.rock_count && attempts < config.rock_count * 20 {
            attempts += 1;
            // Uniform direction on the sphere.
            let z: f32 = rng.random_range(-1.0..1.0);
            let theta: f32 = rng.random_range(0.0..std::f32::consts::TAU);
            let r = (1.0 - z * z).max(0.0).sqrt();
            let dir = Vec3::new(r * theta.cos(), z, r * theta.sin());
            if terrain.is_submerged(dir) {
                continue;
            }
            let radius = rng.random_range(config.rock_min_radius..config.rock_max_radius);
            rocks.push(Rock {
                center: terrain.surface_point(dir, 0.0),
                radius,
            });
        }
        Self { rocks }
    }

    /// Explicit rock placement, used by scenario tests.
    pub fn from_rocks(rocks: Vec<Rock>) -> Self {
        Self { rocks }
    }

    pub fn rocks(&self) -> &[Rock] {
        &self.rocks
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.rocks
            .iter()
            .any(|rock| point.distance_squared(rock.center) < rock.radius * rock.radius)
    }

    /// Resolve the move `from -> to`.
    ///
    /// When `to` lands inside a rock, the endpoint is pushed out to the rock
    /// boundary; if that push still makes forward progress the move slides,
    /// otherwise motion stops at `from` and the bounce direction (reverse of
    /// the move) is reported.
    pub fn check_and_slide(&self, from: Vec3, to: Vec3) -> SlideResult {
        let move_vec = to - from;
        let move_len = move_vec.length();
        if move_len <= 1e-6 {
            return SlideResult {
                position: to,
                collided: false,
                bounce_dir: None,
            };
        }
        let move_dir = move_vec / move_len;

        for rock in &self.rocks {
            let out = to - rock.center;
            let out_len = out.length();
            if out_len >= rock.radius {
                continue;
            }
            if out_len <= 1e-6 {
                // Dead center: nothing to slide along.
                return SlideResult {
                    position: from,
                    collided: true,
                    bounce_dir: Some(-move_dir),
                };
            }
            let slid = rock.center + out / out_len * rock.radius;
            let progress = (slid - from).dot(move_dir);
            if progress > SLIDE_PROGRESS_MIN * move_len && !self.contains(slid) {
                return SlideResult {
                    position: slid,
                    collided: false,
                    bounce_dir: None,
                };
            }
            return SlideResult {
                position: from,
                collided: true,
                bounce_dir: Some(-move_dir),
            };
        }

        SlideResult {
            position: to,
            collided: false,
            bounce_dir: None,
        }
    }
}
