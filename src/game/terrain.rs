//! Procedural spherical terrain oracle.
//!
//! The oracle is a pure function of its seed: built once at session start,
//! immutable afterwards, and safe to share by reference. Peers holding the
//! same configuration produce identical terrain.

use bevy::prelude::*;
use noise::{NoiseFn, Perlin};

use crate::game::config::InitialConfig;
use crate::game::rocks::RockField;
use crate::game::sphere;

/// Classification of a surface point for a given unit's capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Free,
    Forbidden,
}

#[derive(Resource, Clone)]
pub struct TerrainOracle {
    perlin: Perlin,
    base_radius: f32,
    amplitude: f32,
    frequency: f64,
    octaves: u8,
    lacunarity: f64,
    gain: f32,
    water_level: f32,
}

impl TerrainOracle {
    pub fn new(config: &InitialConfig) -> Self {
        Self {
            perlin: Perlin::new(config.terrain_seed),
            base_radius: config.base_radius,
            amplitude: config.terrain_amplitude,
            frequency: config.terrain_frequency,
            octaves: config.terrain_octaves,
            lacunarity: 2.0,
            gain: 0.5,
            water_level: config.water_level,
        }
    }

    pub fn base_radius(&self) -> f32 {
        self.base_radius
    }

    pub fn water_level(&self) -> f32 {
        self.water_level
    }

    /// Terrain radius along the (not necessarily normalized) direction `dir`.
    pub fn radius_at(&self, dir: Vec3) -> f32 {
        let d = dir.normalize_or_zero();
        if d == Vec3::ZERO {
            return self.base_radius;
        }
        let mut freq = self.frequency;
        let mut amp = 1.0_f32;
        let mut sum = 0.0_f32;
        for _ in 0..self.octaves {
            let n = self.perlin.get([
                f64::from(d.x) * freq,
                f64::from(d.y) * freq,
                f64::from(d.z) * freq,
            ]) as f32;
            sum += n * amp;
            freq *= self.lacunarity;
            amp *= self.gain;
        }
        self.base_radius + sum * self.amplitude
    }

    /// Point on the terrain surface along `dir`, hovering `offset` above it.
    pub fn surface_point(&self, dir: Vec3, offset: f32) -> Vec3 {
        let d = dir.normalize_or_zero();
        d * (self.radius_at(d) + offset)
    }

    /// Outward surface normal at `point`, by central differences along the
    /// tangent basis.
    pub fn normal_at(&self, point: Vec3) -> Vec3 {
        let d = point.normalize_or_zero();
        if d == Vec3::ZERO {
            return Vec3::Y;
        }
        let (t1, t2) = sphere::tangent_basis(d);
        let h = 0.05;
        let p = |dir: Vec3| {
            let dir = dir.normalize();
            dir * self.radius_at(dir)
        };
        let du = p(d + t1 * (h / self.base_radius)) - p(d - t1 * (h / self.base_radius));
        let dv = p(d + t2 * (h / self.base_radius)) - p(d - t2 * (h / self.base_radius));
        let n = du.cross(dv);
        let n = if n.dot(d) < 0.0 { -n } else { n };
        n.normalize_or(d)
    }

    /// Water depth above the terrain along `dir`; zero on dry land.
    pub fn depth_at(&self, dir: Vec3) -> f32 {
        (self.base_radius + self.water_level - self.radius_at(dir)).max(0.0)
    }

    /// True when the terrain along `dir` sits below the water surface.
    pub fn is_submerged(&self, dir: Vec3) -> bool {
        self.radius_at(dir) < self.base_radius + self.water_level
    }

    /// Zone classification for a unit with the given swim capability.
    pub fn classify(&self, rocks: &RockField, point: Vec3, can_swim: bool) -> Zone {
        if !point.is_finite() {
            return Zone::Forbidden;
        }
        if !can_swim && self.is_submerged(point) {
            return Zone::Forbidden;
        }
        if rocks.contains(point) {
            return Zone::Forbidden;
        }
        Zone::Free
    }
}
