/// Resource definitions for the simulation.

use bevy::prelude::*;
use rustc_hash::FxHashMap;

use crate::game::config::InitialConfig;

// ============================================================================
// Simulation Tick Counter
// ============================================================================

/// Global deterministic tick counter.
///
/// Incremented once per fixed update cycle, before any other sim system.
/// Purely integer-based and therefore identical across peers, unlike the
/// float-accumulating fixed-time clock.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// Unit bookkeeping
// ============================================================================

/// Monotonic unit id allocator. Ids are never reused within a session.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct UnitIdCounter(u32);

impl UnitIdCounter {
    pub fn next(&mut self) -> u32 {
        let id = self.0;
        self.0 += 1;
        id
    }
}

/// Lookup from unit id to its entity. Maintained on spawn/despawn so systems
/// can resolve command targets without scanning.
#[derive(Resource, Default, Debug)]
pub struct UnitIndex(FxHashMap<u32, Entity>);

impl UnitIndex {
    pub fn insert(&mut self, id: u32, entity: Entity) {
        self.0.insert(id, entity);
    }

    pub fn remove(&mut self, id: u32) {
        self.0.remove(&id);
    }

    pub fn get(&self, id: u32) -> Option<Entity> {
        self.0.get(&id).copied()
    }
}

// ============================================================================
// Presentation-facing input state
// ============================================================================

/// Locally selected unit (presentation only; no sim-state effect).
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct SelectedUnit(pub Option<u32>);

/// Unit currently under the pointer; a hovered unit eases its throttle to 0.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct HoveredUnit(pub Option<u32>);

/// Continuous directional input, per operator slot. Routed to the unit the
/// slot is seated on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveInput {
    /// Turn about the sphere normal, in [-1, 1].
    pub turn: f32,
    /// Forward drive, in [-1, 1].
    pub forward: f32,
}

impl DriveInput {
    pub fn is_active(&self) -> bool {
        self.turn.abs() > 0.01 || self.forward.abs() > 0.01
    }
}

#[derive(Resource, Default, Debug)]
pub struct DriveInputs(pub FxHashMap<u8, DriveInput>);

// ============================================================================
// Simulation Configuration
// ============================================================================

/// Runtime simulation parameters.
///
/// Copied once from [`InitialConfig`] at session start; mutating these while
/// a multiplayer session runs desyncs peers. Presentation knobs live in the
/// RON config instead.
#[derive(Resource, Debug, Clone)]
pub struct SimConfig {
    pub tick_rate: f64,

    // Kinematics
    pub unit_speed: f32,
    pub ground_offset: f32,
    pub turn_rate: f32,
    pub accel_rate: f32,
    pub decel_rate: f32,
    pub min_speed: f32,

    // Slope response
    pub slope_clamp: f32,
    pub lateral_drift: f32,

    // Rock bounce
    pub bounce_threshold: f32,
    pub bounce_decay: f32,
    pub bounce_max_secs: f32,
    pub bounce_cooldown: f32,
    pub bounce_restitution: f32,

    // Watchdogs
    pub stuck_check_interval: f32,
    pub stuck_min_displacement: f32,
    pub stuck_after_secs: f32,
    pub blocked_clear_secs: f32,

    // Steering
    pub lookahead_points: usize,
    pub lookahead_falloff: f32,
    pub heading_smoothing_base: f32,
    pub curve_lookahead_secs: f32,
    pub curve_enter_exp: f32,
    pub curve_exit_exp: f32,

    // Water
    pub water_depth_threshold: f32,
    pub water_slowdown_rate: f32,
    pub water_slowdown_floor: f32,
    pub shore_probe_offset: f32,
    pub shore_probe_count: usize,
    pub shore_exit_speed: f32,
    pub shore_exit_timeout: f32,
    pub recover_start_speed: f32,
    pub recover_duration: f32,

    // Keyboard override
    pub override_release_secs: f32,

    // Path scanning
    pub scan_interval_min: f32,
    pub scan_interval_max: f32,
    pub scan_window: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20.0,
            unit_speed: 5.0,
            ground_offset: 0.5,
            turn_rate: 2.2,
            accel_rate: 1.8,
            decel_rate: 2.5,
            min_speed: 0.05,
            slope_clamp: 0.3,
            lateral_drift: 0.3,
            bounce_threshold: 0.05,
            bounce_decay: 5.0,
            bounce_max_secs: 2.0,
            bounce_cooldown: 0.5,
            bounce_restitution: 0.2,
            stuck_check_interval: 0.2,
            stuck_min_displacement: 0.1,
            stuck_after_secs: 1.5,
            blocked_clear_secs: 3.0,
            lookahead_points: 8,
            lookahead_falloff: 0.5,
            heading_smoothing_base: 0.002,
            curve_lookahead_secs: 1.0,
            curve_enter_exp: 1.5,
            curve_exit_exp: 0.5,
            water_depth_threshold: 0.05,
            water_slowdown_rate: 2.5,
            water_slowdown_floor: 0.05,
            shore_probe_offset: 0.5,
            shore_probe_count: 8,
            shore_exit_speed: 3.0,
            shore_exit_timeout: 3.0,
            recover_start_speed: 0.5,
            recover_duration: 0.5,
            override_release_secs: 0.5,
            scan_interval_min: 2.0,
            scan_interval_max: 4.0,
            scan_window: 60,
        }
    }
}

impl SimConfig {
    pub fn from_initial(config: &InitialConfig) -> Self {
        Self {
            tick_rate: config.tick_rate,
            unit_speed: config.unit_speed,
            ground_offset: config.ground_offset,
            turn_rate: config.turn_rate,
            ..Default::default()
        }
    }

    pub fn dt(&self) -> f32 {
        (1.0 / self.tick_rate) as f32
    }
}
