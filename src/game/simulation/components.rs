/// Component definitions for the simulation layer.
///
/// Per-unit authoritative state is split across focused components: pose,
/// motion, navigation, and the sub-state machines (water, bounce, transition
/// arc, drive override). Presentation reads only the prev/curr pose pair.

use bevy::prelude::*;
use rand::rngs::SmallRng;
use rustc_hash::FxHashMap;

// ============================================================================
// Identity & Pose
// ============================================================================

/// Stable unit identifier. Assigned from a monotonic per-session counter and
/// never reused; all deterministic iteration sorts by it.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u32);

/// Authoritative position. Terrain-locked after every sim step.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SimPosition(pub Vec3);

/// Previous-tick position for render interpolation.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SimPositionPrev(pub Vec3);

/// Authoritative orientation. Local +Y is pinned to the sphere normal.
#[derive(Component, Debug, Clone, Copy)]
pub struct SimHeading(pub Quat);

impl Default for SimHeading {
    fn default() -> Self {
        Self(Quat::IDENTITY)
    }
}

/// Previous-tick orientation for render interpolation.
#[derive(Component, Debug, Clone, Copy)]
pub struct SimHeadingPrev(pub Quat);

impl Default for SimHeadingPrev {
    fn default() -> Self {
        Self(Quat::IDENTITY)
    }
}

// ============================================================================
// Motion
// ============================================================================

#[derive(Component, Debug, Clone, Copy)]
pub struct Motion {
    /// Unit tangent indicating actual motion.
    pub velocity_dir: Vec3,
    /// Smoothed throttle in [0, 1].
    pub speed_factor: f32,
    /// Smoothed angular velocity about the sphere normal (manual drive).
    pub turn_speed: f32,
    /// Distance covered during the last tick.
    pub last_step: f32,
    /// Curvature-braking memory: last forward-tangent agreement.
    pub curve_dot: f32,
}

impl Default for Motion {
    fn default() -> Self {
        Self {
            velocity_dir: Vec3::Z,
            speed_factor: 0.0,
            turn_speed: 0.0,
            last_step: 0.0,
            curve_dot: 1.0,
        }
    }
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Capabilities {
    pub can_swim: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { can_swim: false }
    }
}

// ============================================================================
// Navigation
// ============================================================================

#[derive(Debug, Clone)]
pub struct Waypoint {
    /// Stable id assigned at creation; survives reorders and path rebuilds.
    pub id: String,
    pub position: Vec3,
}

#[derive(Component, Debug, Clone, Default)]
pub struct Navigator {
    pub waypoints: Vec<Waypoint>,
    /// Sampled, terrain-projected polyline derived from the waypoints.
    pub path: Vec<Vec3>,
    pub path_index: usize,
    /// For each waypoint, the path index where arrival is registered.
    pub segment_indices: Vec<usize>,
    pub is_closed: bool,
    pub looping: bool,
    pub is_following: bool,
    pub paused_by_command: bool,
    /// Event-sourced: updated only by crossing detection, never by rebuilds.
    pub last_waypoint_id: Option<String>,
    pub target_waypoint_id: Option<String>,
    pub arrival_counts: FxHashMap<String, u32>,
    pub wait_timer: f32,
    /// Countdown until the next forbidden-zone scan of the path ahead.
    pub scan_timer: f32,
    waypoint_counter: u32,
}

impl Navigator {
    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn wraps(&self) -> bool {
        self.is_closed || self.looping
    }

    /// Mint a stable waypoint id for this unit.
    pub fn next_waypoint_id(&mut self, unit: UnitId) -> String {
        let id = format!("u{}-w{}", unit.0, self.waypoint_counter);
        self.waypoint_counter += 1;
        id
    }
}

// ============================================================================
// Sub-state machines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaterState {
    #[default]
    Normal,
    Slowing,
    ShoreExit,
    Recovering,
}

#[derive(Component, Debug, Clone, Copy)]
pub struct WaterMachine {
    pub state: WaterState,
    /// Input damping while slowing; decays from 1 toward the exit floor.
    pub slowdown: f32,
    /// Chosen uphill escape direction during shore exit.
    pub exit_dir: Vec3,
    pub timer: f32,
    /// Scripted deceleration speed while recovering.
    pub recover_speed: f32,
}

impl Default for WaterMachine {
    fn default() -> Self {
        Self {
            state: WaterState::Normal,
            slowdown: 1.0,
            exit_dir: Vec3::ZERO,
            timer: 0.0,
            recover_speed: 0.0,
        }
    }
}

impl WaterMachine {
    /// Input damping applied to movement this tick.
    pub fn damping(&self) -> f32 {
        match self.state {
            WaterState::Slowing => self.slowdown.max(0.0),
            _ => 1.0,
        }
    }

    /// Directional input is ignored while the automaton drives the unit.
    pub fn locks_input(&self) -> bool {
        matches!(self.state, WaterState::ShoreExit | WaterState::Recovering)
    }
}

/// Rock-bounce state. While the bounce velocity is above the stop threshold
/// the unit is carried by the bounce and input is ignored.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Bounce {
    pub velocity: f32,
    pub direction: Option<Vec3>,
    pub cooldown: f32,
    pub lock_timer: f32,
}

/// A short arc bridging the unit onto a rebuilt path.
#[derive(Debug, Clone)]
pub struct TransitionArc {
    pub points: Vec<Vec3>,
    pub index: usize,
    /// Main-path index to resume at once the arc completes.
    pub resume_index: usize,
}

#[derive(Component, Debug, Clone, Default)]
pub struct Transition {
    pub arc: Option<TransitionArc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverridePhase {
    #[default]
    Inactive,
    Active,
    Cooldown,
}

/// Keyboard-override state. Directional input suspends path following; the
/// saved path is preserved and resumes only on an explicit play command.
#[derive(Component, Debug, Clone, Default)]
pub struct DriveOverride {
    pub phase: OverridePhase,
    pub timer: f32,
    pub saved_path: Vec<Vec3>,
    pub saved_index: usize,
}

/// Progress watchdog: advisory stuck flag plus the blocked-state timer that
/// feeds the anti-block safety clear.
#[derive(Component, Debug, Clone, Copy)]
pub struct StuckDetector {
    pub check_timer: f32,
    pub last_pos: Vec3,
    pub stuck_secs: f32,
    pub is_stuck: bool,
    pub blocked_secs: f32,
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self {
            check_timer: 0.0,
            last_pos: Vec3::ZERO,
            stuck_secs: 0.0,
            is_stuck: false,
            blocked_secs: 0.0,
        }
    }
}

/// Per-unit simulation RNG substream (keyed by unit id at spawn).
#[derive(Component)]
pub struct UnitRng(pub SmallRng);
