/// Movement integration: slope response, rock-bounce carry, manual drive,
/// and the guarded commit of proposed moves against the rock oracle.

use bevy::prelude::*;

use crate::game::rocks::RockField;
use crate::game::sphere;
use crate::game::terrain::TerrainOracle;

use super::components::*;
use super::resources::{DriveInput, SimConfig};

/// Longitudinal slope factor: uphill slows, downhill speeds up, clamped so
/// neither dominates. Measured as rise-over-run of the terrain radius along
/// the travel direction.
pub(crate) fn slope_speed_scale(
    terrain: &TerrainOracle,
    pos: Vec3,
    travel_dir: Vec3,
    cfg: &SimConfig,
) -> f32 {
    if travel_dir.length_squared() < 1e-8 {
        return 1.0;
    }
    let probe = 0.5;
    let ahead = (pos + travel_dir * probe).normalize_or_zero();
    let behind = (pos - travel_dir * probe).normalize_or_zero();
    if ahead == Vec3::ZERO || behind == Vec3::ZERO {
        return 1.0;
    }
    let rise = terrain.radius_at(ahead) - terrain.radius_at(behind);
    let slope = (rise / (2.0 * probe)).clamp(-cfg.slope_clamp, cfg.slope_clamp);
    if !slope.is_finite() {
        return 1.0;
    }
    1.0 - slope
}

/// Cross-slope drift: on tilted ground the unit slips toward the local
/// downhill, strongest when the slope runs across the travel direction.
/// Returns the positional delta for this tick.
pub(crate) fn lateral_drift(
    terrain: &TerrainOracle,
    pos: Vec3,
    travel_dir: Vec3,
    move_speed: f32,
    cfg: &SimConfig,
    dt: f32,
) -> Vec3 {
    let sphere_n = pos.normalize_or_zero();
    if sphere_n == Vec3::ZERO {
        return Vec3::ZERO;
    }
    let terrain_n = terrain.normal_at(pos);
    if !terrain_n.is_finite() {
        return Vec3::ZERO;
    }
    let steepness = terrain_n.cross(sphere_n).length();
    if steepness < 1e-4 {
        return Vec3::ZERO;
    }
    // Sphere-up projected into the terrain plane points uphill; slip the
    // opposite way.
    let uphill = sphere_n - terrain_n * terrain_n.dot(sphere_n);
    let downhill = (-uphill).normalize_or_zero();
    if downhill == Vec3::ZERO {
        return Vec3::ZERO;
    }
    let cross_slope = 1.0 - downhill.dot(travel_dir).abs();
    let drift = steepness * cross_slope * cfg.lateral_drift * dt * move_speed;
    downhill * drift
}

/// Carry a bouncing unit along its rebound direction, decaying the bounce
/// velocity. Returns true while the bounce still locks input.
pub(crate) fn apply_bounce(
    pos: &mut Vec3,
    bounce: &mut Bounce,
    terrain: &TerrainOracle,
    cfg: &SimConfig,
    dt: f32,
) -> bool {
    if bounce.velocity <= cfg.bounce_threshold {
        bounce.cooldown = (bounce.cooldown - dt).max(0.0);
        return false;
    }
    let Some(direction) = bounce.direction else {
        bounce.velocity = 0.0;
        return false;
    };

    bounce.lock_timer += dt;
    let (next, _) = sphere::move_along_great_circle(
        *pos,
        direction,
        bounce.velocity * dt,
        terrain.base_radius(),
    );
    let snapped = terrain.surface_point(next, cfg.ground_offset);
    if snapped.is_finite() {
        *pos = snapped;
    }
    bounce.velocity *= (-cfg.bounce_decay * dt).exp();

    // Hard stop: decayed out, or the 2 s safety cap expired.
    if bounce.velocity <= cfg.bounce_threshold || bounce.lock_timer >= cfg.bounce_max_secs {
        bounce.velocity = 0.0;
        bounce.direction = None;
        bounce.lock_timer = 0.0;
        return false;
    }
    true
}

/// Commit a proposed move against the rock oracle. On a hard collision the
/// unit stays put and a rebound is armed (unless the bounce cooldown is
/// still running). Non-finite proposals are discarded wholesale.
pub(crate) fn commit_move(
    from: Vec3,
    proposed: Vec3,
    rocks: &RockField,
    bounce: &mut Bounce,
    cfg: &SimConfig,
    dt: f32,
) -> Vec3 {
    if !proposed.is_finite() {
        return from;
    }
    let result = rocks.check_and_slide(from, proposed);
    if !result.collided {
        return result.position;
    }
    if bounce.cooldown <= 0.0 {
        let rebound = from.distance(proposed) / dt * cfg.bounce_restitution;
        // A rebound too weak to carry the unit anywhere just stops it.
        if rebound > cfg.bounce_threshold {
            bounce.velocity = rebound;
            bounce.direction = result.bounce_dir;
            bounce.cooldown = cfg.bounce_cooldown;
            bounce.lock_timer = 0.0;
        }
    }
    from
}

/// Keyboard-driven motion: turn about the sphere normal, then step along the
/// heading's great circle, transporting the heading frame to the new normal.
#[allow(clippy::too_many_arguments)]
pub(crate) fn manual_drive(
    pos: &mut Vec3,
    heading: &mut Quat,
    motion: &mut Motion,
    input: DriveInput,
    damping: f32,
    terrain: &TerrainOracle,
    rocks: &RockField,
    bounce: &mut Bounce,
    cfg: &SimConfig,
    dt: f32,
) {
    let old_normal = pos.normalize_or_zero();
    if old_normal == Vec3::ZERO {
        return;
    }

    // Smoothed turn about the local vertical.
    let target_turn = -input.turn * cfg.turn_rate;
    motion.turn_speed += (target_turn - motion.turn_speed) * (dt * 8.0).min(1.0);
    if motion.turn_speed.abs() > 1e-5 {
        *heading = (Quat::from_axis_angle(old_normal, motion.turn_speed * dt) * *heading).normalize();
    }

    let forward = sphere::project_to_tangent(*heading * Vec3::Z, old_normal).normalize_or_zero();
    if forward == Vec3::ZERO {
        return;
    }

    let dist = input.forward * cfg.unit_speed * damping * dt;
    if dist.abs() > 1e-6 {
        let (stepped, _) =
            sphere::move_along_great_circle(*pos, forward, dist, terrain.base_radius());
        let proposed = terrain.surface_point(stepped, cfg.ground_offset);
        let committed = commit_move(*pos, proposed, rocks, bounce, cfg, dt);
        if committed != *pos {
            let new_normal = committed.normalize_or(old_normal);
            *heading = sphere::parallel_transport(*heading, old_normal, new_normal);
            motion.velocity_dir = sphere::project_to_tangent(
                (committed - *pos) * input.forward.signum(),
                new_normal,
            )
            .normalize_or(motion.velocity_dir);
            *pos = committed;
        }
    }

    let normal = pos.normalize_or(old_normal);
    *heading = sphere::lock_vertical_axis(*heading, normal);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::InitialConfig;

    fn flat_terrain() -> TerrainOracle {
        TerrainOracle::new(&InitialConfig {
            base_radius: 10.0,
            terrain_amplitude: 0.0,
            water_level: -1.0,
            ..Default::default()
        })
    }

    #[test]
    fn flat_ground_leaves_speed_unchanged() {
        let terrain = flat_terrain();
        let cfg = SimConfig::default();
        let scale = slope_speed_scale(&terrain, Vec3::new(0.0, 0.0, 10.5), Vec3::X, &cfg);
        assert!((scale - 1.0).abs() < 1e-4);
    }

    #[test]
    fn flat_ground_has_no_drift() {
        let terrain = flat_terrain();
        let cfg = SimConfig::default();
        let drift = lateral_drift(&terrain, Vec3::new(0.0, 0.0, 10.5), Vec3::X, 5.0, &cfg, 0.05);
        assert!(drift.length() < 1e-5);
    }

    #[test]
    fn bounce_decays_and_unlocks() {
        let terrain = flat_terrain();
        let cfg = SimConfig::default();
        let mut pos = Vec3::new(0.0, 0.0, 10.5);
        let mut bounce = Bounce {
            velocity: 2.0,
            direction: Some(Vec3::X),
            cooldown: cfg.bounce_cooldown,
            lock_timer: 0.0,
        };
        let mut locked_ticks = 0;
        for _ in 0..60 {
            if apply_bounce(&mut pos, &mut bounce, &terrain, &cfg, 0.05) {
                locked_ticks += 1;
            }
        }
        assert!(locked_ticks > 0);
        assert_eq!(bounce.velocity, 0.0);
        assert!(bounce.direction.is_none());
        // Carried some distance along +X before stopping.
        assert!(pos.x > 0.1);
        // Still terrain-locked.
        assert!((pos.length() - 10.5).abs() < 1e-3);
    }

    #[test]
    fn hard_collision_arms_bounce_and_holds_position() {
        let rocks = RockField::from_rocks(vec![crate::game::rocks::Rock {
            center: Vec3::new(0.0, 0.0, 10.5),
            radius: 1.0,
        }]);
        let cfg = SimConfig::default();
        let mut bounce = Bounce::default();
        let from = Vec3::new(0.0, 0.0, 9.5);
        let to = Vec3::new(0.0, 0.0, 9.8);
        let committed = commit_move(from, to, &rocks, &mut bounce, &cfg, 0.05);
        assert_eq!(committed, from);
        assert!(bounce.velocity > 0.0);
        assert_eq!(bounce.cooldown, cfg.bounce_cooldown);
        let dir = bounce.direction.unwrap();
        assert!(dir.dot(Vec3::NEG_Z) > 0.99);
    }

    #[test]
    fn nan_proposal_is_discarded() {
        let rocks = RockField::default();
        let cfg = SimConfig::default();
        let mut bounce = Bounce::default();
        let from = Vec3::new(0.0, 0.0, 10.5);
        let committed = commit_move(from, Vec3::splat(f32::NAN), &rocks, &mut bounce, &cfg, 0.05);
        assert_eq!(committed, from);
        assert_eq!(bounce.velocity, 0.0);
    }
}
