/// Water sub-machine: normal -> slowing -> shore_exit -> recovering -> normal.
///
/// Entering water (for a non-swimmer) ramps a damping factor down until the
/// unit stalls, then the shore-exit automaton probes the surrounding terrain
/// and drives the unit uphill until it surfaces; a short scripted
/// deceleration hands control back.

use bevy::prelude::*;

use crate::game::sphere;
use crate::game::terrain::TerrainOracle;

use super::components::*;
use super::resources::SimConfig;

/// Advance the water machine one tick. Owns all transitions of the machine;
/// movement performed here is already terrain-snapped.
pub(crate) fn step_water(
    water: &mut WaterMachine,
    nav: &mut Navigator,
    motion: &mut Motion,
    pos: &mut Vec3,
    caps: &Capabilities,
    terrain: &TerrainOracle,
    cfg: &SimConfig,
    dt: f32,
) {
    let underwater = terrain.depth_at(*pos) > cfg.water_depth_threshold;

    match water.state {
        WaterState::Normal => {
            if underwater && !caps.can_swim {
                water.state = WaterState::Slowing;
                water.slowdown = 1.0;
            }
        }
        WaterState::Slowing => {
            if !underwater {
                // Crossed a shallow patch; no automaton needed.
                water.state = WaterState::Normal;
                water.slowdown = 1.0;
                return;
            }
            water.slowdown -= dt * cfg.water_slowdown_rate;
            if water.slowdown <= cfg.water_slowdown_floor {
                water.state = WaterState::ShoreExit;
                water.timer = 0.0;
                nav.is_following = false;
            }
        }
        WaterState::ShoreExit => {
            water.timer += dt;
            if !underwater {
                water.state = WaterState::Recovering;
                water.recover_speed = cfg.recover_start_speed;
                return;
            }
            if water.timer >= cfg.shore_exit_timeout {
                water.state = WaterState::Normal;
                water.slowdown = 1.0;
                return;
            }
            water.exit_dir = shore_direction(*pos, terrain, cfg);
            if water.exit_dir != Vec3::ZERO {
                let (stepped, moved_dir) = sphere::move_along_great_circle(
                    *pos,
                    water.exit_dir,
                    cfg.shore_exit_speed * dt,
                    terrain.base_radius(),
                );
                let snapped = terrain.surface_point(stepped, cfg.ground_offset);
                if snapped.is_finite() {
                    *pos = snapped;
                    motion.velocity_dir = moved_dir;
                }
            }
        }
        WaterState::Recovering => {
            water.recover_speed -= dt * (cfg.recover_start_speed / cfg.recover_duration);
            if water.recover_speed > cfg.min_speed && motion.velocity_dir.length_squared() > 1e-8 {
                let (stepped, _) = sphere::move_along_great_circle(
                    *pos,
                    motion.velocity_dir,
                    water.recover_speed * dt,
                    terrain.base_radius(),
                );
                let snapped = terrain.surface_point(stepped, cfg.ground_offset);
                if snapped.is_finite() {
                    *pos = snapped;
                }
            } else {
                water.state = WaterState::Normal;
                water.slowdown = 1.0;
                water.recover_speed = 0.0;
                if nav.has_path() && !nav.paused_by_command {
                    nav.is_following = true;
                }
            }
        }
    }
}

/// Probe tangent directions around the unit and pick the one climbing the
/// terrain fastest.
fn shore_direction(pos: Vec3, terrain: &TerrainOracle, cfg: &SimConfig) -> Vec3 {
    let normal = pos.normalize_or_zero();
    if normal == Vec3::ZERO {
        return Vec3::ZERO;
    }
    let (t1, t2) = sphere::tangent_basis(normal);
    let mut best_dir = Vec3::ZERO;
    let mut best_radius = f32::NEG_INFINITY;
    for i in 0..cfg.shore_probe_count {
        let angle = i as f32 / cfg.shore_probe_count as f32 * std::f32::consts::TAU;
        let dir = t1 * angle.cos() + t2 * angle.sin();
        let probe = (pos + dir * cfg.shore_probe_offset).normalize_or_zero();
        if probe == Vec3::ZERO {
            continue;
        }
        let radius = terrain.radius_at(probe);
        if radius.is_finite() && radius > best_radius {
            best_radius = radius;
            best_dir = dir;
        }
    }
    best_dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::InitialConfig;

    fn flooded_terrain() -> TerrainOracle {
        // Water sits above the flat terrain everywhere.
        TerrainOracle::new(&InitialConfig {
            base_radius: 10.0,
            terrain_amplitude: 0.0,
            water_level: 1.0,
            ..Default::default()
        })
    }

    fn dry_terrain() -> TerrainOracle {
        TerrainOracle::new(&InitialConfig {
            base_radius: 10.0,
            terrain_amplitude: 0.0,
            water_level: -1.0,
            ..Default::default()
        })
    }

    #[test]
    fn swimmer_never_enters_slowing() {
        let terrain = flooded_terrain();
        let cfg = SimConfig::default();
        let mut water = WaterMachine::default();
        let mut nav = Navigator::default();
        let mut motion = Motion::default();
        let mut pos = Vec3::new(0.0, 0.0, 10.5);
        let caps = Capabilities { can_swim: true };
        step_water(&mut water, &mut nav, &mut motion, &mut pos, &caps, &terrain, &cfg, 0.05);
        assert_eq!(water.state, WaterState::Normal);
    }

    #[test]
    fn non_swimmer_slows_then_exits() {
        let terrain = flooded_terrain();
        let cfg = SimConfig::default();
        let mut water = WaterMachine::default();
        let mut nav = Navigator::default();
        nav.is_following = true;
        let mut motion = Motion::default();
        let mut pos = Vec3::new(0.0, 0.0, 10.5);
        let caps = Capabilities { can_swim: false };

        step_water(&mut water, &mut nav, &mut motion, &mut pos, &caps, &terrain, &cfg, 0.05);
        assert_eq!(water.state, WaterState::Slowing);

        // Damping ramps down at 2.5/s: gone well within a second.
        for _ in 0..20 {
            step_water(&mut water, &mut nav, &mut motion, &mut pos, &caps, &terrain, &cfg, 0.05);
        }
        assert_eq!(water.state, WaterState::ShoreExit);
        assert!(!nav.is_following);

        // Fully flooded world: the 3 s timeout releases the automaton.
        for _ in 0..61 {
            step_water(&mut water, &mut nav, &mut motion, &mut pos, &caps, &terrain, &cfg, 0.05);
        }
        assert_eq!(water.state, WaterState::Normal);
    }

    #[test]
    fn recovery_decelerates_and_resumes_path() {
        let terrain = dry_terrain();
        let cfg = SimConfig::default();
        let mut water = WaterMachine {
            state: WaterState::Recovering,
            recover_speed: cfg.recover_start_speed,
            ..Default::default()
        };
        let mut nav = Navigator::default();
        nav.path = vec![Vec3::new(0.0, 0.0, 10.5)];
        let mut motion = Motion {
            velocity_dir: Vec3::X,
            ..Default::default()
        };
        let mut pos = Vec3::new(0.0, 0.0, 10.5);
        let caps = Capabilities { can_swim: false };

        for _ in 0..20 {
            step_water(&mut water, &mut nav, &mut motion, &mut pos, &caps, &terrain, &cfg, 0.05);
        }
        assert_eq!(water.state, WaterState::Normal);
        assert!(nav.is_following);
    }
}
