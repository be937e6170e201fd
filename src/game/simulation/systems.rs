/// Core simulation systems: tick counting, pose snapshotting for render
/// interpolation, session bootstrap from the initial configuration, and the
/// per-unit tick driver.
///
/// The per-unit update order inside `tick_units` is fixed; reordering the
/// steps changes outcomes across peers.

use bevy::prelude::*;

use crate::game::config::InitialConfig;
use crate::game::rng::{self, SessionSeed, VisualRng};
use crate::game::rocks::RockField;
use crate::game::seat::SeatState;
use crate::game::sphere;
use crate::game::terrain::TerrainOracle;

use super::components::*;
use super::movement;
use super::resources::*;
use super::steering;
use super::water;

/// Cadence of the perf_stats status line: every 100 ticks, five seconds of
/// simulated time at the 20 Hz tick rate.
#[cfg(feature = "perf_stats")]
const STATUS_LOG_INTERVAL_TICKS: u64 = 100;

// ============================================================================
// Tick Management
// ============================================================================

/// Increment the global simulation tick counter. Runs before every other
/// fixed-update system so they all observe the same tick value.
pub fn increment_sim_tick(mut tick: ResMut<SimTick>) {
    tick.increment();
}

// ============================================================================
// Session bootstrap
// ============================================================================

/// Build the deterministic session from [`InitialConfig`] at startup: the
/// fixed timestep, the simulation parameters, and the immutable world
/// oracles. A pre-inserted `InitialConfig` (tests, match setup) wins over
/// the defaults.
pub fn init_sim_config_from_initial(
    mut commands: Commands,
    mut fixed_time: ResMut<Time<Fixed>>,
    initial: Option<Res<InitialConfig>>,
) {
    let config = match initial {
        Some(config) => config.clone(),
        None => {
            warn!("InitialConfig not found, using defaults");
            InitialConfig::default()
        }
    };

    fixed_time.set_timestep_seconds(1.0 / config.tick_rate);

    let terrain = TerrainOracle::new(&config);
    let rocks = RockField::generate(&config, &terrain);
    let seed = SessionSeed(config.session_seed);

    info!(
        "Session initialized: seed {:#x}, base radius {}, {} rocks",
        config.session_seed,
        terrain.base_radius(),
        rocks.rocks().len()
    );

    commands.insert_resource(SimConfig::from_initial(&config));
    commands.insert_resource(terrain);
    commands.insert_resource(rocks);
    commands.insert_resource(VisualRng(rng::visual_stream(seed)));
    commands.insert_resource(seed);
}

// ============================================================================
// Pose snapshots
// ============================================================================

/// Capture the previous authoritative pose before this tick mutates it; the
/// renderer interpolates between this snapshot and the live pose.
pub fn cache_previous_state(
    mut query: Query<(
        &mut SimPositionPrev,
        &SimPosition,
        &mut SimHeadingPrev,
        &SimHeading,
    )>,
) {
    for (mut prev_pos, pos, mut prev_heading, heading) in query.iter_mut() {
        prev_pos.0 = pos.0;
        prev_heading.0 = heading.0;
    }
}

// ============================================================================
// Per-unit tick driver
// ============================================================================

type UnitTickQuery<'w, 's> = Query<
    'w,
    's,
    (
        (
            Entity,
            &'static UnitId,
            &'static mut SimPosition,
            &'static mut SimHeading,
            &'static mut Motion,
        ),
        (
            &'static mut Navigator,
            &'static mut WaterMachine,
            &'static mut Bounce,
            &'static mut Transition,
            &'static mut DriveOverride,
        ),
        (
            &'static mut StuckDetector,
            &'static Capabilities,
            &'static mut UnitRng,
            &'static SeatState,
        ),
    ),
>;

/// Advance every unit one tick, in ascending unit-id order.
pub fn tick_units(
    cfg: Res<SimConfig>,
    #[allow(unused_variables)] tick: Res<SimTick>,
    terrain: Res<TerrainOracle>,
    rocks: Res<RockField>,
    inputs: Res<DriveInputs>,
    hovered: Res<HoveredUnit>,
    mut query: UnitTickQuery,
) {
    let dt = cfg.dt();
    let mut units: Vec<_> = query.iter_mut().collect();
    units.sort_by_key(|entry| *(entry.0).1);
    let unit_count = units.len();

    for (
        (_entity, id, mut pos, mut heading, mut motion),
        (mut nav, mut water_m, mut bounce, mut transition, mut overdrive),
        (mut stuck, caps, mut rng, seat),
    ) in units
    {
        let start_pos = pos.0;
        let start_heading = heading.0;

        // Directional input reaches a unit only through its seated operator.
        let input = seat
            .selected_by
            .and_then(|slot| inputs.0.get(&slot).copied())
            .unwrap_or_default();
        let is_hovered = hovered.0 == Some(id.0);

        // 1. Periodic forbidden-zone scan of the path ahead.
        let travel_dir = if motion.velocity_dir.length_squared() > 1e-6 {
            motion.velocity_dir
        } else {
            heading.0 * Vec3::Z
        };
        steering::scan_path_ahead(
            &mut nav,
            &mut transition,
            &mut rng,
            pos.0,
            travel_dir,
            caps.can_swim,
            &terrain,
            &rocks,
            &cfg,
            dt,
        );

        // 2. Smoothed throttle toward pause/hover target.
        let throttle_target = if nav.paused_by_command || is_hovered {
            0.0
        } else {
            1.0
        };
        let rate = if throttle_target < motion.speed_factor {
            cfg.decel_rate
        } else {
            cfg.accel_rate
        };
        motion.speed_factor += (throttle_target - motion.speed_factor) * (dt * rate).min(1.0);

        // 3. Slope-modulated speed budget plus cross-slope drift.
        let under_way =
            nav.is_following || transition.arc.is_some() || input.is_active();
        let mut move_speed = cfg.unit_speed * motion.speed_factor * water_m.damping();
        move_speed *= movement::slope_speed_scale(&terrain, pos.0, motion.velocity_dir, &cfg);
        if under_way && move_speed > cfg.min_speed {
            let drift =
                movement::lateral_drift(&terrain, pos.0, motion.velocity_dir, move_speed, &cfg, dt);
            if drift != Vec3::ZERO {
                let drifted = terrain.surface_point(pos.0 + drift, cfg.ground_offset);
                if drifted.is_finite() {
                    pos.0 = drifted;
                }
            }
        }

        // 4. Rock-bounce carry; ignores input while locked.
        let bounce_locked = movement::apply_bounce(&mut pos.0, &mut bounce, &terrain, &cfg, dt);

        // 5. Stuck watchdog (advisory only).
        stuck.check_timer += dt;
        if stuck.check_timer >= cfg.stuck_check_interval {
            let displaced = pos.0.distance(stuck.last_pos);
            if nav.is_following && displaced < cfg.stuck_min_displacement {
                stuck.stuck_secs += stuck.check_timer;
            } else {
                stuck.stuck_secs = 0.0;
            }
            stuck.is_stuck = stuck.stuck_secs >= cfg.stuck_after_secs;
            stuck.last_pos = pos.0;
            stuck.check_timer = 0.0;
        }

        // 6. Wait timer holds the unit in place, heading untouched.
        if nav.wait_timer > 0.0 {
            nav.wait_timer -= dt;
            motion.last_step = pos.0.distance(start_pos);
            continue;
        }

        // 7. Anti-block safety: a unit that should be moving but has been
        // pinned by blockers for too long sheds all of them.
        let blocked = nav.paused_by_command
            || water_m.state != WaterState::Normal
            || bounce.velocity > cfg.bounce_threshold
            || transition.arc.is_some();
        if nav.is_following && nav.has_path() && motion.last_step < 1e-4 && blocked {
            stuck.blocked_secs += dt;
        } else {
            stuck.blocked_secs = 0.0;
        }
        if stuck.blocked_secs > cfg.blocked_clear_secs {
            debug!("Unit {} blocked for too long, clearing block state", id.0);
            nav.paused_by_command = false;
            *water_m = WaterMachine::default();
            *bounce = Bounce::default();
            transition.arc = None;
            stuck.blocked_secs = 0.0;
        }

        // Directional input pre-empts path following within the same tick.
        let drive_active = input.is_active() && !bounce_locked && !water_m.locks_input();

        if !bounce_locked
            && !drive_active
            && overdrive.phase == OverridePhase::Inactive
            && nav.is_following
        {
            if let Some(arc) = transition.arc.as_mut() {
                // 8. Transition-arc follow; resumes the main path at the
                // preserved index once the arc is exhausted.
                let mut arc_index = arc.index;
                let advanced = steering::advance_polyline(
                    &arc.points,
                    &mut arc_index,
                    false,
                    pos.0,
                    move_speed * dt,
                );
                arc.index = arc_index;
                pos.0 = movement::commit_move(pos.0, advanced.pos, &rocks, &mut bounce, &cfg, dt);
                if advanced.finished || arc.index >= arc.points.len() {
                    transition.arc = None;
                }
            } else if nav.has_path() {
                // 9. Main path follow with curve-aware braking.
                let target_idx = nav.path_index.min(nav.path.len() - 1);
                if !caps.can_swim
                    && water_m.state == WaterState::Normal
                    && terrain.is_submerged(nav.path[target_idx])
                {
                    water_m.state = WaterState::Slowing;
                    water_m.slowdown = 1.0;
                }

                let curve = steering::curvature_factor(&nav, &mut motion, &cfg);
                let budget = move_speed * curve * dt;
                if budget > 1e-6 {
                    let wraps = nav.wraps();
                    let mut idx = nav.path_index;
                    let advanced =
                        steering::advance_polyline(&nav.path, &mut idx, wraps, pos.0, budget);
                    nav.path_index = idx;
                    let committed =
                        movement::commit_move(pos.0, advanced.pos, &rocks, &mut bounce, &cfg, dt);
                    if committed == advanced.pos {
                        // 10. Waypoint arrivals are crossings of the recorded
                        // arrival indices, never proximity tests.
                        steering::register_arrivals(&mut nav, &advanced.consumed);
                    }
                    pos.0 = committed;
                    if advanced.finished && !wraps {
                        nav.is_following = false;
                    }
                }

                // 11. Look-ahead steering blend.
                let normal = pos.0.normalize_or(Vec3::Y);
                if let Some(dir) = steering::lookahead_direction(&nav, pos.0, normal, &cfg) {
                    motion.velocity_dir = dir;
                }
            }
        }

        // 12. Orientation: ease toward the motion frame, then re-pin the
        // vertical axis to the sphere normal.
        if !bounce_locked {
            let sphere_normal = pos.0.normalize_or(Vec3::Y);
            let terrain_normal = terrain.normal_at(pos.0);
            let up = if terrain_normal.is_finite() {
                terrain_normal
            } else {
                sphere_normal
            };
            let target = sphere::surface_alignment(motion.velocity_dir, up);
            let alpha = sphere::smoothing_factor(cfg.heading_smoothing_base, dt);
            heading.0 = heading.0.slerp(target, alpha);
            heading.0 = sphere::lock_vertical_axis(heading.0, sphere_normal);
        }

        // 13. Keyboard-override arbitration.
        match overdrive.phase {
            OverridePhase::Inactive => {
                if drive_active {
                    overdrive.phase = OverridePhase::Active;
                    overdrive.saved_path = nav.path.clone();
                    overdrive.saved_index = nav.path_index;
                    nav.is_following = false;
                    transition.arc = None;
                }
            }
            OverridePhase::Active => {
                if !drive_active {
                    overdrive.phase = OverridePhase::Cooldown;
                    overdrive.timer = cfg.override_release_secs;
                }
            }
            OverridePhase::Cooldown => {
                if drive_active {
                    overdrive.phase = OverridePhase::Active;
                } else {
                    overdrive.timer -= dt;
                    if overdrive.timer <= 0.0 {
                        // Hard zero; the saved path stays parked until an
                        // explicit play command.
                        overdrive.phase = OverridePhase::Inactive;
                        motion.turn_speed = 0.0;
                    }
                }
            }
        }

        // 14. Manual motion integration.
        if overdrive.phase == OverridePhase::Active && drive_active {
            movement::manual_drive(
                &mut pos.0,
                &mut heading.0,
                &mut motion,
                input,
                water_m.damping(),
                &terrain,
                &rocks,
                &mut bounce,
                &cfg,
                dt,
            );
        }

        // 15. Terrain snap for units not riding a precomputed polyline
        // (polyline samples are already projected).
        let on_polyline = (nav.is_following && nav.has_path()) || transition.arc.is_some();
        if !on_polyline {
            let snapped = terrain.surface_point(pos.0, cfg.ground_offset);
            if snapped.is_finite() {
                pos.0 = snapped;
            }
        }

        // 16. Rock collision runs inside commit_move at every integration
        // site above.

        // 17. Water sub-machine.
        water::step_water(
            &mut water_m,
            &mut nav,
            &mut motion,
            &mut pos.0,
            caps,
            &terrain,
            &cfg,
            dt,
        );

        // Oracle misbehavior guard: a non-finite pose rejects the whole
        // tick's movement.
        if !pos.0.is_finite() || !heading.0.is_finite() {
            pos.0 = start_pos;
            heading.0 = start_heading;
        }
        motion.last_step = pos.0.distance(start_pos);
    }

    #[cfg(feature = "perf_stats")]
    if tick.0 % STATUS_LOG_INTERVAL_TICKS == 0 {
        info!("[SIM STATUS] Tick: {} | Units: {}", tick.0, unit_count);
    }
    #[cfg(not(feature = "perf_stats"))]
    let _ = unit_count;
}
