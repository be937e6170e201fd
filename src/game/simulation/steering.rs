/// Path following: polyline advance, look-ahead steering, curvature braking,
/// waypoint-arrival crossing detection, transition arcs, and the periodic
/// forbidden-zone scan of the path ahead.

use bevy::prelude::*;
use rand::Rng;
use smallvec::SmallVec;

use crate::game::path::{self, Rejoin};
use crate::game::rocks::RockField;
use crate::game::sphere;
use crate::game::terrain::{TerrainOracle, Zone};

use super::components::*;
use super::resources::SimConfig;

/// Rebuild the sampled path from the current waypoints and plan how the unit
/// rejoins it. The rejoin always bridges from the unit's actual position
/// (`travel_dir` is its velocity while moving, its heading forward when
/// standing), so a fresh path never teleports the unit onto the spline.
/// Arrival bookkeeping (`last_waypoint_id`, `target_waypoint_id`) is
/// deliberately untouched: those fields are event-sourced from crossings.
pub(crate) fn rebuild_and_rejoin(
    nav: &mut Navigator,
    transition: &mut Transition,
    pos: Vec3,
    travel_dir: Vec3,
    can_swim: bool,
    terrain: &TerrainOracle,
    cfg: &SimConfig,
) {
    let positions: Vec<Vec3> = nav.waypoints.iter().map(|w| w.position).collect();
    let sampled = path::build_path(&positions, nav.is_closed, terrain, cfg.ground_offset);
    nav.path = sampled.points;
    nav.segment_indices = sampled.segment_indices;

    if !nav.has_path() {
        nav.path_index = 0;
        nav.is_following = false;
        transition.arc = None;
        return;
    }

    match path::plan_rejoin(
        pos,
        travel_dir,
        &nav.path,
        can_swim,
        terrain,
        cfg.ground_offset,
    ) {
        Some(Rejoin::Arc {
            points,
            rejoin_index,
        }) => {
            transition.arc = Some(TransitionArc {
                points,
                index: 0,
                resume_index: rejoin_index,
            });
            nav.path_index = rejoin_index;
        }
        Some(Rejoin::Direct { rejoin_index }) => {
            transition.arc = None;
            nav.path_index = rejoin_index;
        }
        None => {
            transition.arc = None;
            nav.path_index = 0;
        }
    }
}

/// Periodic scan of the upcoming path for zones that have become forbidden.
/// Staggered per unit through its RNG substream; triggers a replan with a
/// transition arc when a violation is found.
#[allow(clippy::too_many_arguments)]
pub(crate) fn scan_path_ahead(
    nav: &mut Navigator,
    transition: &mut Transition,
    rng: &mut UnitRng,
    pos: Vec3,
    travel_dir: Vec3,
    can_swim: bool,
    terrain: &TerrainOracle,
    rocks: &RockField,
    cfg: &SimConfig,
    dt: f32,
) {
    nav.scan_timer -= dt;
    if nav.scan_timer > 0.0 {
        return;
    }
    nav.scan_timer = rng
        .0
        .random_range(cfg.scan_interval_min..cfg.scan_interval_max);

    if !nav.is_following || !nav.has_path() {
        return;
    }
    let len = nav.path.len();
    for offset in 0..cfg.scan_window.min(len) {
        let idx = if nav.wraps() {
            (nav.path_index + offset) % len
        } else {
            let idx = nav.path_index + offset;
            if idx >= len {
                break;
            }
            idx
        };
        if terrain.classify(rocks, nav.path[idx], can_swim) == Zone::Forbidden {
            debug!("Path blocked ahead at sample {}, replanning", idx);
            rebuild_and_rejoin(nav, transition, pos, travel_dir, can_swim, terrain, cfg);
            return;
        }
    }
}

/// Result of walking a polyline with a movement budget.
pub(crate) struct Advance {
    pub pos: Vec3,
    /// Point indices reached (consumed) this step, in order.
    pub consumed: SmallVec<[usize; 8]>,
    /// True when an open polyline ran out of points.
    pub finished: bool,
}

/// Advance incrementally along `points` from `pos`, spending up to `budget`
/// meters. `index` is the next target point and is updated in place,
/// wrapping when `wraps` is set.
pub(crate) fn advance_polyline(
    points: &[Vec3],
    index: &mut usize,
    wraps: bool,
    mut pos: Vec3,
    mut budget: f32,
) -> Advance {
    let mut consumed = SmallVec::new();
    let len = points.len();
    if len == 0 {
        return Advance {
            pos,
            consumed,
            finished: true,
        };
    }
    // Bounded by the point count so a tiny wrapped loop cannot spin forever.
    for _ in 0..=len {
        if *index >= len {
            if wraps {
                *index = 0;
            } else {
                return Advance {
                    pos,
                    consumed,
                    finished: true,
                };
            }
        }
        let target = points[*index];
        let delta = target - pos;
        let dist = delta.length();
        if dist <= budget {
            pos = target;
            budget -= dist;
            consumed.push(*index);
            *index += 1;
            if budget <= 1e-5 {
                break;
            }
        } else {
            pos += delta / dist * budget;
            break;
        }
    }
    Advance {
        pos,
        consumed,
        finished: false,
    }
}

/// Lower bound of the curvature brake.
const MIN_CURVE_FACTOR: f32 = 0.1;

/// Curve-aware speed factor from the agreement between the current path
/// tangent and the tangent roughly one second of travel ahead. The response
/// is asymmetric: braking into a curve bites harder than the release out of
/// it.
pub(crate) fn curvature_factor(nav: &Navigator, motion: &mut Motion, cfg: &SimConfig) -> f32 {
    let len = nav.path.len();
    if len < 3 || nav.path_index + 1 >= len && !nav.wraps() {
        motion.curve_dot = 1.0;
        return 1.0;
    }
    let at = |i: usize| -> Vec3 {
        if nav.wraps() {
            nav.path[i % len]
        } else {
            nav.path[i.min(len - 1)]
        }
    };
    let i = nav.path_index.min(len - 1);
    let here = at(i);
    let next = at(i + 1);
    let spacing = here.distance(next).max(1e-3);
    let ahead_points = ((cfg.unit_speed * cfg.curve_lookahead_secs) / spacing).ceil() as usize;
    let ahead_points = ahead_points.clamp(1, len - 1);

    let t_now = (next - here).normalize_or_zero();
    let t_ahead = (at(i + ahead_points + 1) - at(i + ahead_points)).normalize_or_zero();
    if t_now == Vec3::ZERO || t_ahead == Vec3::ZERO {
        motion.curve_dot = 1.0;
        return 1.0;
    }

    let dot_plus = t_now.dot(t_ahead).max(0.0);
    let exp = if dot_plus < motion.curve_dot {
        cfg.curve_enter_exp
    } else {
        cfg.curve_exit_exp
    };
    motion.curve_dot = dot_plus;
    // Braking never reaches a standstill; hairpins are crawled through.
    dot_plus.powf(exp).max(MIN_CURVE_FACTOR)
}

/// Blend of the next few path-point directions, weighted toward the nearest,
/// projected into the tangent plane. Returns `None` when every contribution
/// degenerates (e.g. standing exactly on the remaining points).
pub(crate) fn lookahead_direction(
    nav: &Navigator,
    pos: Vec3,
    normal: Vec3,
    cfg: &SimConfig,
) -> Option<Vec3> {
    let len = nav.path.len();
    if len == 0 {
        return None;
    }
    let mut sum = Vec3::ZERO;
    for i in 0..cfg.lookahead_points {
        let idx = if nav.wraps() {
            (nav.path_index + i) % len
        } else {
            (nav.path_index + i).min(len - 1)
        };
        let toward = sphere::project_to_tangent(nav.path[idx] - pos, normal);
        if toward.length_squared() > 1e-8 {
            let weight = 1.0 / (1.0 + cfg.lookahead_falloff * i as f32);
            sum += toward.normalize() * weight;
        }
    }
    (sum.length_squared() > 1e-8).then(|| sum.normalize())
}

/// Register waypoint arrivals for every path point consumed this tick.
/// Arrival is a crossing event tied to the recorded arrival indices; spline
/// rebuilds and waypoint reorders leave these fields untouched.
pub(crate) fn register_arrivals(nav: &mut Navigator, consumed: &[usize]) {
    if nav.waypoints.is_empty() {
        return;
    }
    let mut arrived: SmallVec<[usize; 4]> = SmallVec::new();
    for &idx in consumed {
        for (k, &seg) in nav.segment_indices.iter().enumerate() {
            if seg == idx {
                arrived.push(k);
            }
        }
    }
    for k in arrived {
        let id = nav.waypoints[k].id.clone();
        *nav.arrival_counts.entry(id.clone()).or_insert(0) += 1;
        nav.last_waypoint_id = Some(id);
        nav.target_waypoint_id = if k + 1 < nav.waypoints.len() {
            Some(nav.waypoints[k + 1].id.clone())
        } else if nav.wraps() {
            Some(nav.waypoints[0].id.clone())
        } else {
            None
        };
    }
}
