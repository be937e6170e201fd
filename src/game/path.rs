//! Waypoint path construction: Catmull-Rom sampling with chordal
//! parameterization, terrain projection, and rejoin arcs for paths edited
//! while a unit is travelling.

use bevy::prelude::*;
use smallvec::SmallVec;

use crate::game::terrain::TerrainOracle;

/// Minimum number of samples for any path.
pub const MIN_SAMPLES: usize = 300;
/// Additional samples per waypoint.
pub const SAMPLES_PER_WAYPOINT: usize = 50;

/// Sampled, terrain-projected polyline plus the per-waypoint arrival indices.
#[derive(Debug, Clone, Default)]
pub struct SampledPath {
    pub points: Vec<Vec3>,
    /// For each input waypoint, the path index at which a unit is considered
    /// to have arrived at it.
    pub segment_indices: Vec<usize>,
}

/// How a moving unit rejoins a freshly rebuilt path.
#[derive(Debug, Clone)]
pub enum Rejoin {
    /// Follow a short transition arc, then resume at `rejoin_index`.
    Arc {
        points: Vec<Vec3>,
        rejoin_index: usize,
    },
    /// No arc (rejected or degenerate); resume directly at `rejoin_index`.
    Direct { rejoin_index: usize },
}

/// Rejoin candidates behind the unit (against the travel direction) are
/// rejected beyond this dot threshold.
const REJOIN_BACKWARD_LIMIT: f32 = -0.3;
/// Control-point reach of the rejoin Bezier, as a fraction of the gap.
const REJOIN_TANGENT_REACH: f32 = 0.35;
/// How far past the rejoin point the end tangent is probed.
const REJOIN_TANGENT_PROBE: usize = 6;

/// Build the sampled path through `waypoints`, projected onto the terrain at
/// `ground_offset` above the surface.
pub fn build_path(
    waypoints: &[Vec3],
    closed: bool,
    terrain: &TerrainOracle,
    ground_offset: f32,
) -> SampledPath {
    match waypoints.len() {
        0 => return SampledPath::default(),
        1 => {
            let p = terrain.surface_point(waypoints[0], ground_offset);
            return SampledPath {
                points: vec![p],
                segment_indices: vec![0],
            };
        }
        _ => {}
    }

    let total = MIN_SAMPLES.max(waypoints.len() * SAMPLES_PER_WAYPOINT);
    let raw = sample_catmull_rom(waypoints, closed, total);
    let points: Vec<Vec3> = raw
        .into_iter()
        .map(|p| terrain.surface_point(p, ground_offset))
        .collect();

    // Arrival indices by nearest match after projection, scanning forward so
    // the mapping stays monotone in waypoint order.
    let mut segment_indices = Vec::with_capacity(waypoints.len());
    let mut cursor = 0;
    for w in waypoints {
        let target = terrain.surface_point(*w, ground_offset);
        let mut best = cursor;
        let mut best_d = f32::INFINITY;
        for (i, p) in points.iter().enumerate().skip(cursor) {
            let d = p.distance_squared(target);
            if d < best_d {
                best_d = d;
                best = i;
            }
        }
        segment_indices.push(best);
        cursor = best;
    }

    SampledPath {
        points,
        segment_indices,
    }
}

/// Plan how a unit at `pos` travelling along `travel_dir` rejoins `path`
/// after a rebuild. Returns `None` for an empty path.
pub fn plan_rejoin(
    pos: Vec3,
    travel_dir: Vec3,
    path: &[Vec3],
    can_swim: bool,
    terrain: &TerrainOracle,
    ground_offset: f32,
) -> Option<Rejoin> {
    if path.is_empty() {
        return None;
    }

    // Score candidates by distance, admitting only points not behind us.
    let mut best: Option<(usize, f32)> = None;
    let mut fallback: (usize, f32) = (0, f32::INFINITY);
    for (i, p) in path.iter().enumerate() {
        let d = p.distance(pos);
        if d < fallback.1 {
            fallback = (i, d);
        }
        let toward = (*p - pos).normalize_or_zero();
        if toward.dot(travel_dir) > REJOIN_BACKWARD_LIMIT && best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    let (near_idx, _) = best.unwrap_or(fallback);

    // Bias forward so the arc does not hug the nearest sample.
    let bias = ((20.0_f32).min(0.1 * path.len() as f32) / 2.0).round() as usize;
    let rejoin_index = (near_idx + bias).min(path.len() - 1);
    let rejoin = path[rejoin_index];

    let gap = pos.distance(rejoin);
    if gap < 1e-3 {
        return Some(Rejoin::Direct { rejoin_index });
    }

    let start_tangent = travel_dir.normalize_or(Vec3::Z);
    let probe = (rejoin_index + REJOIN_TANGENT_PROBE).min(path.len() - 1);
    let end_tangent = if probe > rejoin_index {
        (path[probe] - rejoin).normalize_or(start_tangent)
    } else {
        start_tangent
    };

    let p0 = pos;
    let p1 = pos + start_tangent * gap * REJOIN_TANGENT_REACH;
    let p2 = rejoin - end_tangent * gap * REJOIN_TANGENT_REACH;
    let p3 = rejoin;

    let samples = 8.max((2.0 * gap).ceil() as usize);
    let mut points = Vec::with_capacity(samples);
    for j in 1..=samples {
        let t = j as f32 / samples as f32;
        let p = cubic_bezier(p0, p1, p2, p3, t);
        let projected = terrain.surface_point(p, ground_offset);
        if !can_swim && terrain.is_submerged(projected) {
            // Arc would drag the unit through water: resume directly instead.
            return Some(Rejoin::Direct { rejoin_index });
        }
        points.push(projected);
    }

    Some(Rejoin::Arc {
        points,
        rejoin_index,
    })
}

fn cubic_bezier(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let u = 1.0 - t;
    p0 * (u * u * u) + p1 * (3.0 * u * u * t) + p2 * (3.0 * u * t * t) + p3 * (t * t * t)
}

/// Sample a Catmull-Rom spline through `ctrl` with chordal knot spacing.
///
/// Chordal parameterization keeps the curve free of cusps near unevenly
/// spaced control points. Open splines reflect their end points to obtain
/// the phantom neighbors; closed splines wrap.
fn sample_catmull_rom(ctrl: &[Vec3], closed: bool, total: usize) -> Vec<Vec3> {
    let n = ctrl.len();
    let segment_count = if closed { n } else { n - 1 };

    // Chord lengths drive both the knot vector and the sample distribution.
    let mut chords: SmallVec<[f32; 16]> = SmallVec::with_capacity(segment_count);
    let mut total_chord = 0.0_f32;
    for s in 0..segment_count {
        let a = ctrl[s];
        let b = ctrl[(s + 1) % n];
        let c = a.distance(b).max(1e-4);
        chords.push(c);
        total_chord += c;
    }

    let neighbor = |i: isize| -> Vec3 {
        if closed {
            ctrl[i.rem_euclid(n as isize) as usize]
        } else if i < 0 {
            // Reflect across the first point.
            ctrl[0] * 2.0 - ctrl[1]
        } else if i as usize >= n {
            ctrl[n - 1] * 2.0 - ctrl[n - 2]
        } else {
            ctrl[i as usize]
        }
    };

    let mut out = Vec::with_capacity(total + 1);
    let mut emitted = 0usize;
    for s in 0..segment_count {
        let p0 = neighbor(s as isize - 1);
        let p1 = ctrl[s];
        let p2 = ctrl[(s + 1) % n];
        let p3 = neighbor(s as isize + 2);

        // Proportional share of the sample budget; the final segment takes
        // whatever remains so the total stays exact. An open spline needs at
        // least two samples there to land on the final control point.
        let last_segment = s + 1 == segment_count;
        let share = if last_segment {
            total
                .saturating_sub(emitted)
                .max(if closed { 1 } else { 2 })
        } else {
            (((chords[s] / total_chord) * total as f32).round() as usize).max(1)
        };
        for j in 0..share {
            // Open splines land exactly on the final waypoint; closed ones
            // stop short of the wrap-around duplicate.
            let t = if last_segment && !closed {
                j as f32 / (share.saturating_sub(1)).max(1) as f32
            } else {
                j as f32 / share as f32
            };
            out.push(catmull_rom_point(p0, p1, p2, p3, t));
        }
        emitted += share;
    }
    out
}

/// Barry-Goldman evaluation of one chordal Catmull-Rom segment at local
/// parameter `t` in [0, 1] between `p1` and `p2`.
fn catmull_rom_point(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let t0 = 0.0;
    let t1 = t0 + p0.distance(p1).max(1e-4);
    let t2 = t1 + p1.distance(p2).max(1e-4);
    let t3 = t2 + p2.distance(p3).max(1e-4);
    let t = t1 + (t2 - t1) * t;

    let a1 = p0 * ((t1 - t) / (t1 - t0)) + p1 * ((t - t0) / (t1 - t0));
    let a2 = p1 * ((t2 - t) / (t2 - t1)) + p2 * ((t - t1) / (t2 - t1));
    let a3 = p2 * ((t3 - t) / (t3 - t2)) + p3 * ((t - t2) / (t3 - t2));
    let b1 = a1 * ((t2 - t) / (t2 - t0)) + a2 * ((t - t0) / (t2 - t0));
    let b2 = a2 * ((t3 - t) / (t3 - t1)) + a3 * ((t - t1) / (t3 - t1));
    b1 * ((t2 - t) / (t2 - t1)) + b2 * ((t - t1) / (t2 - t1))
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

    fn square_waypoints() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -10.0),
            Vec3::new(-10.0, 0.0, 0.0),
        ]
    }

    #[test]
    fn path_is_terrain_locked() {
        let terrain = flat_terrain();
        let path = build_path(&square_waypoints(), false, &terrain, 0.5);
        assert!(path.points.len() >= MIN_SAMPLES);
        for p in &path.points {
            assert!((p.length() - 10.5).abs() < 1e-4);
        }
    }

    #[test]
    fn spline_passes_near_waypoints() {
        let terrain = flat_terrain();
        let waypoints = square_waypoints();
        let path = build_path(&waypoints, false, &terrain, 0.5);
        for (w, &idx) in waypoints.iter().zip(&path.segment_indices) {
            let projected = terrain.surface_point(*w, 0.5);
            assert!(path.points[idx].distance(projected) < 0.5);
        }
    }

    #[test]
    fn segment_indices_are_monotone() {
        let terrain = flat_terrain();
        let path = build_path(&square_waypoints(), false, &terrain, 0.5);
        for pair in path.segment_indices.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        // Open path ends on the last waypoint.
        assert_eq!(
            *path.segment_indices.last().unwrap(),
            path.points.len() - 1
        );
    }

    #[test]
    fn closed_path_wraps_without_duplicate_endpoint() {
        let terrain = flat_terrain();
        let path = build_path(&square_waypoints(), true, &terrain, 0.5);
        let first = path.points[0];
        let last = *path.points.last().unwrap();
        // Last sample approaches but does not duplicate the first.
        assert!(first.distance(last) > 1e-3);
        assert!(first.distance(last) < 2.0);
    }

    #[test]
    fn rejoin_biases_forward_of_nearest_point() {
        let terrain = flat_terrain();
        let path = build_path(&square_waypoints(), false, &terrain, 0.5);
        let pos = path.points[40] + Vec3::new(0.5, 0.0, 0.0);
        let dir = (path.points[41] - path.points[40]).normalize();
        let plan = plan_rejoin(pos, dir, &path.points, false, &terrain, 0.5).unwrap();
        let rejoin_index = match plan {
            Rejoin::Arc { rejoin_index, .. } | Rejoin::Direct { rejoin_index } => rejoin_index,
        };
        assert!(rejoin_index > 40);
    }

    #[test]
    fn rejoin_arc_rejected_when_crossing_water() {
        // Flood the whole world; any arc sample is submerged.
        let terrain = TerrainOracle::new(&InitialConfig {
            base_radius: 10.0,
            terrain_amplitude: 0.0,
            water_level: 0.5,
            ..Default::default()
        });
        let path = build_path(&square_waypoints(), false, &terrain, 0.5);
        let pos = terrain.surface_point(Vec3::new(1.0, 1.0, 10.0), 0.5);
        let plan = plan_rejoin(pos, Vec3::X, &path.points, false, &terrain, 0.5).unwrap();
        assert!(matches!(plan, Rejoin::Direct { .. }));
    }

    #[test]
    fn rejoin_arc_keeps_tangent_continuity() {
        let terrain = flat_terrain();
        let path = build_path(&square_waypoints(), false, &terrain, 0.5);
        let pos = path.points[50] + Vec3::new(1.5, 0.0, 0.0);
        let dir = (path.points[51] - path.points[50]).normalize();
        let plan = plan_rejoin(pos, dir, &path.points, false, &terrain, 0.5).unwrap();
        if let Rejoin::Arc { points, .. } = plan {
            assert!(points.len() >= 8);
            // First arc step leaves roughly along the travel direction.
            let first_step = (points[0] - pos).normalize();
            assert!(first_step.dot(dir) > 0.0);
        } else {
            panic!("expected an arc on dry terrain");
        }
    }
}
