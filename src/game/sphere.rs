//! Spherical motion math: great-circle stepping, parallel transport of
//! orientation frames, and tangent-plane bases.
//!
//! Conventions: a unit's local +Y axis is the outward sphere normal at its
//! position, local +Z is its forward direction. All directions handed to
//! these functions are expected to be finite; callers guard oracle output.

use bevy::prelude::*;

/// Deterministic orthonormal tangent pair for a given outward normal.
pub fn tangent_basis(normal: Vec3) -> (Vec3, Vec3) {
    let t = normal.any_orthonormal_vector();
    (t, normal.cross(t))
}

/// Remove the component of `v` along `normal`.
pub fn project_to_tangent(v: Vec3, normal: Vec3) -> Vec3 {
    v - normal * v.dot(normal)
}

/// Step `dist` meters along the great circle through `pos` in direction `dir`.
///
/// `dir` is projected onto the tangent plane first; the returned direction is
/// the transported tangent at the new position. Returns the inputs unchanged
/// when the tangential component of `dir` vanishes.
pub fn move_along_great_circle(pos: Vec3, dir: Vec3, dist: f32, radius: f32) -> (Vec3, Vec3) {
    let n = pos.normalize();
    let t = project_to_tangent(dir, n);
    let t_len = t.length();
    if t_len <= 1e-6 || radius <= 1e-6 {
        return (pos, dir);
    }
    let t = t / t_len;
    let axis = n.cross(t);
    let rot = Quat::from_axis_angle(axis, dist / radius);
    (rot * pos, rot * t)
}

/// Transport a heading frame from one surface normal to another.
///
/// The rotation that maps `old_normal` onto `new_normal` is left-applied to
/// the heading, preserving angles in the local tangent plane while the base
/// point slides along its arc.
pub fn parallel_transport(heading: Quat, old_normal: Vec3, new_normal: Vec3) -> Quat {
    (Quat::from_rotation_arc(old_normal, new_normal) * heading).normalize()
}

/// Orientation with local +Y on `up` and local +Z along `forward` projected
/// into the tangent plane. Falls back to an arbitrary tangent when `forward`
/// is (anti)parallel to `up`.
pub fn surface_alignment(forward: Vec3, up: Vec3) -> Quat {
    let f = project_to_tangent(forward, up);
    let f = if f.length_squared() > 1e-10 {
        f.normalize()
    } else {
        up.any_orthonormal_vector()
    };
    let right = up.cross(f);
    Quat::from_mat3(&Mat3::from_cols(right, up, f)).normalize()
}

/// Re-pin the local +Y axis of `heading` onto `normal` with the minimal
/// corrective rotation.
pub fn lock_vertical_axis(heading: Quat, normal: Vec3) -> Quat {
    let local_up = heading * Vec3::Y;
    (Quat::from_rotation_arc(local_up, normal) * heading).normalize()
}

/// dt-independent blend factor: applying it every `dt` converges like
/// applying `1 - base` once per second.
pub fn smoothing_factor(base: f32, dt: f32) -> f32 {
    1.0 - base.powf(dt)
}
