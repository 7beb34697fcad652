// src/math.rs
//! Small numeric helpers shared by objects, actors and linksets.

use glam::{Quat, Vec3};

/// Tolerance used when deciding a vector or scalar is "zero".
pub const EPSILON: f32 = 1.0e-4;

#[inline(always)]
pub fn is_finite_vec(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[inline(always)]
pub fn is_finite_quat(q: Quat) -> bool {
    q.x.is_finite() && q.y.is_finite() && q.z.is_finite() && q.w.is_finite()
}

#[inline(always)]
pub fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

#[inline(always)]
pub fn approx_eq_vec(a: Vec3, b: Vec3, eps: f32) -> bool {
    (a - b).abs().max_element() <= eps
}

/// Rotations are equal if they describe the same orientation (q and -q included).
#[inline]
pub fn approx_eq_quat(a: Quat, b: Quat, eps: f32) -> bool {
    a.dot(b).abs() >= 1.0 - eps
}

/// Normalize a rotation, falling back to identity for degenerate input.
#[inline]
pub fn sanitize_quat(q: Quat) -> Quat {
    let len = q.length();
    if !len.is_finite() || len < EPSILON {
        Quat::IDENTITY
    } else {
        q / len
    }
}

/// Mass-weighted center of a set of `(position, mass)` members.
///
/// If every member is massless the plain geometric average is returned, so a
/// linkset of phantoms still has a sensible origin. Empty input yields zero.
pub fn center_of_mass<I>(members: I) -> Vec3
where
    I: IntoIterator<Item = (Vec3, f32)>,
{
    let mut weighted = Vec3::ZERO;
    let mut plain = Vec3::ZERO;
    let mut total_mass = 0.0;
    let mut count = 0usize;

    for (pos, mass) in members {
        weighted += pos * mass;
        plain += pos;
        total_mass += mass;
        count += 1;
    }

    if total_mass > EPSILON {
        weighted / total_mass
    } else if count > 0 {
        plain / count as f32
    } else {
        Vec3::ZERO
    }
}

/// Clamp the length of `v` to `max`.
#[inline]
pub fn clamp_length(v: Vec3, max: f32) -> Vec3 {
    let len = v.length();
    if len > max && len > 0.0 {
        v * (max / len)
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_mass_of_symmetric_members_is_origin() {
        let com = center_of_mass([
            (Vec3::ZERO, 10.0),
            (Vec3::new(2.0, 0.0, 0.0), 5.0),
            (Vec3::new(-2.0, 0.0, 0.0), 5.0),
        ]);
        assert!(approx_eq_vec(com, Vec3::ZERO, 1e-6));
    }

    #[test]
    fn center_of_mass_after_losing_a_member() {
        let com = center_of_mass([(Vec3::ZERO, 10.0), (Vec3::new(-2.0, 0.0, 0.0), 5.0)]);
        assert!(approx_eq_vec(com, Vec3::new(-2.0 / 3.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn massless_members_average_geometrically() {
        let com = center_of_mass([(Vec3::new(1.0, 0.0, 0.0), 0.0), (Vec3::new(3.0, 0.0, 0.0), 0.0)]);
        assert!(approx_eq_vec(com, Vec3::new(2.0, 0.0, 0.0), 1e-6));
        assert_eq!(center_of_mass(std::iter::empty()), Vec3::ZERO);
    }

    #[test]
    fn degenerate_rotation_becomes_identity() {
        assert_eq!(sanitize_quat(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)), Quat::IDENTITY);
        assert!(approx_eq_quat(sanitize_quat(Quat::from_xyzw(0.0, 0.0, 0.0, -2.0)), Quat::IDENTITY, 1e-6));
    }
}
