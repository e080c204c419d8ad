//! Sphere-surface geometry helpers
//!
//! Everything that moves in the arena lives on (or falls toward) a sphere,
//! so headings and velocities are tangent vectors that have to be re-projected
//! whenever the surface point changes. Degenerate inputs (zero-length vectors,
//! a heading swallowed by the normal) resolve to documented fallbacks instead
//! of producing NaN.

use glam::Vec3;
use rand::Rng;

/// Rotate `vec` about `axis` (unit length) by `angle` radians, via Rodrigues'
/// rotation formula.
pub fn rotate_about_axis(vec: Vec3, axis: Vec3, angle: f32) -> Vec3 {
    let (s, c) = angle.sin_cos();
    vec * c + axis.cross(vec) * s + axis * (axis.dot(vec) * (1.0 - c))
}

/// Project `vec` onto the tangent plane of `normal` (unit length).
pub fn tangent_project(vec: Vec3, normal: Vec3) -> Vec3 {
    vec - normal * vec.dot(normal)
}

/// Normalize `vec`, falling back to `fallback` if it is too short to carry a
/// direction.
pub fn normalize_or(vec: Vec3, fallback: Vec3) -> Vec3 {
    vec.try_normalize().unwrap_or(fallback)
}

/// A stable tangent direction at `normal`: the cross product with world-up,
/// or world-X when the normal is nearly parallel to up.
pub fn stable_tangent(normal: Vec3) -> Vec3 {
    let reference = if normal.y.abs() < 0.9 { Vec3::Y } else { Vec3::X };
    normalize_or(normal.cross(reference), Vec3::X)
}

/// Shortest signed angular difference from `from` to `to`, in (-pi, pi].
pub fn shortest_angle(from: f32, to: f32) -> f32 {
    let delta = to - from;
    delta.sin().atan2(delta.cos())
}

/// Uniformly distributed unit vector (a random point on the unit sphere).
pub fn random_unit(rng: &mut impl Rng) -> Vec3 {
    let theta = rng.gen_range(0.0..std::f32::consts::TAU);
    let z: f32 = rng.gen_range(-1.0..1.0);
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * theta.cos(), r * theta.sin(), z)
}

/// Spawn direction clustered around +Z with slight jitter, so craft begin
/// near the visual front of the planet without stacking exactly.
pub fn spawn_direction(rng: &mut impl Rng) -> Vec3 {
    let jitter = 0.05;
    normalize_or(
        Vec3::new(
            rng.gen_range(-jitter..jitter),
            rng.gen_range(-jitter..jitter),
            1.0 + rng.gen_range(-jitter..jitter * 0.5),
        ),
        Vec3::Z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn rotation_preserves_length_and_turns_quarter() {
        let rotated = rotate_about_axis(Vec3::X, Vec3::Z, std::f32::consts::FRAC_PI_2);
        assert_approx_eq!(rotated.length(), 1.0, 1e-5);
        assert_approx_eq!(rotated.x, 0.0, 1e-5);
        assert_approx_eq!(rotated.y, 1.0, 1e-5);
    }

    #[test]
    fn rotation_about_parallel_axis_is_identity() {
        let rotated = rotate_about_axis(Vec3::Z, Vec3::Z, 1.3);
        assert_approx_eq!(rotated.distance(Vec3::Z), 0.0, 1e-5);
    }

    #[test]
    fn tangent_projection_removes_normal_component() {
        let projected = tangent_project(Vec3::new(1.0, 2.0, 3.0), Vec3::Z);
        assert_approx_eq!(projected.z, 0.0, 1e-6);
        assert_approx_eq!(projected.x, 1.0, 1e-6);
        assert_approx_eq!(projected.y, 2.0, 1e-6);
    }

    #[test]
    fn normalize_falls_back_on_zero_vector() {
        assert_eq!(normalize_or(Vec3::ZERO, Vec3::Y), Vec3::Y);
        let n = normalize_or(Vec3::new(3.0, 0.0, 4.0), Vec3::Y);
        assert_approx_eq!(n.length(), 1.0, 1e-6);
    }

    #[test]
    fn stable_tangent_is_perpendicular() {
        for normal in [Vec3::Y, Vec3::Z, Vec3::new(0.1, 0.99, 0.0).normalize()] {
            let tangent = stable_tangent(normal);
            assert_approx_eq!(tangent.dot(normal), 0.0, 1e-5);
            assert_approx_eq!(tangent.length(), 1.0, 1e-5);
        }
    }

    #[test]
    fn shortest_angle_handles_wraparound() {
        let delta = shortest_angle(3.0, -3.0);
        assert!(delta > 0.0, "wraps forward through pi, got {delta}");
        assert!(delta < 0.5);
        assert_approx_eq!(shortest_angle(0.2, 0.5), 0.3, 1e-5);
    }

    #[test]
    fn random_unit_is_unit_length() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..32 {
            assert_approx_eq!(random_unit(&mut rng).length(), 1.0, 1e-5);
        }
    }
}
