// SPDX-License-Identifier: CEPL-1.0
//! Small stateless math helpers. Randomness always comes from a caller-owned
//! [`rand::Rng`].

use std::f32::consts::PI;

use glam::{Mat4, Vec3};
use rand::Rng;

/// Uniform float in `[0, 1)`.
pub fn rand_f<R: Rng>(rng: &mut R) -> f32 {
    rng.gen::<f32>()
}

/// Uniform float in `[a, b)`.
pub fn rand_range<R: Rng>(rng: &mut R, a: f32, b: f32) -> f32 {
    a + rand_f(rng) * (b - a)
}

/// Uniform integer in `[a, b]`.
pub fn rand_int<R: Rng>(rng: &mut R, a: i32, b: i32) -> i32 {
    rng.gen_range(a..=b)
}

/// Polar angle of the point `(x, y)` in `[0, 2π)`.
pub fn angle_from_xy(x: f32, y: f32) -> f32 {
    if x >= 0.0 {
        // Quadrants I and IV: atan2 is in [-π/2, π/2].
        let theta = y.atan2(x);
        if theta < 0.0 {
            theta + 2.0 * PI
        } else {
            theta
        }
    } else {
        y.atan2(x) + PI
    }
}

pub fn spherical_to_cartesian(radius: f32, theta: f32, phi: f32) -> Vec3 {
    Vec3::new(
        radius * phi.sin() * theta.cos(),
        radius * phi.cos(),
        radius * phi.sin() * theta.sin(),
    )
}

/// Inverse-transpose for transforming normals; translation is ignored.
pub fn inverse_transpose(m: Mat4) -> Mat4 {
    let mut a = m;
    a.w_axis = glam::Vec4::W;
    a.inverse().transpose()
}

/// Uniformly distributed unit vector.
pub fn rand_unit_vec3<R: Rng>(rng: &mut R) -> Vec3 {
    loop {
        let v = rand_cube_point(rng);
        // Rejecting points outside the unit sphere keeps the distribution
        // from clumping toward the cube corners.
        let len_sq = v.length_squared();
        if len_sq > 1.0 || len_sq < 1e-8 {
            continue;
        }
        return v.normalize();
    }
}

/// Unit vector in the hemisphere around `n`.
pub fn rand_hemisphere_unit_vec3<R: Rng>(rng: &mut R, n: Vec3) -> Vec3 {
    loop {
        let v = rand_cube_point(rng);
        let len_sq = v.length_squared();
        if len_sq > 1.0 || len_sq < 1e-8 {
            continue;
        }
        if n.dot(v) < 0.0 {
            continue;
        }
        return v.normalize();
    }
}

fn rand_cube_point<R: Rng>(rng: &mut R) -> Vec3 {
    Vec3::new(
        rand_range(rng, -1.0, 1.0),
        rand_range(rng, -1.0, 1.0),
        rand_range(rng, -1.0, 1.0),
    )
}
