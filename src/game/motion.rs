//! Craft motion on the planet surface
//!
//! [`step`] is the single source of truth for how a craft moves: the server
//! tick and the client predictor both call it, so the two can only diverge
//! by network latency, never by drifting implementations.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::geom;

/// Planet radius
pub const PLANET_RADIUS: f32 = 30.0;
/// Craft hover height above the surface
pub const HOVER: f32 = 0.6;

/// Movement tuning, sent to clients in the welcome message so prediction
/// runs with the exact server parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tuning {
    /// Speed clamp
    pub max_speed: f32,
    /// Thrust acceleration
    pub thrust: f32,
    /// Target yaw rate at full turn input (radians per second)
    pub turn_speed: f32,
    /// Exponential approach rate toward the target yaw rate
    pub turn_smooth: f32,
    /// Linear drag coefficient
    pub drag: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            max_speed: 60.0,
            thrust: 90.0,
            turn_speed: 2.5,
            turn_smooth: 12.0,
            drag: 4.0,
        }
    }
}

/// The kinematic portion of a craft: everything [`step`] reads and writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    /// Point on the sphere at radius `PLANET_RADIUS + HOVER`
    pub pos: Vec3,
    /// Tangent-plane velocity
    pub vel: Vec3,
    /// Unit tangent facing direction
    pub heading: Vec3,
    /// Accumulated yaw angle (smoothing only; heading is authoritative)
    pub yaw: f32,
    /// Smoothed yaw rate
    pub yaw_vel: f32,
}

impl Kinematics {
    /// A craft at rest on the surface along `dir`, facing a stable tangent.
    pub fn at_spawn(dir: Vec3) -> Self {
        let normal = geom::normalize_or(dir, Vec3::Z);
        Self {
            pos: normal * (PLANET_RADIUS + HOVER),
            vel: Vec3::ZERO,
            heading: geom::stable_tangent(normal),
            yaw: 0.0,
            yaw_vel: 0.0,
        }
    }
}

/// Advance a craft by `dt` seconds under `thrust` and `turn` inputs
/// (each in [-1, 1]).
///
/// Invariants on return: `|pos| == PLANET_RADIUS + HOVER`, heading is unit
/// length and tangent to the surface normal at `pos`, `|vel| <= max_speed`.
pub fn step(kin: &mut Kinematics, thrust: f32, turn: f32, dt: f32, tuning: &Tuning) {
    let normal = geom::normalize_or(kin.pos, Vec3::Z);

    // Smooth turning
    let target_yaw_vel = turn * tuning.turn_speed;
    let blend = (tuning.turn_smooth * dt).min(1.0);
    kin.yaw_vel += (target_yaw_vel - kin.yaw_vel) * blend;
    let d_yaw = kin.yaw_vel * dt;
    kin.yaw += d_yaw;

    // Rotate heading about the current normal; stays tangent to the old plane
    kin.heading = geom::normalize_or(
        geom::rotate_about_axis(kin.heading, normal, d_yaw),
        kin.heading,
    );

    // Thrust along heading, then constrain velocity to the old tangent plane
    kin.vel += kin.heading * (thrust * tuning.thrust * dt);
    kin.vel = geom::tangent_project(kin.vel, normal);
    kin.vel *= (1.0 - tuning.drag * dt).max(0.0);
    let speed = kin.vel.length();
    if speed > tuning.max_speed {
        kin.vel *= tuning.max_speed / speed;
    }

    // Integrate and snap back to the surface
    kin.pos += kin.vel * dt;
    let new_normal = geom::normalize_or(kin.pos, Vec3::Z);
    kin.pos = new_normal * (PLANET_RADIUS + HOVER);

    // Parallel-transport heading onto the new tangent plane
    let transported = geom::tangent_project(kin.heading, new_normal);
    kin.heading = if transported.length_squared() < 1e-12 {
        geom::stable_tangent(new_normal)
    } else {
        transported.normalize()
    };
}
