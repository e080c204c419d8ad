//! Transient environmental entities: meteors, pickups and fire zones
//!
//! Meteors fall on a timer, and what they leave behind depends on their
//! kind: a pickup-bearing meteor drops a collectible, a hazard meteor
//! ignites a shrinking damage-over-time zone. All three are created and
//! destroyed by the arena tick; this module holds the types and spawn
//! rules.

use glam::Vec3;
use rand::Rng;

use super::geom;
use super::motion::PLANET_RADIUS;
use crate::ws::protocol::PickupPayload;

/// Probability a meteor carries a pickup (otherwise it is a hazard)
pub const METEOR_PICKUP_PROB: f64 = 0.6;
/// Altitude above the planet surface where meteors appear
pub const METEOR_SPAWN_ALTITUDE: f32 = 25.0;
/// Seconds between meteor spawns (randomized in this range)
pub const METEOR_INTERVAL: std::ops::Range<f64> = 6.0..8.0;
/// Fall speed range
const METEOR_SPEED: std::ops::Range<f32> = 12.0..16.0;
/// Seconds from spawn until impact (randomized)
const METEOR_FUSE: std::ops::Range<f64> = 1.2..1.6;

/// Fire zone damage per second to players inside the radius
pub const FIRE_DPS: f32 = 15.0;
/// Total fire zone lifetime (seconds)
pub const FIRE_ZONE_DURATION: f32 = 7.0;
/// No damage or shrinking during this initial window (seconds)
pub const FIRE_ZONE_GRACE: f32 = 0.5;
/// Initial fire zone radius
pub const FIRE_ZONE_RADIUS: f32 = 6.0;
/// Radius shrink rate (units per second)
pub const FIRE_ZONE_SHRINK: f32 = 0.5;

/// Seconds before an uncollected pickup despawns
pub const PICKUP_TTL: f64 = 20.0;
/// Score granted on collection
pub const PICKUP_SCORE: u32 = 25;
/// Collection distance (craft hit radius plus a grab margin)
pub const PICKUP_GRAB_RADIUS: f32 = super::combat::PLAYER_RADIUS + 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteorKind {
    /// Leaves a collectible pickup at the impact point
    Pickup,
    /// Ignites a fire zone at the impact point
    Hazard,
}

#[derive(Debug, Clone)]
pub struct Meteor {
    pub id: u32,
    pub kind: MeteorKind,
    pub pos: Vec3,
    pub vel: Vec3,
    pub target: Vec3,
    pub impact_at: f64,
}

impl Meteor {
    /// Roll a new meteor aimed at a random surface point.
    pub fn spawn(id: u32, now: f64, rng: &mut impl Rng) -> Self {
        let kind = if rng.gen_bool(METEOR_PICKUP_PROB) {
            MeteorKind::Pickup
        } else {
            MeteorKind::Hazard
        };
        let target = geom::random_unit(rng) * PLANET_RADIUS;
        let pos = geom::normalize_or(target, Vec3::Z) * (PLANET_RADIUS + METEOR_SPAWN_ALTITUDE);
        let vel = geom::normalize_or(target - pos, -Vec3::Z) * rng.gen_range(METEOR_SPEED);
        Self {
            id,
            kind,
            pos,
            vel,
            target,
            impact_at: now + rng.gen_range(METEOR_FUSE),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pickup {
    pub id: u32,
    pub payload: PickupPayload,
    pub pos: Vec3,
    pub expires_at: f64,
}

impl Pickup {
    /// Drop a pickup where a meteor landed.
    pub fn from_impact(id: u32, target: Vec3, now: f64, rng: &mut impl Rng) -> Self {
        let payload = if rng.gen_bool(0.5) {
            PickupPayload::Rocket
        } else {
            PickupPayload::Shotgun
        };
        Self {
            id,
            payload,
            pos: target,
            expires_at: now + PICKUP_TTL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FireZone {
    pub id: u32,
    pub center: Vec3,
    pub radius: f32,
    pub start: f64,
    pub duration: f32,
    pub shrink: f32,
}

impl FireZone {
    /// Ignite a zone where a hazard meteor landed, pinned just above the
    /// surface.
    pub fn ignite(id: u32, target: Vec3, now: f64) -> Self {
        Self {
            id,
            center: geom::normalize_or(target, Vec3::Z) * (PLANET_RADIUS + 0.05),
            radius: FIRE_ZONE_RADIUS,
            start: now,
            duration: FIRE_ZONE_DURATION,
            shrink: FIRE_ZONE_SHRINK,
        }
    }

    /// Remaining lifetime at `now`, for snapshots.
    pub fn remaining(&self, now: f64) -> f32 {
        (self.duration - (now - self.start) as f32).max(0.0)
    }
}
