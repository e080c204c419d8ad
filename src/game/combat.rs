//! Combat helpers: hit-scan resolution, shot records, assist accounting
//!
//! Weapons here are instantaneous: the hit decision happens at fire time via
//! a ray test, and the [`Shot`] kept afterwards is purely a tracer for
//! clients to draw.

use std::collections::HashMap;

use glam::Vec3;

use super::ENVIRONMENT;
use crate::ws::protocol::PlayerId;

/// Seconds between shots
pub const FIRE_RATE: f32 = 0.25;
/// Damage per hit
pub const HIT_DAMAGE: f32 = 25.0;
/// Craft hit radius for the ray test
pub const PLAYER_RADIUS: f32 = 1.2;
/// Maximum hit-scan range
pub const FIRE_RANGE: f32 = 40.0;
/// Ray origin offset ahead of the craft along its heading
pub const MUZZLE_OFFSET: f32 = 1.5;
/// Tracer lifetime (seconds)
pub const SHOT_TTL: f32 = 0.22;
/// Tracer visual length
pub const SHOT_LENGTH: f32 = 18.0;

/// Score for a kill
pub const KILL_SCORE: u32 = 100;
/// Score for an assist
pub const ASSIST_SCORE: u32 = 50;
/// Cumulative damage needed to earn an assist
pub const ASSIST_THRESHOLD: f32 = 25.0;

/// Cosmetic tracer record; carries no hit information.
#[derive(Debug, Clone)]
pub struct Shot {
    pub id: u32,
    pub owner: PlayerId,
    pub origin: Vec3,
    pub dir: Vec3,
    pub length: f32,
    pub ttl: f32,
}

/// Resolve a hit-scan ray against candidate targets.
///
/// A candidate is hit when its perpendicular distance to the ray is within
/// [`PLAYER_RADIUS`] and its projection along `dir` lies in `[0, range]`.
/// Among qualifying candidates the one nearest along the ray wins. The
/// caller filters out the shooter and dead players.
pub fn hit_scan<I>(origin: Vec3, dir: Vec3, range: f32, candidates: I) -> Option<PlayerId>
where
    I: IntoIterator<Item = (PlayerId, Vec3)>,
{
    let mut best: Option<(PlayerId, f32)> = None;
    for (id, pos) in candidates {
        let to_target = pos - origin;
        let along = to_target.dot(dir);
        if along < 0.0 || along > range {
            continue;
        }
        let closest = origin + dir * along;
        if pos.distance(closest) > PLAYER_RADIUS {
            continue;
        }
        if best.map_or(true, |(_, best_along)| along < best_along) {
            best = Some((id, along));
        }
    }
    best.map(|(id, _)| id)
}

/// Player ids owed assist score for a kill: contributors other than the
/// killer with cumulative damage at or above [`ASSIST_THRESHOLD`].
/// Environmental damage (id 0) never earns assists.
pub fn assist_ids(contrib: &HashMap<PlayerId, f32>, killer: PlayerId) -> Vec<PlayerId> {
    let mut ids: Vec<PlayerId> = contrib
        .iter()
        .filter(|(id, dmg)| **id != killer && **id != ENVIRONMENT && **dmg >= ASSIST_THRESHOLD)
        .map(|(id, _)| *id)
        .collect();
    ids.sort_unstable();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_scan_picks_target_on_ray() {
        let hit = hit_scan(
            Vec3::ZERO,
            Vec3::X,
            FIRE_RANGE,
            [(2, Vec3::new(10.0, 0.0, 0.0))],
        );
        assert_eq!(hit, Some(2));
    }

    #[test]
    fn hit_scan_prefers_nearest_along_ray() {
        let hit = hit_scan(
            Vec3::ZERO,
            Vec3::X,
            FIRE_RANGE,
            [
                (2, Vec3::new(30.0, 0.5, 0.0)),
                (3, Vec3::new(12.0, -0.8, 0.0)),
                (4, Vec3::new(20.0, 0.0, 0.0)),
            ],
        );
        assert_eq!(hit, Some(3));
    }

    #[test]
    fn hit_scan_rejects_targets_outside_radius() {
        let hit = hit_scan(
            Vec3::ZERO,
            Vec3::X,
            FIRE_RANGE,
            [(2, Vec3::new(10.0, PLAYER_RADIUS + 0.1, 0.0))],
        );
        assert_eq!(hit, None);
    }

    #[test]
    fn hit_scan_rejects_targets_beyond_range() {
        let hit = hit_scan(
            Vec3::ZERO,
            Vec3::X,
            FIRE_RANGE,
            [(2, Vec3::new(FIRE_RANGE + 1.0, 0.0, 0.0))],
        );
        assert_eq!(hit, None);
    }

    #[test]
    fn hit_scan_rejects_targets_behind_origin() {
        let hit = hit_scan(
            Vec3::ZERO,
            Vec3::X,
            FIRE_RANGE,
            [(2, Vec3::new(-5.0, 0.0, 0.0))],
        );
        assert_eq!(hit, None);
    }

    #[test]
    fn assists_require_threshold_and_skip_killer_and_environment() {
        let mut contrib = HashMap::new();
        contrib.insert(1, 75.0); // killer
        contrib.insert(2, 25.0); // assist
        contrib.insert(3, 24.9); // below threshold
        contrib.insert(ENVIRONMENT, 60.0); // fire zone damage
        assert_eq!(assist_ids(&contrib, 1), vec![2]);
    }
}
