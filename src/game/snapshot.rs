//! Snapshot cadence and wire-format sampling
//!
//! The simulation ticks at full rate regardless of broadcast rate; the
//! builder gates serialization on wall-clock spacing so bandwidth stays
//! bounded while the arena keeps simulating every tick.

use crate::util::time::snapshot_interval;
use crate::ws::protocol::{
    FireZoneSnapshot, MeteorSnapshot, PickupSnapshot, PlayerSnapshot, ServerMsg, ShotSnapshot,
    Snapshot,
};

use super::arena::ArenaState;

/// Decides when the next snapshot goes out
pub struct SnapshotBuilder {
    interval: f64,
    last_sent: f64,
    force: bool,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::with_interval(snapshot_interval())
    }

    pub fn with_interval(interval: f64) -> Self {
        Self {
            interval,
            last_sent: 0.0,
            force: false,
        }
    }

    /// Check if enough wall-clock time has passed (or a send was forced);
    /// marks the snapshot as sent when returning true.
    pub fn should_send(&mut self, now: f64) -> bool {
        if self.force || now - self.last_sent >= self.interval {
            self.force = false;
            self.last_sent = now;
            true
        } else {
            false
        }
    }

    /// Send on the next check regardless of elapsed time (used after round
    /// resets so clients see the fresh state promptly)
    pub fn force_next(&mut self) {
        self.force = true;
    }

    /// Sample the full entity set into a wire snapshot
    pub fn build(&self, state: &ArenaState, now: f64) -> ServerMsg {
        ServerMsg::Snap(Snapshot {
            time: now,
            players: state
                .players
                .values()
                .map(|p| PlayerSnapshot {
                    id: p.id,
                    pos: p.kin.pos,
                    vel: p.kin.vel,
                    heading: p.kin.heading,
                    yaw: p.kin.yaw,
                    yaw_vel: p.kin.yaw_vel,
                    hp: p.hp,
                    score: p.score,
                    alive: p.alive,
                })
                .collect(),
            meteors: state
                .meteors
                .iter()
                .map(|m| MeteorSnapshot {
                    id: m.id,
                    pos: m.pos,
                    target: m.target,
                })
                .collect(),
            pickups: state
                .pickups
                .iter()
                .map(|p| PickupSnapshot {
                    id: p.id,
                    pos: p.pos,
                    payload: p.payload,
                })
                .collect(),
            fire: state
                .fire_zones
                .iter()
                .map(|f| FireZoneSnapshot {
                    id: f.id,
                    center: f.center,
                    radius: f.radius,
                    ttl: f.remaining(now),
                })
                .collect(),
            shots: state
                .shots
                .iter()
                .map(|s| ShotSnapshot {
                    id: s.id,
                    owner: s.owner,
                    origin: s.origin,
                    dir: s.dir,
                    length: s.length,
                    ttl: s.ttl.max(0.0),
                })
                .collect(),
            match_info: state.match_info,
        })
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
