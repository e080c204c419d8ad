//! Remote player interpolation
//!
//! Remote craft are never predicted, only smoothed: each snapshot sets a
//! target, and every frame the rendered state eases toward it. Yaw blends
//! along the shortest angular path so a craft crossing the +/-pi seam does
//! not spin the long way around.

use std::collections::HashMap;

use glam::Vec3;

use crate::game::geom;
use crate::ws::protocol::{PlayerId, PlayerSnapshot};

/// Approach rate; the per-frame factor is `min(1, APPROACH_RATE * dt)`
const APPROACH_RATE: f32 = 8.0;

/// Smoothed render state for one remote player
#[derive(Debug, Clone, Copy)]
pub struct RemoteState {
    pub pos: Vec3,
    pub heading: Vec3,
    pub yaw: f32,
    pub alive: bool,
    target_pos: Vec3,
    target_heading: Vec3,
    target_yaw: f32,
}

impl RemoteState {
    fn seeded(snap: &PlayerSnapshot) -> Self {
        Self {
            pos: snap.pos,
            heading: snap.heading,
            yaw: snap.yaw,
            alive: snap.alive,
            target_pos: snap.pos,
            target_heading: snap.heading,
            target_yaw: snap.yaw,
        }
    }
}

/// Smooths every non-local player between snapshots
#[derive(Default)]
pub struct Interpolator {
    states: HashMap<PlayerId, RemoteState>,
}

impl Interpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update targets from a snapshot; players absent from it are dropped.
    /// New players appear at their target instead of lerping in from
    /// somewhere stale.
    pub fn apply_snapshot(&mut self, players: &[PlayerSnapshot], local_id: PlayerId) {
        self.states
            .retain(|id, _| players.iter().any(|p| p.id == *id));
        for snap in players.iter().filter(|p| p.id != local_id) {
            match self.states.get_mut(&snap.id) {
                Some(state) => {
                    state.target_pos = snap.pos;
                    state.target_heading = snap.heading;
                    state.target_yaw = snap.yaw;
                    state.alive = snap.alive;
                }
                None => {
                    self.states.insert(snap.id, RemoteState::seeded(snap));
                }
            }
        }
    }

    /// Ease every remote craft toward its target
    pub fn frame(&mut self, dt: f32) {
        let t = (APPROACH_RATE * dt).min(1.0);
        for state in self.states.values_mut() {
            state.pos += (state.target_pos - state.pos) * t;
            state.yaw += geom::shortest_angle(state.yaw, state.target_yaw) * t;
            let blended = state.heading + (state.target_heading - state.heading) * t;
            state.heading = if blended.length_squared() < 1e-6 {
                geom::stable_tangent(geom::normalize_or(state.pos, Vec3::Z))
            } else {
                blended.normalize()
            };
        }
    }

    pub fn get(&self, id: PlayerId) -> Option<&RemoteState> {
        self.states.get(&id)
    }

    pub fn states(&self) -> impl Iterator<Item = (&PlayerId, &RemoteState)> {
        self.states.iter()
    }
}
