//! Local player prediction and reconciliation
//!
//! The predictor owns a copy of the local player's state and advances it
//! every rendered frame with the same motion model the server runs, so
//! control feels instant regardless of latency. Authoritative snapshots are
//! blended in rather than applied, which hides small drift and still
//! converges quickly after a large desync such as a respawn.

use crate::game::geom;
use crate::game::motion::{self, Kinematics, Tuning};
use crate::game::TickInput;
use crate::ws::protocol::{PlayerId, PlayerSnapshot};

/// Frame steps are capped so a stalled tab or breakpoint cannot produce one
/// giant integration step
pub const MAX_FRAME_DT: f32 = 0.05;

/// Position error below this blends gently; above it, aggressively
const POS_ERROR_THRESHOLD: f32 = 0.5;
const POS_BLEND_NEAR: f32 = 0.05;
const POS_BLEND_FAR: f32 = 0.15;
const VEL_BLEND: f32 = 0.2;
const YAW_BLEND: f32 = 0.2;
const HEADING_BLEND: f32 = 0.25;

/// Locally simulated copy of the authoritative player record
#[derive(Debug, Clone, Copy)]
pub struct PredictedState {
    pub kin: Kinematics,
    pub hp: f32,
    pub score: u32,
    pub alive: bool,
}

/// Locally observable transitions derived from snapshot application,
/// emitted exactly once per transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalEvent {
    /// Hp dropped by this much since the previous snapshot
    Damaged(f32),
    Died,
    Respawned,
}

pub struct Predictor {
    player_id: PlayerId,
    tuning: Tuning,
    state: Option<PredictedState>,
    prev_hp: f32,
    was_alive: bool,
}

impl Predictor {
    /// `tuning` comes from the welcome message so prediction matches the
    /// server exactly.
    pub fn new(player_id: PlayerId, tuning: Tuning) -> Self {
        Self {
            player_id,
            tuning,
            state: None,
            prev_hp: 0.0,
            was_alive: false,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// The predicted state, once the first snapshot containing the local
    /// player has arrived
    pub fn state(&self) -> Option<&PredictedState> {
        self.state.as_ref()
    }

    /// Forget everything; the next snapshot re-seeds local state. Called
    /// after a reconnect, when whatever was predicted is stale.
    pub fn reset(&mut self) {
        self.state = None;
    }

    /// Advance the local craft one rendered frame with the current intent
    pub fn frame(&mut self, input: &TickInput, dt: f32) {
        let Some(state) = &mut self.state else {
            return;
        };
        motion::step(
            &mut state.kin,
            input.thrust as f32,
            input.turn as f32,
            dt.min(MAX_FRAME_DT),
            &self.tuning,
        );
    }

    /// Blend an authoritative snapshot into the local state. Must be called
    /// between frame steps, never during one.
    pub fn apply_snapshot(&mut self, players: &[PlayerSnapshot]) -> Vec<LocalEvent> {
        let Some(authoritative) = players.iter().find(|p| p.id == self.player_id) else {
            return Vec::new();
        };

        let Some(state) = &mut self.state else {
            // First sighting: adopt the server state wholesale
            self.state = Some(PredictedState {
                kin: Kinematics {
                    pos: authoritative.pos,
                    vel: authoritative.vel,
                    heading: authoritative.heading,
                    yaw: authoritative.yaw,
                    yaw_vel: authoritative.yaw_vel,
                },
                hp: authoritative.hp,
                score: authoritative.score,
                alive: authoritative.alive,
            });
            self.prev_hp = authoritative.hp;
            self.was_alive = authoritative.alive;
            return Vec::new();
        };

        // Position: gentle for small drift, aggressive after real desync
        let error = authoritative.pos - state.kin.pos;
        let pos_blend = if error.length() < POS_ERROR_THRESHOLD {
            POS_BLEND_NEAR
        } else {
            POS_BLEND_FAR
        };
        state.kin.pos += error * pos_blend;

        state.kin.vel += (authoritative.vel - state.kin.vel) * VEL_BLEND;

        // Yaw corrects along the shortest angular path to avoid wrap snaps
        state.kin.yaw +=
            geom::shortest_angle(state.kin.yaw, authoritative.yaw) * YAW_BLEND;

        let blended =
            state.kin.heading + (authoritative.heading - state.kin.heading) * HEADING_BLEND;
        state.kin.heading = geom::normalize_or(blended, state.kin.heading);

        // Not continuously predicted; taken verbatim
        state.hp = authoritative.hp;
        state.score = authoritative.score;
        state.alive = authoritative.alive;

        let mut transitions = Vec::new();
        if authoritative.hp < self.prev_hp {
            transitions.push(LocalEvent::Damaged(self.prev_hp - authoritative.hp));
        }
        if self.was_alive && !authoritative.alive {
            transitions.push(LocalEvent::Died);
        }
        if !self.was_alive && authoritative.alive {
            transitions.push(LocalEvent::Respawned);
        }
        self.prev_hp = authoritative.hp;
        self.was_alive = authoritative.alive;
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use glam::Vec3;

    use crate::game::motion::{HOVER, PLANET_RADIUS};

    const SURFACE: f32 = PLANET_RADIUS + HOVER;

    fn snapshot_player(id: PlayerId, pos: Vec3) -> PlayerSnapshot {
        PlayerSnapshot {
            id,
            pos,
            vel: Vec3::ZERO,
            heading: Vec3::Y,
            yaw: 0.0,
            yaw_vel: 0.0,
            hp: 100.0,
            score: 0,
            alive: true,
        }
    }

    fn seeded_predictor() -> Predictor {
        let mut predictor = Predictor::new(1, Tuning::default());
        let events =
            predictor.apply_snapshot(&[snapshot_player(1, Vec3::new(SURFACE, 0.0, 0.0))]);
        assert!(events.is_empty(), "no transitions on the first snapshot");
        predictor
    }

    #[test]
    fn ignores_snapshots_without_local_player() {
        let mut predictor = Predictor::new(1, Tuning::default());
        predictor.apply_snapshot(&[snapshot_player(2, Vec3::new(SURFACE, 0.0, 0.0))]);
        assert!(predictor.state().is_none());
    }

    #[test]
    fn frame_runs_server_motion_model() {
        let mut predictor = seeded_predictor();
        let input = TickInput::from_wire(1, 1.0, 0.0, false, false);
        for _ in 0..35 {
            predictor.frame(&input, 1.0 / 35.0);
        }
        let state = predictor.state().unwrap();
        assert!(state.kin.vel.length() > 1.0, "thrust should build speed");
        assert_approx_eq!(state.kin.pos.length(), SURFACE, 1e-3);
    }

    #[test]
    fn frame_dt_is_capped() {
        let mut a = seeded_predictor();
        let mut b = seeded_predictor();
        let input = TickInput::from_wire(1, 1.0, 0.0, false, false);
        a.frame(&input, 10.0);
        b.frame(&input, MAX_FRAME_DT);
        assert_eq!(a.state().unwrap().kin, b.state().unwrap().kin);
    }

    #[test]
    fn small_error_blends_gently_and_converges() {
        let mut predictor = seeded_predictor();
        let start = predictor.state().unwrap().kin.pos;
        let authoritative = start + Vec3::new(0.0, 0.3, 0.0);

        predictor.apply_snapshot(&[snapshot_player(1, authoritative)]);
        let after = predictor.state().unwrap().kin.pos;

        let before_err = start.distance(authoritative);
        let after_err = after.distance(authoritative);
        assert!(after_err < before_err, "must move toward authority");
        assert!(after_err > 0.0, "gentle blend does not snap");
        assert_approx_eq!(after_err, before_err * (1.0 - 0.05), 1e-4);
    }

    #[test]
    fn large_error_blends_aggressively_without_overshoot() {
        let mut predictor = seeded_predictor();
        let start = predictor.state().unwrap().kin.pos;
        let authoritative = start + Vec3::new(0.0, 4.0, 0.0);

        let mut prev_err = start.distance(authoritative);
        assert_approx_eq!(prev_err, 4.0, 1e-5);
        for _ in 0..64 {
            predictor.apply_snapshot(&[snapshot_player(1, authoritative)]);
            let err = predictor.state().unwrap().kin.pos.distance(authoritative);
            assert!(err < prev_err, "each application converges");
            prev_err = err;
        }
        assert!(prev_err < 0.05, "repeated blending reaches authority");
    }

    #[test]
    fn first_application_uses_far_factor_beyond_threshold() {
        let mut predictor = seeded_predictor();
        let start = predictor.state().unwrap().kin.pos;
        let authoritative = start + Vec3::new(0.0, 1.0, 0.0);
        predictor.apply_snapshot(&[snapshot_player(1, authoritative)]);
        let err = predictor.state().unwrap().kin.pos.distance(authoritative);
        assert_approx_eq!(err, 1.0 - 0.15, 1e-4);
    }

    #[test]
    fn yaw_corrects_along_shortest_path() {
        let mut predictor = seeded_predictor();
        {
            let mut snap = snapshot_player(1, Vec3::new(SURFACE, 0.0, 0.0));
            snap.yaw = 3.1; // near +pi
            predictor.apply_snapshot(&[snap]);
        }
        // Force local yaw near -pi; server says near +pi. The correction
        // must go through pi, not the long way around zero.
        let before = -3.1;
        predictor.state.as_mut().unwrap().kin.yaw = before;
        let mut snap = snapshot_player(1, Vec3::new(SURFACE, 0.0, 0.0));
        snap.yaw = 3.1;
        predictor.apply_snapshot(&[snap]);
        let after = predictor.state().unwrap().kin.yaw;
        assert!(after < before, "wraps backward through -pi, got {after}");
    }

    #[test]
    fn hp_score_alive_are_adopted_verbatim() {
        let mut predictor = seeded_predictor();
        let mut snap = snapshot_player(1, Vec3::new(SURFACE, 0.0, 0.0));
        snap.hp = 75.0;
        snap.score = 225;
        let events = predictor.apply_snapshot(&[snap]);
        let state = predictor.state().unwrap();
        assert_eq!(state.hp, 75.0);
        assert_eq!(state.score, 225);
        assert_eq!(events, vec![LocalEvent::Damaged(25.0)]);
    }

    #[test]
    fn death_and_respawn_fire_exactly_once() {
        let mut predictor = seeded_predictor();

        let mut dead = snapshot_player(1, Vec3::new(SURFACE, 0.0, 0.0));
        dead.hp = 0.0;
        dead.alive = false;
        let events = predictor.apply_snapshot(&[dead]);
        assert!(events.contains(&LocalEvent::Died));

        // Same dead snapshot again: no repeat
        let events = predictor.apply_snapshot(&[dead]);
        assert!(events.is_empty());

        let alive = snapshot_player(1, Vec3::new(SURFACE, 0.0, 0.0));
        let events = predictor.apply_snapshot(&[alive]);
        assert!(events.contains(&LocalEvent::Respawned));
    }

    #[test]
    fn reset_discards_prediction_until_next_snapshot() {
        let mut predictor = seeded_predictor();
        predictor.reset();
        assert!(predictor.state().is_none());
        predictor.frame(&TickInput::default(), 0.016);
        assert!(predictor.state().is_none());

        predictor.apply_snapshot(&[snapshot_player(1, Vec3::new(0.0, SURFACE, 0.0))]);
        let state = predictor.state().unwrap();
        assert_approx_eq!(state.kin.pos.y, SURFACE, 1e-5);
    }
}
