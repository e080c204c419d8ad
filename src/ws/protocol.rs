//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::motion::Tuning;

/// Stable per-connection player identity, allocated by the arena.
/// Id 0 is reserved for environmental damage attribution.
pub type PlayerId = u32;

/// Pickup payload kinds dropped by meteors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickupPayload {
    Rocket,
    Shotgun,
}

/// Round lifecycle state as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    /// No round running (empty arena)
    Idle,
    /// Round in progress
    Active,
    /// Round just completed
    Post,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Establish player identity; the server answers with a welcome
    Join {
        #[serde(default)]
        name: String,
    },

    /// Latest input intent (last one received before a tick wins).
    /// `thrust` and `turn` arrive as raw numbers and are coerced to sign;
    /// `dt` is the client frame delta and is advisory only.
    Input {
        #[serde(default)]
        seq: u32,
        thrust: f32,
        turn: f32,
        #[serde(default)]
        fire: bool,
        #[serde(default)]
        power: bool,
        #[serde(default)]
        dt: f32,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Sent once after a successful join
    Welcome {
        player_id: PlayerId,
        #[serde(rename = "match")]
        match_info: MatchInfo,
        planet: PlanetInfo,
        tuning: Tuning,
    },

    /// Periodic full state broadcast, identical for every client
    Snap(Snapshot),

    /// Point-in-time notification, best-effort delivery
    Event(GameEvent),
}

/// Planet parameters a client needs before the first snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanetInfo {
    pub radius: f32,
}

/// Round bookkeeping shared with clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub state: RoundPhase,
    /// Seconds until the round timer expires
    pub time_left: f32,
    /// Score that ends the round immediately
    pub score_cap: u32,
    pub round: u32,
    /// Seconds since the round started
    pub round_time: f32,
}

/// Full entity sample broadcast at the snapshot rate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Server clock at serialization time (Unix seconds)
    pub time: f64,
    pub players: Vec<PlayerSnapshot>,
    pub meteors: Vec<MeteorSnapshot>,
    pub pickups: Vec<PickupSnapshot>,
    pub fire: Vec<FireZoneSnapshot>,
    pub shots: Vec<ShotSnapshot>,
    #[serde(rename = "match")]
    pub match_info: MatchInfo,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub pos: Vec3,
    pub vel: Vec3,
    pub heading: Vec3,
    pub yaw: f32,
    pub yaw_vel: f32,
    pub hp: f32,
    pub score: u32,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MeteorSnapshot {
    pub id: u32,
    pub pos: Vec3,
    pub target: Vec3,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PickupSnapshot {
    pub id: u32,
    pub pos: Vec3,
    pub payload: PickupPayload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FireZoneSnapshot {
    pub id: u32,
    pub center: Vec3,
    pub radius: f32,
    pub ttl: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShotSnapshot {
    pub id: u32,
    pub owner: PlayerId,
    pub origin: Vec3,
    pub dir: Vec3,
    pub length: f32,
    pub ttl: f32,
}

/// Domain events (kills, respawns, impacts, round transitions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GameEvent {
    /// `killer` is 0 when the environment did the killing
    Kill {
        killer: PlayerId,
        victim: PlayerId,
    },

    Respawn {
        player: PlayerId,
    },

    Pickup {
        player: PlayerId,
        payload: PickupPayload,
    },

    /// A meteor reached the surface; the outcome tells clients what it left
    MeteorImpact {
        id: u32,
        outcome: ImpactOutcome,
    },

    /// Round over: `winner` is `None` on a tie
    RoundEnd {
        winner: Option<PlayerId>,
        round: u32,
        scores: Vec<ScoreEntry>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum ImpactOutcome {
    Pickup { payload: PickupPayload },
    Fire { fire: FireZoneSnapshot },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub player_id: PlayerId,
    pub score: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn input_round_trips_with_defaults() {
        let json = r#"{"type":"input","thrust":1.0,"turn":-1.0}"#;
        let msg: ClientMsg = serde_json::from_str(json).unwrap();
        match msg {
            ClientMsg::Input {
                seq,
                thrust,
                turn,
                fire,
                power,
                dt,
            } => {
                assert_eq!(seq, 0);
                assert_eq!(thrust, 1.0);
                assert_eq!(turn, -1.0);
                assert!(!fire && !power);
                assert_eq!(dt, 0.0);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"input","thrust":"full","turn":0}"#)
            .is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"input","turn":0}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"warp","x":1}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>("not json").is_err());
    }

    #[test]
    fn welcome_round_trips() {
        let msg = ServerMsg::Welcome {
            player_id: 7,
            match_info: MatchInfo {
                state: RoundPhase::Active,
                time_left: 42.5,
                score_cap: 800,
                round: 3,
                round_time: 47.5,
            },
            planet: PlanetInfo { radius: 30.0 },
            tuning: Tuning::default(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"welcome""#));
        assert!(json.contains(r#""playerId":7"#));
        let back: ServerMsg = serde_json::from_str(&json).unwrap();
        match back {
            ServerMsg::Welcome {
                player_id,
                match_info,
                planet,
                tuning,
            } => {
                assert_eq!(player_id, 7);
                assert_eq!(match_info.round, 3);
                assert_eq!(match_info.state, RoundPhase::Active);
                assert_approx_eq!(planet.radius, 30.0);
                assert_eq!(tuning, Tuning::default());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn snapshot_round_trips_every_entity_kind() {
        let msg = ServerMsg::Snap(Snapshot {
            time: 1234.5,
            players: vec![PlayerSnapshot {
                id: 1,
                pos: Vec3::new(0.0, 0.0, 30.6),
                vel: Vec3::new(1.5, -2.5, 0.0),
                heading: Vec3::X,
                yaw: 0.75,
                yaw_vel: -0.1,
                hp: 75.0,
                score: 225,
                alive: true,
            }],
            meteors: vec![MeteorSnapshot {
                id: 9,
                pos: Vec3::new(0.0, 55.0, 0.0),
                target: Vec3::new(0.0, 30.0, 0.0),
            }],
            pickups: vec![PickupSnapshot {
                id: 10,
                pos: Vec3::new(30.0, 0.0, 0.0),
                payload: PickupPayload::Rocket,
            }],
            fire: vec![FireZoneSnapshot {
                id: 11,
                center: Vec3::new(0.0, -30.05, 0.0),
                radius: 4.5,
                ttl: 3.25,
            }],
            shots: vec![ShotSnapshot {
                id: 12,
                owner: 1,
                origin: Vec3::new(0.0, 0.0, 30.6),
                dir: Vec3::X,
                length: 18.0,
                ttl: 0.22,
            }],
            match_info: MatchInfo {
                state: RoundPhase::Active,
                time_left: 10.0,
                score_cap: 800,
                round: 1,
                round_time: 80.0,
            },
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"snap""#));
        // Positions serialize as plain [x, y, z] arrays
        assert!(json.contains(r#""pos":[0.0,0.0,30.6]"#) || json.contains(r#""pos":[0,0,30.6]"#));
        let back: ServerMsg = serde_json::from_str(&json).unwrap();
        let ServerMsg::Snap(snap) = back else {
            panic!("wrong variant");
        };
        assert_eq!(snap.players.len(), 1);
        assert_eq!(snap.players[0].score, 225);
        assert_approx_eq!(snap.players[0].pos.z, 30.6);
        assert_eq!(snap.meteors[0].id, 9);
        assert_eq!(snap.pickups[0].payload, PickupPayload::Rocket);
        assert_approx_eq!(snap.fire[0].ttl, 3.25);
        assert_eq!(snap.shots[0].owner, 1);
        assert_approx_eq!(snap.match_info.round_time, 80.0);
    }

    #[test]
    fn events_round_trip() {
        let events = vec![
            GameEvent::Kill { killer: 1, victim: 2 },
            GameEvent::Respawn { player: 2 },
            GameEvent::Pickup {
                player: 1,
                payload: PickupPayload::Shotgun,
            },
            GameEvent::MeteorImpact {
                id: 5,
                outcome: ImpactOutcome::Pickup {
                    payload: PickupPayload::Rocket,
                },
            },
            GameEvent::MeteorImpact {
                id: 6,
                outcome: ImpactOutcome::Fire {
                    fire: FireZoneSnapshot {
                        id: 7,
                        center: Vec3::ZERO,
                        radius: 6.0,
                        ttl: 7.0,
                    },
                },
            },
            GameEvent::RoundEnd {
                winner: None,
                round: 2,
                scores: vec![ScoreEntry {
                    player_id: 1,
                    score: 800,
                }],
            },
        ];
        for event in events {
            let json = serde_json::to_string(&ServerMsg::Event(event.clone())).unwrap();
            assert!(json.contains(r#""type":"event""#), "missing tag in {json}");
            let back: ServerMsg = serde_json::from_str(&json).unwrap();
            let ServerMsg::Event(round_tripped) = back else {
                panic!("wrong variant for {json}");
            };
            assert_eq!(
                serde_json::to_string(&round_tripped).unwrap(),
                serde_json::to_string(&event).unwrap()
            );
        }
    }

    #[test]
    fn tie_round_end_serializes_null_winner() {
        let json = serde_json::to_string(&GameEvent::RoundEnd {
            winner: None,
            round: 4,
            scores: vec![],
        })
        .unwrap();
        assert!(json.contains(r#""winner":null"#));
    }
}
