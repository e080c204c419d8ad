//! Arena state and authoritative tick loop
//!
//! One [`GameArena`] task owns every entity store for the lifetime of the
//! process; WebSocket sessions reach it only through [`ArenaHandle`]
//! commands, which are drained at the start of the next tick
//! (last-input-wins per player). Outbound messages fan out over a broadcast
//! channel so a slow client can never stall the tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::{now_secs, tick_delta, TICK_DURATION_MICROS};
use crate::ws::protocol::{
    FireZoneSnapshot, GameEvent, ImpactOutcome, MatchInfo, PlanetInfo, PlayerId, RoundPhase,
    ScoreEntry, ServerMsg,
};

use super::combat::{
    self, Shot, ASSIST_SCORE, FIRE_RANGE, FIRE_RATE, HIT_DAMAGE, KILL_SCORE, MUZZLE_OFFSET,
    SHOT_LENGTH, SHOT_TTL,
};
use super::geom;
use super::hazards::{
    FireZone, Meteor, MeteorKind, Pickup, FIRE_DPS, FIRE_ZONE_GRACE, METEOR_INTERVAL,
    PICKUP_GRAB_RADIUS, PICKUP_SCORE,
};
use super::motion::{self, Kinematics, Tuning, PLANET_RADIUS};
use super::snapshot::SnapshotBuilder;
use super::{TickInput, ENVIRONMENT};

/// Seconds a dead craft waits before respawning
pub const RESPAWN_DELAY: f64 = 2.5;
/// Full craft hit points
pub const MAX_HP: f32 = 100.0;

/// Death fling: the wreck is tossed along the surface normal with jitter
const FLING_SPEED: f32 = 20.0;
const FLING_JITTER: f32 = 0.3;

const NAME_MAX: usize = 24;
const PLAYER_COLORS: [&str; 5] = ["#ff6b6b", "#feca57", "#54a0ff", "#5f27cd", "#1dd1a1"];

/// Per-arena round rules, overridable through configuration
#[derive(Debug, Clone, Copy)]
pub struct ArenaRules {
    /// Round length in seconds
    pub round_duration: f32,
    /// Score that ends the round immediately
    pub score_cap: u32,
}

impl Default for ArenaRules {
    fn default() -> Self {
        Self {
            round_duration: 90.0,
            score_cap: 800,
        }
    }
}

/// Authoritative per-player record
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub kin: Kinematics,
    pub hp: f32,
    pub score: u32,
    pub alive: bool,
    /// Unix time the craft may respawn (meaningful while dead)
    pub respawn_at: f64,
    /// Unix time of the last shot, for the fire-rate cooldown
    pub last_fire: f64,
    /// Latest intent; replaced wholesale whenever input arrives
    pub input: TickInput,
    /// Damage dealt to this player per attacker, for assist scoring.
    /// Cleared on death.
    pub contrib: HashMap<PlayerId, f32>,
}

/// All simulation state for one arena, owned exclusively by the arena task.
/// Methods are synchronous so the tick logic is testable without a runtime.
pub struct ArenaState {
    next_id: u32,
    pub players: HashMap<PlayerId, Player>,
    pub meteors: Vec<Meteor>,
    pub pickups: Vec<Pickup>,
    pub fire_zones: Vec<FireZone>,
    pub shots: Vec<Shot>,
    pub match_info: MatchInfo,
    rng: ChaCha8Rng,
    tuning: Tuning,
    rules: ArenaRules,
    round: u32,
    round_started: f64,
    round_ends: f64,
    next_meteor_at: f64,
    outbox: Vec<ServerMsg>,
}

impl ArenaState {
    pub fn new(seed: u64, rules: ArenaRules, now: f64) -> Self {
        Self {
            next_id: 1,
            players: HashMap::new(),
            meteors: Vec::new(),
            pickups: Vec::new(),
            fire_zones: Vec::new(),
            shots: Vec::new(),
            match_info: MatchInfo {
                state: RoundPhase::Active,
                time_left: rules.round_duration,
                score_cap: rules.score_cap,
                round: 1,
                round_time: 0.0,
            },
            rng: ChaCha8Rng::seed_from_u64(seed),
            tuning: Tuning::default(),
            rules,
            round: 1,
            round_started: now,
            round_ends: now + rules.round_duration as f64,
            next_meteor_at: now,
            outbox: Vec::new(),
        }
    }

    /// Ids are monotonic per arena and shared by every entity kind, so a
    /// stale reference can never alias a newer entity within a round.
    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Register a player at a fresh spawn point. Empty names fall back to
    /// `Pilot<id>`.
    pub fn add_player(&mut self, name: &str) -> PlayerId {
        let id = self.alloc_id();
        let trimmed = name.trim();
        let display: String = if trimmed.is_empty() {
            format!("Pilot{id}")
        } else {
            trimmed.chars().take(NAME_MAX).collect()
        };
        let color = PLAYER_COLORS[self.rng.gen_range(0..PLAYER_COLORS.len())].to_string();
        let dir = geom::spawn_direction(&mut self.rng);
        self.players.insert(
            id,
            Player {
                id,
                name: display,
                color,
                kin: Kinematics::at_spawn(dir),
                hp: MAX_HP,
                score: 0,
                alive: true,
                respawn_at: 0.0,
                last_fire: 0.0,
                input: TickInput::default(),
                contrib: HashMap::new(),
            },
        );
        id
    }

    /// Drop a player entirely (socket closed). Distinct from death, which
    /// keeps the record around for respawn.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        self.players.remove(&id).is_some()
    }

    /// Latest-wins input application; unknown ids are dropped silently
    /// (the player likely disconnected mid-flight).
    pub fn handle_input(&mut self, id: PlayerId, input: TickInput) {
        if let Some(player) = self.players.get_mut(&id) {
            player.input = input;
        }
    }

    pub fn build_welcome(&self, player_id: PlayerId) -> ServerMsg {
        ServerMsg::Welcome {
            player_id,
            match_info: self.match_info,
            planet: PlanetInfo {
                radius: PLANET_RADIUS,
            },
            tuning: self.tuning,
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<ServerMsg> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&mut self, event: GameEvent) {
        self.outbox.push(ServerMsg::Event(event));
    }

    /// Advance the simulation one fixed tick. Returns true when a round
    /// completed during this tick.
    pub fn run_tick(&mut self, now: f64) -> bool {
        let dt = tick_delta();
        self.match_info.round = self.round;
        self.match_info.score_cap = self.rules.score_cap;
        self.match_info.time_left = (self.round_ends - now).max(0.0) as f32;
        self.match_info.round_time = (now - self.round_started).max(0.0) as f32;

        self.step_players(now, dt);
        self.process_firing(now);
        self.step_shots(dt);
        self.step_meteors(now, dt);
        self.step_fire_zones(now, dt);
        self.step_pickups(now);

        let (winner, best, scores) = self.round_scores();
        let cap_reached = best.map_or(false, |b| b >= self.rules.score_cap);
        let round_ended = cap_reached || self.match_info.time_left <= 0.0;
        if round_ended {
            self.complete_round(winner, scores, now);
        } else if now >= self.next_meteor_at {
            let id = self.alloc_id();
            self.meteors.push(Meteor::spawn(id, now, &mut self.rng));
            self.next_meteor_at = now + self.rng.gen_range(METEOR_INTERVAL);
        }
        round_ended
    }

    /// Integrate motion for alive craft, respawn the dead that are due
    fn step_players(&mut self, now: f64, dt: f32) {
        let tuning = self.tuning;
        for player in self.players.values_mut() {
            if player.alive {
                motion::step(
                    &mut player.kin,
                    player.input.thrust as f32,
                    player.input.turn as f32,
                    dt,
                    &tuning,
                );
            }
        }

        let due: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| !p.alive && now >= p.respawn_at)
            .map(|p| p.id)
            .collect();
        for id in due {
            let dir = geom::spawn_direction(&mut self.rng);
            if let Some(player) = self.players.get_mut(&id) {
                player.kin = Kinematics::at_spawn(dir);
                player.hp = MAX_HP;
                player.alive = true;
                player.respawn_at = 0.0;
            }
            self.emit(GameEvent::Respawn { player: id });
        }
    }

    /// Hit-scan firing for every alive craft requesting it and off cooldown.
    /// A cosmetic tracer is recorded whether or not anything was hit.
    fn process_firing(&mut self, now: f64) {
        let shooters: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| p.alive && p.input.fire && now - p.last_fire >= FIRE_RATE as f64)
            .map(|p| p.id)
            .collect();

        for shooter in shooters {
            let Some((origin, dir)) = self.players.get_mut(&shooter).map(|p| {
                p.last_fire = now;
                let normal = geom::normalize_or(p.kin.pos, Vec3::Z);
                let dir = geom::normalize_or(p.kin.heading, geom::stable_tangent(normal));
                (p.kin.pos + dir * MUZZLE_OFFSET, dir)
            }) else {
                continue;
            };

            let target = combat::hit_scan(
                origin,
                dir,
                FIRE_RANGE,
                self.players
                    .values()
                    .filter(|p| p.alive && p.id != shooter)
                    .map(|p| (p.id, p.kin.pos)),
            );
            if let Some(victim) = target {
                self.apply_damage(victim, HIT_DAMAGE, shooter, now);
            }

            let id = self.alloc_id();
            self.shots.push(Shot {
                id,
                owner: shooter,
                origin,
                dir,
                length: SHOT_LENGTH,
                ttl: SHOT_TTL,
            });
        }
    }

    /// Damage a player, recording the attacker's contribution for assist
    /// scoring; kills are resolved immediately.
    pub fn apply_damage(&mut self, target: PlayerId, amount: f32, source: PlayerId, now: f64) {
        let Some(player) = self.players.get_mut(&target) else {
            return;
        };
        player.hp -= amount;
        *player.contrib.entry(source).or_insert(0.0) += amount;
        let died = player.hp <= 0.0 && player.alive;
        if died {
            self.kill_player(target, source, now);
        }
    }

    fn kill_player(&mut self, victim: PlayerId, killer: PlayerId, now: f64) {
        let jitter = Vec3::new(
            self.rng.gen_range(-FLING_JITTER..FLING_JITTER),
            self.rng.gen_range(-FLING_JITTER..FLING_JITTER),
            self.rng.gen_range(-FLING_JITTER..FLING_JITTER),
        );
        let contrib = {
            let Some(player) = self.players.get_mut(&victim) else {
                return;
            };
            player.alive = false;
            player.respawn_at = now + RESPAWN_DELAY;
            let normal = geom::normalize_or(player.kin.pos, Vec3::Z);
            player.kin.vel = geom::normalize_or(normal + jitter, normal) * FLING_SPEED;
            std::mem::take(&mut player.contrib)
        };

        self.emit(GameEvent::Kill { killer, victim });

        // The environment (id 0) never resolves to a player, so it earns
        // neither kill nor assist score.
        if let Some(player) = self.players.get_mut(&killer) {
            player.score += KILL_SCORE;
        }
        for helper in combat::assist_ids(&contrib, killer) {
            if let Some(player) = self.players.get_mut(&helper) {
                player.score += ASSIST_SCORE;
            }
        }
    }

    fn step_shots(&mut self, dt: f32) {
        for shot in &mut self.shots {
            shot.ttl -= dt;
        }
        self.shots.retain(|shot| shot.ttl > 0.0);
    }

    fn step_meteors(&mut self, now: f64, dt: f32) {
        for meteor in &mut self.meteors {
            meteor.pos += meteor.vel * dt;
        }
        let mut i = 0;
        while i < self.meteors.len() {
            if now >= self.meteors[i].impact_at {
                let meteor = self.meteors.swap_remove(i);
                self.meteor_impact(meteor, now);
            } else {
                i += 1;
            }
        }
    }

    fn meteor_impact(&mut self, meteor: Meteor, now: f64) {
        match meteor.kind {
            MeteorKind::Pickup => {
                let id = self.alloc_id();
                let pickup = Pickup::from_impact(id, meteor.target, now, &mut self.rng);
                self.emit(GameEvent::MeteorImpact {
                    id: meteor.id,
                    outcome: ImpactOutcome::Pickup {
                        payload: pickup.payload,
                    },
                });
                self.pickups.push(pickup);
            }
            MeteorKind::Hazard => {
                let id = self.alloc_id();
                let zone = FireZone::ignite(id, meteor.target, now);
                self.emit(GameEvent::MeteorImpact {
                    id: meteor.id,
                    outcome: ImpactOutcome::Fire {
                        fire: FireZoneSnapshot {
                            id: zone.id,
                            center: zone.center,
                            radius: zone.radius,
                            ttl: zone.duration,
                        },
                    },
                });
                self.fire_zones.push(zone);
            }
        }
    }

    /// Shrink zones past their grace period and burn any craft inside.
    /// Zone damage is attributed to the environment id.
    fn step_fire_zones(&mut self, now: f64, dt: f32) {
        let mut scorched: Vec<PlayerId> = Vec::new();
        for zone in &mut self.fire_zones {
            let age = (now - zone.start) as f32;
            if age < FIRE_ZONE_GRACE {
                continue;
            }
            zone.radius = (zone.radius - zone.shrink * dt).max(0.0);
            for player in self.players.values() {
                if player.alive && player.kin.pos.distance(zone.center) <= zone.radius {
                    scorched.push(player.id);
                }
            }
        }
        self.fire_zones.retain(|zone| {
            let age = (now - zone.start) as f32;
            age <= zone.duration && zone.radius > 0.1
        });
        for id in scorched {
            self.apply_damage(id, FIRE_DPS * dt, ENVIRONMENT, now);
        }
    }

    fn step_pickups(&mut self, now: f64) {
        self.pickups.retain(|pickup| pickup.expires_at > now);

        let mut collected = Vec::new();
        for pickup in &self.pickups {
            let grabber = self
                .players
                .values()
                .find(|p| p.alive && p.kin.pos.distance(pickup.pos) <= PICKUP_GRAB_RADIUS);
            if let Some(player) = grabber {
                collected.push((pickup.id, player.id, pickup.payload));
            }
        }
        for (pickup_id, player_id, payload) in collected {
            self.pickups.retain(|p| p.id != pickup_id);
            if let Some(player) = self.players.get_mut(&player_id) {
                player.score += PICKUP_SCORE;
            }
            self.emit(GameEvent::Pickup {
                player: player_id,
                payload,
            });
        }
    }

    /// Current winner candidate and scoreboard. A shared maximum is a tie
    /// and yields no winner.
    fn round_scores(&self) -> (Option<PlayerId>, Option<u32>, Vec<ScoreEntry>) {
        let mut winner = None;
        let mut best: Option<u32> = None;
        let mut tie = false;
        for player in self.players.values() {
            match best {
                None => {
                    best = Some(player.score);
                    winner = Some(player.id);
                }
                Some(b) if player.score > b => {
                    best = Some(player.score);
                    winner = Some(player.id);
                    tie = false;
                }
                Some(b) if player.score == b => tie = true,
                Some(_) => {}
            }
        }
        if tie {
            winner = None;
        }
        let scores = self
            .players
            .values()
            .map(|p| ScoreEntry {
                player_id: p.id,
                score: p.score,
            })
            .collect();
        (winner, best, scores)
    }

    fn complete_round(&mut self, winner: Option<PlayerId>, scores: Vec<ScoreEntry>, now: f64) {
        self.emit(GameEvent::RoundEnd {
            winner,
            round: self.round,
            scores,
        });

        let ids: Vec<PlayerId> = self.players.keys().copied().collect();
        for id in ids {
            let dir = geom::spawn_direction(&mut self.rng);
            if let Some(player) = self.players.get_mut(&id) {
                player.kin = Kinematics::at_spawn(dir);
                player.hp = MAX_HP;
                player.alive = true;
                player.respawn_at = 0.0;
                player.last_fire = now;
                player.score = 0;
                player.contrib.clear();
            }
        }
        self.meteors.clear();
        self.pickups.clear();
        self.fire_zones.clear();
        self.shots.clear();

        self.round += 1;
        self.round_started = now;
        self.round_ends = now + self.rules.round_duration as f64;
        self.next_meteor_at = now + self.rng.gen_range(METEOR_INTERVAL);
        self.match_info.state = RoundPhase::Active;
        self.match_info.round = self.round;
        self.match_info.round_time = 0.0;
        self.match_info.time_left = self.rules.round_duration;
    }
}

/// Commands sessions send into the arena task
pub enum ArenaCommand {
    Join {
        name: String,
        reply: oneshot::Sender<JoinReply>,
    },
    Input {
        player_id: PlayerId,
        intent: TickInput,
    },
    Leave {
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone)]
pub struct JoinReply {
    pub player_id: PlayerId,
    pub welcome: ServerMsg,
}

#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    #[error("arena task is not running")]
    Closed,
}

/// Cheap clonable handle to a running arena
#[derive(Clone)]
pub struct ArenaHandle {
    cmd_tx: mpsc::Sender<ArenaCommand>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    round: Arc<AtomicU32>,
}

impl ArenaHandle {
    /// Register a player and wait for the welcome message
    pub async fn join(&self, name: String) -> Result<JoinReply, ArenaError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ArenaCommand::Join {
                name,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ArenaError::Closed)?;
        reply_rx.await.map_err(|_| ArenaError::Closed)
    }

    /// Forward the latest intent; applied at the start of the next tick
    pub async fn input(&self, player_id: PlayerId, intent: TickInput) -> Result<(), ArenaError> {
        self.cmd_tx
            .send(ArenaCommand::Input { player_id, intent })
            .await
            .map_err(|_| ArenaError::Closed)
    }

    /// Remove the player's entity immediately (socket closed)
    pub async fn leave(&self, player_id: PlayerId) {
        let _ = self.cmd_tx.send(ArenaCommand::Leave { player_id }).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.broadcast_tx.subscribe()
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn round(&self) -> u32 {
        self.round.load(Ordering::Relaxed)
    }
}

/// The authoritative arena task: fixed-tick simulation plus rate-limited
/// snapshot broadcasting
pub struct GameArena {
    state: ArenaState,
    cmd_rx: mpsc::Receiver<ArenaCommand>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    snapshots: SnapshotBuilder,
    player_count: Arc<AtomicUsize>,
    round: Arc<AtomicU32>,
}

impl GameArena {
    pub fn new(seed: u64, rules: ArenaRules) -> (Self, ArenaHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (broadcast_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));
        let round = Arc::new(AtomicU32::new(1));

        let handle = ArenaHandle {
            cmd_tx,
            broadcast_tx: broadcast_tx.clone(),
            player_count: player_count.clone(),
            round: round.clone(),
        };
        let arena = Self {
            state: ArenaState::new(seed, rules, now_secs()),
            cmd_rx,
            broadcast_tx,
            snapshots: SnapshotBuilder::new(),
            player_count,
            round,
        };
        (arena, handle)
    }

    /// Run the authoritative tick loop forever
    pub async fn run(mut self) {
        info!("Arena started");

        let mut ticker = interval(Duration::from_micros(TICK_DURATION_MICROS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            // Apply all input received since the last tick
            self.process_commands();

            let now = now_secs();
            let round_ended = self.state.run_tick(now);
            if round_ended {
                self.round.store(self.state.round, Ordering::Relaxed);
                self.snapshots.force_next();
                info!(round = self.state.round, "Round complete, next round started");
            }

            // Events first, then the snapshot that reflects them
            for msg in self.state.drain_outbox() {
                let _ = self.broadcast_tx.send(msg);
            }
            if self.snapshots.should_send(now) {
                let snap = self.snapshots.build(&self.state, now);
                let _ = self.broadcast_tx.send(snap);
            }
        }
    }

    fn process_commands(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                ArenaCommand::Join { name, reply } => {
                    let player_id = self.state.add_player(&name);
                    self.player_count
                        .store(self.state.players.len(), Ordering::Relaxed);
                    info!(
                        player_id,
                        player_count = self.state.players.len(),
                        "Player joined arena"
                    );
                    let welcome = self.state.build_welcome(player_id);
                    let _ = reply.send(JoinReply { player_id, welcome });
                }
                ArenaCommand::Input { player_id, intent } => {
                    self.state.handle_input(player_id, intent);
                }
                ArenaCommand::Leave { player_id } => {
                    if self.state.remove_player(player_id) {
                        self.player_count
                            .store(self.state.players.len(), Ordering::Relaxed);
                        info!(player_id, "Player left arena");
                    } else {
                        debug!(player_id, "Leave for unknown player");
                    }
                }
            }
        }
    }
}
