//! Headless pilot - drives a craft against a live server without a renderer
//!
//! Useful for soak-testing an arena: it joins, flies a canned pattern, runs
//! the same prediction/interpolation pipeline a real client would, and logs
//! the transitions it observes.

use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};

use orbit_arena::client::{
    ClientEvent, Connection, ConnectionState, IntentCell, Interpolator, Predictor,
};
use orbit_arena::game::TickInput;
use orbit_arena::ws::protocol::{GameEvent, ServerMsg};

#[derive(Parser, Debug)]
#[command(name = "pilot", about = "Headless Orbit Arena client")]
struct Args {
    /// WebSocket endpoint of the arena server
    #[arg(long, default_value = "ws://127.0.0.1:3001/ws")]
    url: String,

    /// Display name to join with
    #[arg(long, default_value = "Pilot")]
    name: String,
}

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const STATUS_EVERY_FRAMES: u32 = 120;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(url = %args.url, name = %args.name, "Pilot starting");

    let intent = IntentCell::new();
    let (connection, mut events) =
        Connection::spawn(args.url.clone(), args.name.clone(), intent.clone());

    let mut predictor: Option<Predictor> = None;
    let mut interp = Interpolator::new();
    let mut dropped_since_welcome = false;
    let mut frame_count: u32 = 0;
    let started = Instant::now();
    let mut last_frame = Instant::now();
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C, shutting down");
                break;
            }

            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ClientEvent::State(state) => {
                        info!(?state, "Connection state changed");
                        match state {
                            ConnectionState::Disconnected | ConnectionState::Error => {
                                dropped_since_welcome = true;
                            }
                            ConnectionState::Connected => {
                                if dropped_since_welcome {
                                    // Whatever we predicted before the drop is stale
                                    if let Some(p) = &mut predictor {
                                        p.reset();
                                    }
                                    dropped_since_welcome = false;
                                }
                            }
                            ConnectionState::Connecting => {}
                        }
                    }
                    ClientEvent::Message(ServerMsg::Welcome { player_id, tuning, match_info, .. }) => {
                        info!(player_id, round = match_info.round, "Joined arena");
                        predictor = Some(Predictor::new(player_id, tuning));
                    }
                    ClientEvent::Message(ServerMsg::Snap(snap)) => {
                        if let Some(p) = &mut predictor {
                            for transition in p.apply_snapshot(&snap.players) {
                                info!(?transition, "Local transition");
                            }
                            interp.apply_snapshot(&snap.players, p.player_id());
                        }
                    }
                    ClientEvent::Message(ServerMsg::Event(event)) => match event {
                        GameEvent::Kill { killer, victim } => info!(killer, victim, "Kill"),
                        GameEvent::RoundEnd { winner, round, .. } => {
                            info!(?winner, round, "Round ended")
                        }
                        other => info!(?other, "Event"),
                    },
                }
            }

            _ = ticker.tick() => {
                let dt = last_frame.elapsed().as_secs_f32();
                last_frame = Instant::now();

                // Canned flight: full thrust, slow bang-bang steering,
                // periodic trigger pulls
                let t = started.elapsed().as_secs_f32();
                let turn = (t * 0.4).sin();
                let fire = (t as u64) % 3 == 0;
                intent.set(TickInput::from_wire(0, 1.0, turn, fire, false));

                if let Some(p) = &mut predictor {
                    p.frame(&intent.get(), dt);
                    interp.frame(dt);

                    frame_count += 1;
                    if frame_count % STATUS_EVERY_FRAMES == 0 {
                        if let Some(state) = p.state() {
                            info!(
                                pos = ?state.kin.pos,
                                hp = state.hp,
                                score = state.score,
                                alive = state.alive,
                                remotes = interp.states().count(),
                                "Status"
                            );
                        } else {
                            warn!("No snapshot containing local player yet");
                        }
                    }
                }
            }
        }
    }

    connection.destroy();
    Ok(())
}
