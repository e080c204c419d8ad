//! WebSocket session handling
//!
//! Each connection is a thin bridge between one socket and the arena task:
//! the first `join` message establishes identity, after which inbound intent
//! flows through the arena command channel and outbound traffic is forwarded
//! from the arena broadcast. The session never touches entity state.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::TickInput;
use crate::util::rate_limit::SessionRateLimiter;
use crate::ws::protocol::{ClientMsg, PlayerId, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    debug!("New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // The session has no identity until the client joins
    let Some(name) = wait_for_join(&mut ws_stream).await else {
        debug!("Connection closed before join");
        return;
    };

    // Subscribe before joining so the first broadcasts are not missed
    let broadcast_rx = state.arena.subscribe();

    let reply = match state.arena.join(name).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "Join failed");
            return;
        }
    };
    let player_id = reply.player_id;

    if let Err(e) = send_msg(&mut ws_sink, &reply.welcome).await {
        error!(player_id, error = %e, "Failed to send welcome");
        state.arena.leave(player_id).await;
        return;
    }

    // Writer task: arena broadcast -> WebSocket
    let writer_handle = tokio::spawn(forward_broadcasts(ws_sink, broadcast_rx, player_id));

    // Reader loop: WebSocket -> arena
    read_loop(&mut ws_stream, &state, player_id).await;

    // Immediate entity removal on disconnect; no grace period
    state.arena.leave(player_id).await;
    writer_handle.abort();

    info!(player_id, "WebSocket connection closed");
}

/// Consume messages until the client joins; None if the socket closes first
async fn wait_for_join(ws_stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(ClientMsg::Join { name }) => return Some(name),
                Ok(ClientMsg::Input { .. }) => {
                    warn!("Input before join, ignoring");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse client message");
                }
            },
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

/// Forward arena broadcasts to one client. A lagged client skips messages
/// rather than stalling anyone; snapshots are self-correcting.
async fn forward_broadcasts(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut broadcast_rx: broadcast::Receiver<ServerMsg>,
    player_id: PlayerId,
) {
    loop {
        match broadcast_rx.recv().await {
            Ok(msg) => {
                if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                    debug!(player_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(player_id, lagged_count = n, "Client lagged, skipping {} messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(player_id, "Broadcast channel closed");
                break;
            }
        }
    }
}

async fn read_loop(ws_stream: &mut SplitStream<WebSocket>, state: &AppState, player_id: PlayerId) {
    let rate_limiter = SessionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Input {
                        seq,
                        thrust,
                        turn,
                        fire,
                        power,
                        dt: _,
                    }) => {
                        let intent = TickInput::from_wire(seq, thrust, turn, fire, power);
                        if state.arena.input(player_id, intent).await.is_err() {
                            debug!(player_id, "Arena command channel closed");
                            break;
                        }
                    }
                    Ok(ClientMsg::Join { .. }) => {
                        warn!(player_id, "Duplicate join, ignoring");
                    }
                    Err(e) => {
                        warn!(player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
