//! Reconnecting WebSocket connection for clients
//!
//! Owns the socket lifecycle: join on connect, forward server messages to
//! the consumer, sample the shared intent cell at a fixed rate, and
//! reconnect with capped backoff when the link drops. Consumers treat any
//! predicted state as stale once a reconnect happens; the next snapshot
//! re-seeds it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::game::TickInput;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// How often the latest intent is sent to the server
pub const INPUT_SEND_INTERVAL: Duration = Duration::from_millis(20);

const RECONNECT_STEP: Duration = Duration::from_millis(500);
const RECONNECT_CAP: Duration = Duration::from_secs(5);

/// Connection lifecycle, surfaced to the consumer for HUD-style feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Everything a consumer receives from the connection task
#[derive(Debug, Clone)]
pub enum ClientEvent {
    State(ConnectionState),
    Message(ServerMsg),
}

/// Shared latest-intent cell: the frame loop writes it, the send loop
/// samples it at [`INPUT_SEND_INTERVAL`]. Sequence numbers are stamped at
/// send time.
#[derive(Clone, Default)]
pub struct IntentCell {
    inner: Arc<Mutex<TickInput>>,
}

impl IntentCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, intent: TickInput) {
        *self.inner.lock() = intent;
    }

    pub fn get(&self) -> TickInput {
        *self.inner.lock()
    }
}

/// Handle to the background connection task
pub struct Connection {
    task: tokio::task::JoinHandle<()>,
    destroyed: AtomicBool,
}

impl Connection {
    /// Spawn the connection task. Events arrive on the returned receiver;
    /// dropping it tears the task down on its next send.
    pub fn spawn(
        url: String,
        name: String,
        intent: IntentCell,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(url, name, intent, events_tx));
        (
            Self {
                task,
                destroyed: AtomicBool::new(false),
            },
            events_rx,
        )
    }

    /// Stop the connection task and close the socket. Safe to call more
    /// than once; repeat calls are no-ops.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.task.abort();
        }
    }
}

/// Backoff before reconnect attempt `retry` (0-based), capped
fn backoff_delay(retry: u32) -> Duration {
    (RECONNECT_STEP + RECONNECT_STEP * retry).min(RECONNECT_CAP)
}

enum SessionEnd {
    /// Consumer dropped the event receiver; stop entirely
    ConsumerGone,
    /// Server closed or the link dropped; reconnect
    SocketClosed,
    /// Socket-level error; reconnect
    SocketError,
}

async fn run(
    url: String,
    name: String,
    intent: IntentCell,
    events: mpsc::UnboundedSender<ClientEvent>,
) {
    let mut retry: u32 = 0;
    let mut seq: u32 = 0;
    loop {
        if events
            .send(ClientEvent::State(ConnectionState::Connecting))
            .is_err()
        {
            return;
        }

        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                retry = 0;
                if events
                    .send(ClientEvent::State(ConnectionState::Connected))
                    .is_err()
                {
                    return;
                }
                match session(stream, &name, &intent, &events, &mut seq).await {
                    SessionEnd::ConsumerGone => return,
                    SessionEnd::SocketClosed => {
                        let _ = events.send(ClientEvent::State(ConnectionState::Disconnected));
                    }
                    SessionEnd::SocketError => {
                        let _ = events.send(ClientEvent::State(ConnectionState::Error));
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "WebSocket connect failed");
                if events
                    .send(ClientEvent::State(ConnectionState::Error))
                    .is_err()
                {
                    return;
                }
            }
        }

        let delay = backoff_delay(retry);
        retry += 1;
        debug!(retry, delay_ms = delay.as_millis() as u64, "Reconnecting");
        sleep(delay).await;
    }
}

async fn session(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    name: &str,
    intent: &IntentCell,
    events: &mpsc::UnboundedSender<ClientEvent>,
    seq: &mut u32,
) -> SessionEnd {
    let (mut sink, mut source) = stream.split();

    let join = ClientMsg::Join {
        name: name.to_string(),
    };
    match serde_json::to_string(&join) {
        Ok(json) => {
            if sink.send(Message::Text(json)).await.is_err() {
                return SessionEnd::SocketClosed;
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode join");
            return SessionEnd::SocketError;
        }
    }

    let mut ticker = interval(INPUT_SEND_INTERVAL);
    loop {
        tokio::select! {
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMsg>(&text) {
                            Ok(msg) => {
                                if events.send(ClientEvent::Message(msg)).is_err() {
                                    return SessionEnd::ConsumerGone;
                                }
                            }
                            Err(e) => warn!(error = %e, "Failed to parse server message"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::SocketClosed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        return SessionEnd::SocketError;
                    }
                }
            }
            _ = ticker.tick() => {
                let current = intent.get();
                *seq = seq.wrapping_add(1);
                let msg = ClientMsg::Input {
                    seq: *seq,
                    thrust: current.thrust as f32,
                    turn: current.turn as f32,
                    fire: current.fire,
                    power: current.power,
                    dt: INPUT_SEND_INTERVAL.as_secs_f32(),
                };
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if sink.send(Message::Text(json)).await.is_err() {
                            return SessionEnd::SocketClosed;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode input"),
                }
            }
        }
    }
}
