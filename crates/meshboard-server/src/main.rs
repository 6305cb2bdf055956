//! Meshboard Signaling Server
//!
//! Rendezvous point for peers editing the same diagram. The server never
//! sees document state: it authenticates joins, assigns peer identities,
//! hands out the room roster and relays session negotiation messages
//! (offers, answers, candidates) to their addressee. Everything else flows
//! over the peer mesh.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "diagram_id": "d1", "token": "..." }
//! { "type": "offer", "to": "<peer-id>", "sdp": "..." }
//! { "type": "candidate", "to": "<peer-id>", "candidate": "..." }
//! ```

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;
const DEFAULT_PORT: u16 = 3030;

/// Cursor/selection colors handed out round-robin per room.
const PEER_COLORS: [&str; 8] = [
    "#e91e63", "#9c27b0", "#3f51b5", "#03a9f4", "#009688", "#8bc34a", "#ff9800", "#795548",
];

/// Messages received from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientSignal {
    /// Join the rendezvous room for a diagram
    Join { diagram_id: String, token: String },
    /// Session offer for one peer
    Offer { to: String, sdp: String },
    /// Session answer for one peer
    Answer { to: String, sdp: String },
    /// Connectivity candidate for one peer
    Candidate { to: String, candidate: String },
    /// Leave the current room
    Leave,
}

/// Messages sent to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerSignal {
    /// Join confirmed: assigned identity plus everyone already present
    Welcome {
        peer_id: String,
        name: String,
        color: String,
        peers: Vec<PeerInfo>,
    },
    /// A new peer joined the room
    PeerJoined { peer: PeerInfo },
    /// A peer left the room
    PeerLeft { peer_id: String },
    /// Relayed session offer
    Offer { from: String, sdp: String },
    /// Relayed session answer
    Answer { from: String, sdp: String },
    /// Relayed connectivity candidate
    Candidate { from: String, candidate: String },
    /// Error message
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: String,
    pub name: String,
    pub color: String,
}

/// One event on a room's fan-out channel.
#[derive(Debug, Clone)]
enum RoomEvent {
    /// Deliver to everyone except the originator.
    ToAll { from: String, signal: ServerSignal },
    /// Deliver only to the addressee.
    ToPeer { to: String, signal: ServerSignal },
}

/// Room state
struct Room {
    tx: broadcast::Sender<RoomEvent>,
    /// Connected peers by id
    peers: HashMap<String, PeerInfo>,
    /// Seats handed out so far, for name/color assignment
    seats: usize,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashMap::new(),
            seats: 0,
        }
    }
}

/// Shared application state
struct AppState {
    rooms: DashMap<String, Room>,
    /// Expected bearer token; empty means open access.
    token: String,
}

impl AppState {
    fn new(token: String) -> Self {
        Self {
            rooms: DashMap::new(),
            token,
        }
    }

    fn token_valid(&self, presented: &str) -> bool {
        self.token.is_empty() || self.token == presented
    }

    /// Seat a peer in a room: assign identity, subscribe, return roster.
    fn join_room(
        &self,
        diagram_id: &str,
        peer_id: &str,
    ) -> (broadcast::Receiver<RoomEvent>, PeerInfo, Vec<PeerInfo>) {
        let mut room = self
            .rooms
            .entry(diagram_id.to_string())
            .or_insert_with(Room::new);
        let seat = room.seats;
        room.seats += 1;

        let me = PeerInfo {
            peer_id: peer_id.to_string(),
            name: format!("anon-{seat}"),
            color: PEER_COLORS[seat % PEER_COLORS.len()].to_string(),
        };
        let roster: Vec<PeerInfo> = room.peers.values().cloned().collect();
        room.peers.insert(peer_id.to_string(), me.clone());
        let rx = room.tx.subscribe();
        (rx, me, roster)
    }

    /// Remove a peer, dropping the room once it empties.
    fn leave_room(&self, diagram_id: &str, peer_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(diagram_id) {
            room.peers.remove(peer_id);
            if room.peers.is_empty() {
                drop(room);
                self.rooms.remove(diagram_id);
            }
        }
    }

    fn broadcast(&self, diagram_id: &str, from: &str, signal: ServerSignal) {
        if let Some(room) = self.rooms.get(diagram_id) {
            let _ = room.tx.send(RoomEvent::ToAll {
                from: from.to_string(),
                signal,
            });
        }
    }

    fn relay(&self, diagram_id: &str, to: &str, signal: ServerSignal) {
        if let Some(room) = self.rooms.get(diagram_id) {
            let _ = room.tx.send(RoomEvent::ToPeer {
                to: to.to_string(),
                signal,
            });
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshboard_server=info,tower_http=info".into()),
        )
        .init();

    let token = std::env::var("MESHBOARD_TOKEN").unwrap_or_default();
    if token.is_empty() {
        warn!("MESHBOARD_TOKEN not set, accepting any join token");
    }
    let port = std::env::var("MESHBOARD_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let state = Arc::new(AppState::new(token));

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("meshboard signaling server listening on {}", addr);
    info!("WebSocket endpoint: ws://localhost:{}/ws", port);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Index page
async fn index() -> &'static str {
    "Meshboard Signaling Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_signal(
    sender: &mut SplitSink<WebSocket, Message>,
    signal: &ServerSignal,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(signal).unwrap();
    sender.send(Message::Text(json.into())).await
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current_room: Option<String> = None;
    let mut room_rx: Option<broadcast::Receiver<RoomEvent>> = None;

    loop {
        tokio::select! {
            // Incoming signals from this client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let signal = match serde_json::from_str::<ClientSignal>(&text) {
                            Ok(signal) => signal,
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer_id, e);
                                let err = ServerSignal::Error {
                                    message: format!("invalid message: {e}"),
                                };
                                let _ = send_signal(&mut sender, &err).await;
                                continue;
                            }
                        };
                        match signal {
                            ClientSignal::Join { diagram_id, token } => {
                                if !state.token_valid(&token) {
                                    warn!("Rejected join from {}: bad token", peer_id);
                                    let err = ServerSignal::Error {
                                        message: "invalid token".to_string(),
                                    };
                                    let _ = send_signal(&mut sender, &err).await;
                                    break;
                                }

                                // Leave current room if any
                                if let Some(ref old_room) = current_room {
                                    state.leave_room(old_room, &peer_id);
                                    state.broadcast(old_room, &peer_id, ServerSignal::PeerLeft {
                                        peer_id: peer_id.clone(),
                                    });
                                }

                                let (rx, me, roster) = state.join_room(&diagram_id, &peer_id);
                                room_rx = Some(rx);
                                current_room = Some(diagram_id.clone());

                                let welcome = ServerSignal::Welcome {
                                    peer_id: me.peer_id.clone(),
                                    name: me.name.clone(),
                                    color: me.color.clone(),
                                    peers: roster,
                                };
                                if send_signal(&mut sender, &welcome).await.is_err() {
                                    break;
                                }

                                state.broadcast(&diagram_id, &peer_id, ServerSignal::PeerJoined {
                                    peer: me,
                                });
                                info!("Peer {} joined diagram {}", peer_id, diagram_id);
                            }
                            ClientSignal::Leave => {
                                if let Some(ref room) = current_room {
                                    state.leave_room(room, &peer_id);
                                    state.broadcast(room, &peer_id, ServerSignal::PeerLeft {
                                        peer_id: peer_id.clone(),
                                    });
                                    info!("Peer {} left diagram {}", peer_id, room);
                                }
                                current_room = None;
                                room_rx = None;
                            }
                            ClientSignal::Offer { to, sdp } => {
                                if let Some(ref room) = current_room {
                                    state.relay(room, &to, ServerSignal::Offer {
                                        from: peer_id.clone(),
                                        sdp,
                                    });
                                }
                            }
                            ClientSignal::Answer { to, sdp } => {
                                if let Some(ref room) = current_room {
                                    state.relay(room, &to, ServerSignal::Answer {
                                        from: peer_id.clone(),
                                        sdp,
                                    });
                                }
                            }
                            ClientSignal::Candidate { to, candidate } => {
                                if let Some(ref room) = current_room {
                                    state.relay(room, &to, ServerSignal::Candidate {
                                        from: peer_id.clone(),
                                        candidate,
                                    });
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore ping/pong/binary
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            // Room fan-out
            event = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await.ok(),
                    None => {
                        // No room joined, just wait forever
                        std::future::pending::<Option<RoomEvent>>().await
                    }
                }
            } => {
                let Some(event) = event else { continue };
                let deliver = match &event {
                    RoomEvent::ToAll { from, .. } => *from != peer_id,
                    RoomEvent::ToPeer { to, .. } => *to == peer_id,
                };
                if deliver {
                    let signal = match event {
                        RoomEvent::ToAll { signal, .. } | RoomEvent::ToPeer { signal, .. } => signal,
                    };
                    if send_signal(&mut sender, &signal).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(ref room) = current_room {
        state.leave_room(room, &peer_id);
        state.broadcast(room, &peer_id, ServerSignal::PeerLeft {
            peer_id: peer_id.clone(),
        });
    }
    info!("Connection closed: {}", peer_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_check() {
        let open = AppState::new(String::new());
        assert!(open.token_valid("anything"));

        let locked = AppState::new("secret".to_string());
        assert!(locked.token_valid("secret"));
        assert!(!locked.token_valid("wrong"));
        assert!(!locked.token_valid(""));
    }

    #[test]
    fn test_join_assigns_identity_and_roster() {
        let state = AppState::new(String::new());
        let (_rx_a, a, roster_a) = state.join_room("d1", "peer-a");
        assert!(roster_a.is_empty());
        assert_eq!(a.name, "anon-0");

        let (_rx_b, b, roster_b) = state.join_room("d1", "peer-b");
        assert_eq!(b.name, "anon-1");
        assert_ne!(a.color, b.color);
        assert_eq!(roster_b.len(), 1);
        assert_eq!(roster_b[0].peer_id, "peer-a");
    }

    #[test]
    fn test_empty_room_is_dropped() {
        let state = AppState::new(String::new());
        let (_rx, _, _) = state.join_room("d1", "peer-a");
        assert!(state.rooms.contains_key("d1"));
        state.leave_room("d1", "peer-a");
        assert!(!state.rooms.contains_key("d1"));
    }

    #[test]
    fn test_targeted_relay_envelope() {
        let state = AppState::new(String::new());
        let (mut rx_a, _, _) = state.join_room("d1", "peer-a");
        let (_rx_b, _, _) = state.join_room("d1", "peer-b");

        state.relay("d1", "peer-a", ServerSignal::Offer {
            from: "peer-b".to_string(),
            sdp: "sdp".to_string(),
        });
        match rx_a.try_recv().unwrap() {
            RoomEvent::ToPeer { to, .. } => assert_eq!(to, "peer-a"),
            other => panic!("wrong envelope: {other:?}"),
        }
    }
}
