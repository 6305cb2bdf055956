//! WebSocket client for the signaling rendezvous server.
//!
//! Runs the socket on a background thread and exposes a non-blocking
//! command/event surface, so a synchronous caller can drive it from its
//! own loop.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tungstenite::{connect, Message};
use url::Url;

use super::{ClientSignal, PeerInfo, ServerSignal};

/// Connection state of the signaling socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events surfaced from the signaling thread.
#[derive(Debug, Clone)]
pub enum SignalEvent {
    /// Socket established (the join has been sent, not yet confirmed).
    Connected,
    /// Socket closed.
    Disconnected,
    /// Join confirmed with assigned identity and room roster.
    Welcome {
        peer_id: String,
        name: String,
        color: String,
        peers: Vec<PeerInfo>,
    },
    PeerJoined { peer: PeerInfo },
    PeerLeft { peer_id: String },
    Offer { from: String, sdp: String },
    Answer { from: String, sdp: String },
    Candidate { from: String, candidate: String },
    /// The join was refused. Terminal: the thread shuts the socket down.
    AuthFailed { message: String },
    Error { message: String },
}

/// Commands sent to the signaling thread.
enum WsCommand {
    Send(String),
    Close,
}

/// Signaling client for native platforms.
///
/// Uses a background thread for non-blocking operation; call
/// `poll_events()` from the caller's own loop.
pub struct SignalingClient {
    state: SignalState,
    events: Vec<SignalEvent>,
    cmd_tx: Option<Sender<WsCommand>>,
    event_rx: Option<Receiver<SignalEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl SignalingClient {
    /// Create a new disconnected client.
    pub fn new() -> Self {
        Self {
            state: SignalState::Disconnected,
            events: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Connect to the signaling server and join the room for a diagram.
    pub fn connect(&mut self, url: &str, diagram_id: &str, token: &str) -> Result<(), String> {
        if self.cmd_tx.is_some() {
            return Err("already connected".to_string());
        }

        let parsed = Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(format!("invalid WebSocket URL scheme: {}", parsed.scheme()));
        }

        let join = serde_json::to_string(&ClientSignal::Join {
            diagram_id: diagram_id.to_string(),
            token: token.to_string(),
        })
        .map_err(|e| e.to_string())?;

        self.state = SignalState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<SignalEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || {
            signaling_thread(&url, join, cmd_rx, event_tx);
        });

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    /// Disconnect from the server.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = SignalState::Disconnected;
    }

    /// Queue a signal for the server.
    pub fn send(&self, signal: &ClientSignal) -> Result<(), String> {
        let tx = self.cmd_tx.as_ref().ok_or("not connected")?;
        let json = serde_json::to_string(signal).map_err(|e| e.to_string())?;
        tx.send(WsCommand::Send(json)).map_err(|e| e.to_string())
    }

    /// Poll for pending events (non-blocking).
    pub fn poll_events(&mut self) -> Vec<SignalEvent> {
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    SignalEvent::Connected => self.state = SignalState::Connected,
                    SignalEvent::Disconnected => self.state = SignalState::Disconnected,
                    SignalEvent::AuthFailed { .. } | SignalEvent::Error { .. } => {
                        self.state = SignalState::Error
                    }
                    _ => {}
                }
                self.events.push(event);
            }
        }
        std::mem::take(&mut self.events)
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SignalState::Connected
    }
}

impl Default for SignalingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn signaling_thread(
    url: &str,
    join: String,
    cmd_rx: Receiver<WsCommand>,
    event_tx: Sender<SignalEvent>,
) {
    log::info!("signaling thread: connecting to {url}");
    let (mut socket, response) = match connect(url) {
        Ok(ok) => ok,
        Err(e) => {
            log::error!("signaling connection failed: {e}");
            let _ = event_tx.send(SignalEvent::Error {
                message: format!("connection failed: {e}"),
            });
            return;
        }
    };
    log::info!("signaling connected, status: {}", response.status());
    let _ = event_tx.send(SignalEvent::Connected);

    // Short read timeout on the TCP stream keeps the loop responsive to
    // commands without busy-waiting.
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    if let Err(e) = socket.send(Message::Text(join)) {
        log::error!("signaling join send failed: {e}");
        let _ = event_tx.send(SignalEvent::Error {
            message: format!("join failed: {e}"),
        });
        return;
    }

    let mut welcomed = false;
    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("signaling send error: {e}");
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => {
                let signal: ServerSignal = match serde_json::from_str(&txt) {
                    Ok(signal) => signal,
                    Err(e) => {
                        log::warn!("unparseable server signal: {e}");
                        continue;
                    }
                };
                let event = match signal {
                    ServerSignal::Welcome {
                        peer_id,
                        name,
                        color,
                        peers,
                    } => {
                        welcomed = true;
                        SignalEvent::Welcome {
                            peer_id,
                            name,
                            color,
                            peers,
                        }
                    }
                    ServerSignal::PeerJoined { peer } => SignalEvent::PeerJoined { peer },
                    ServerSignal::PeerLeft { peer_id } => SignalEvent::PeerLeft { peer_id },
                    ServerSignal::Offer { from, sdp } => SignalEvent::Offer { from, sdp },
                    ServerSignal::Answer { from, sdp } => SignalEvent::Answer { from, sdp },
                    ServerSignal::Candidate { from, candidate } => {
                        SignalEvent::Candidate { from, candidate }
                    }
                    ServerSignal::Error { message } if !welcomed => {
                        // Refused join. Nothing further will arrive.
                        let _ = event_tx.send(SignalEvent::AuthFailed { message });
                        let _ = socket.close(None);
                        break;
                    }
                    ServerSignal::Error { message } => SignalEvent::Error { message },
                };
                let _ = event_tx.send(event);
            }
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                log::error!("signaling read error: {e}");
                break;
            }
        }
    }

    log::info!("signaling thread exiting");
    let _ = event_tx.send(SignalEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_before_connect_fails() {
        let client = SignalingClient::new();
        assert!(client.send(&ClientSignal::Leave).is_err());
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let mut client = SignalingClient::new();
        assert!(client.connect("http://localhost:3030", "d1", "t").is_err());
        assert!(client.connect("not a url", "d1", "t").is_err());
    }
}
