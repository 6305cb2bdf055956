//! Full-mesh peer channel registry.
//!
//! Owns one data channel per remote peer, keyed by peer id. Channel
//! negotiation and teardown live at the signaling layer; this registry only
//! routes mesh messages. The `DataChannel` seam keeps the registry (and
//! everything above it) testable with in-memory channel pairs.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use thiserror::Error;

use super::MeshMessage;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no channel for peer {0}")]
    UnknownPeer(String),
    #[error("channel to peer {0} is not open")]
    ChannelNotOpen(String),
    #[error("send to peer {0} failed")]
    SendFailed(String),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Lifecycle state of a peer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// One negotiated channel to a single remote peer.
pub trait DataChannel {
    fn state(&self) -> ChannelState;
    /// Send a serialized message. Only called on open channels.
    fn send(&self, payload: &str) -> Result<(), TransportError>;
    /// Non-blocking receive of the next pending payload, if any.
    fn try_recv(&mut self) -> Option<String>;
}

/// The per-document channel registry: peer id → channel handle.
pub struct PeerMesh<C: DataChannel> {
    channels: HashMap<String, C>,
}

impl<C: DataChannel> PeerMesh<C> {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Register the channel for a peer, replacing any previous one.
    pub fn insert(&mut self, peer_id: impl Into<String>, channel: C) {
        self.channels.insert(peer_id.into(), channel);
    }

    /// Drop a departed peer's channel handle.
    pub fn remove(&mut self, peer_id: &str) -> Option<C> {
        self.channels.remove(peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.channels.contains_key(peer_id)
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send a message to one peer.
    pub fn send_to(&self, peer_id: &str, message: &MeshMessage) -> Result<(), TransportError> {
        let channel = self
            .channels
            .get(peer_id)
            .ok_or_else(|| TransportError::UnknownPeer(peer_id.to_string()))?;
        if channel.state() != ChannelState::Open {
            return Err(TransportError::ChannelNotOpen(peer_id.to_string()));
        }
        channel.send(&serde_json::to_string(message)?)
    }

    /// Send a message to every peer with an open channel.
    ///
    /// Channels still connecting (or already closed) are skipped without
    /// error; those peers catch up from the next full-state broadcast.
    pub fn broadcast(&self, message: &MeshMessage) -> Result<(), TransportError> {
        let payload = serde_json::to_string(message)?;
        for (peer_id, channel) in &self.channels {
            if channel.state() != ChannelState::Open {
                log::trace!("skipping peer {peer_id}: channel not open");
                continue;
            }
            if let Err(e) = channel.send(&payload) {
                log::warn!("broadcast to peer {peer_id} failed: {e}");
            }
        }
        Ok(())
    }

    /// Drain every pending incoming message, tagged with its sender.
    /// Payloads that fail to decode are logged and dropped.
    pub fn poll(&mut self) -> Vec<(String, MeshMessage)> {
        let mut received = Vec::new();
        for (peer_id, channel) in &mut self.channels {
            while let Some(payload) = channel.try_recv() {
                match serde_json::from_str(&payload) {
                    Ok(message) => received.push((peer_id.clone(), message)),
                    Err(e) => log::warn!("dropping malformed message from {peer_id}: {e}"),
                }
            }
        }
        received
    }
}

/// In-memory channel for tests and single-process setups: two halves of an
/// mpsc pair, each half both sending and receiving.
pub struct InMemoryChannel {
    state: ChannelState,
    tx: Sender<String>,
    rx: Receiver<String>,
}

impl InMemoryChannel {
    /// Create a connected pair of channel halves.
    pub fn pair() -> (InMemoryChannel, InMemoryChannel) {
        let (a_tx, b_rx) = channel();
        let (b_tx, a_rx) = channel();
        (
            InMemoryChannel {
                state: ChannelState::Open,
                tx: a_tx,
                rx: a_rx,
            },
            InMemoryChannel {
                state: ChannelState::Open,
                tx: b_tx,
                rx: b_rx,
            },
        )
    }

    pub fn set_state(&mut self, state: ChannelState) {
        self.state = state;
    }
}

impl DataChannel for InMemoryChannel {
    fn state(&self) -> ChannelState {
        self.state
    }

    fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.tx
            .send(payload.to_string())
            .map_err(|_| TransportError::SendFailed("in-memory peer gone".to_string()))
    }

    fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}
