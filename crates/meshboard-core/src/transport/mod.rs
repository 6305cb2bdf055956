//! Peer transport: wire protocol, mesh channel registry and the signaling
//! client.
//!
//! Two message planes. The signaling plane (`ClientSignal`/`ServerSignal`)
//! runs over a WebSocket to the rendezvous server and only brokers peer
//! discovery and channel negotiation. The data plane (`MeshMessage`) runs
//! over the full-mesh peer channels and carries document state and
//! presence. All wire messages are JSON with a `type` tag.

mod mesh;

#[cfg(not(target_arch = "wasm32"))]
mod signaling;

pub use mesh::{ChannelState, DataChannel, InMemoryChannel, PeerMesh, TransportError};

#[cfg(not(target_arch = "wasm32"))]
pub use signaling::{SignalEvent, SignalState, SignalingClient};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::{Connection, Element, ElementId};
use crate::presence::PeerPresence;

/// Identity of a peer as assigned by the signaling server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub peer_id: String,
    pub name: String,
    pub color: String,
}

/// Messages sent to the signaling server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientSignal {
    /// Join the rendezvous room for a diagram.
    Join { diagram_id: String, token: String },
    /// Session offer for one peer, relayed verbatim.
    Offer { to: String, sdp: String },
    /// Session answer for one peer.
    Answer { to: String, sdp: String },
    /// Connectivity candidate for one peer.
    Candidate { to: String, candidate: String },
    /// Leave the current room.
    Leave,
}

/// Messages received from the signaling server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerSignal {
    /// Join confirmed: the assigned identity plus everyone already present.
    Welcome {
        peer_id: String,
        name: String,
        color: String,
        peers: Vec<PeerInfo>,
    },
    /// A new peer joined the room.
    PeerJoined { peer: PeerInfo },
    /// A peer left the room.
    PeerLeft { peer_id: String },
    /// Relayed session offer.
    Offer { from: String, sdp: String },
    /// Relayed session answer.
    Answer { from: String, sdp: String },
    /// Relayed connectivity candidate.
    Candidate { from: String, candidate: String },
    /// Error message (before a welcome, this means the join was refused).
    Error { message: String },
}

/// Messages exchanged over the peer data channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshMessage {
    /// Full snapshot of both record collections. Always the complete
    /// state, never a delta, so arrival order and duplication are safe.
    StateSync {
        elements: HashMap<ElementId, Element>,
        connections: HashMap<ElementId, Connection>,
    },
    /// Presence update, replaced wholesale on receive.
    PeerSync {
        #[serde(flatten)]
        presence: PeerPresence,
    },
}
