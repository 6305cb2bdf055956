//! Ephemeral per-peer presence.
//!
//! Presence is volatile display state (cursor, in-progress element,
//! selection, identity color). It is replaced wholesale on every receive
//! and never versioned, merged or persisted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementId};

/// Cursor position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// The presence payload one peer broadcasts about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerPresence {
    pub peer_id: String,
    pub peer_name: String,
    pub peer_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    /// The element currently being drawn, for live preview on other peers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_element: Option<Element>,
    #[serde(default)]
    pub selected_element_ids: Vec<ElementId>,
    #[serde(default)]
    pub is_drawing: bool,
    /// Sender-side counter, informational only. Presence is last-arrival-
    /// wins; this is never compared the way record versions are.
    #[serde(default)]
    pub version: u64,
}

impl PeerPresence {
    pub fn new(peer_id: String, peer_name: String, peer_color: String) -> Self {
        Self {
            peer_id,
            peer_name,
            peer_color,
            cursor: None,
            current_element: None,
            selected_element_ids: Vec::new(),
            is_drawing: false,
            version: 0,
        }
    }
}

/// Replace-on-receive cache of remote peer presence, keyed by peer id.
#[derive(Debug, Default)]
pub struct PresenceMap {
    peers: HashMap<String, PeerPresence>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a received presence payload, replacing any previous one.
    pub fn update(&mut self, presence: PeerPresence) {
        self.peers.insert(presence.peer_id.clone(), presence);
    }

    /// Forget a departed peer.
    pub fn remove(&mut self, peer_id: &str) -> Option<PeerPresence> {
        self.peers.remove(peer_id)
    }

    pub fn get(&self, peer_id: &str) -> Option<&PeerPresence> {
        self.peers.get(peer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerPresence> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(id: &str, x: f64) -> PeerPresence {
        let mut p = PeerPresence::new(id.to_string(), "anon".to_string(), "#ff0000".to_string());
        p.cursor = Some(CursorPosition { x, y: 0.0 });
        p
    }

    #[test]
    fn test_replace_on_receive() {
        let mut map = PresenceMap::new();
        map.update(presence("a", 1.0));
        map.update(presence("a", 2.0));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a").unwrap().cursor.unwrap().x, 2.0);
    }

    #[test]
    fn test_remove_departed_peer() {
        let mut map = PresenceMap::new();
        map.update(presence("a", 1.0));
        map.update(presence("b", 1.0));
        assert!(map.remove("a").is_some());
        assert!(map.get("a").is_none());
        assert_eq!(map.len(), 1);
    }
}
