//! Meshboard Core Library
//!
//! Data model, merge engine, geometry and peer transport for the meshboard
//! collaborative diagram editor.

pub mod connector;
pub mod document;
pub mod element;
pub mod merge;
pub mod presence;
pub mod selection;
pub mod session;
pub mod storage;
pub mod transform;
pub mod transport;

pub use document::{DiagramState, Document};
pub use element::{
    ArrowDirection, Connection, Element, ElementId, ElementKind, ElementStyle, Rgba, Side,
    Versioned,
};
pub use merge::merge;
pub use presence::{CursorPosition, PeerPresence, PresenceMap};
pub use session::{Session, Tool};
pub use storage::{DiagramStore, MemoryStore, StorageError, StoredDiagram};
pub use transform::Gesture;
pub use transport::{ClientSignal, MeshMessage, PeerInfo, PeerMesh, ServerSignal};
