//! Storage abstraction for diagram persistence.
//!
//! The editing core treats persistence as an external collaborator: it
//! hands over the full reconciled state and trusts the store to keep it.
//! Everything here is synchronous; nothing in the core blocks on I/O.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::DiagramState;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("diagram not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A persisted diagram: title plus both record collections, tombstones
/// included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDiagram {
    pub title: String,
    pub state: DiagramState,
}

/// Trait for diagram storage backends.
pub trait DiagramStore: Send + Sync {
    /// Save a diagram, overwriting any previous save under the same id.
    fn save(&mut self, id: &str, diagram: &StoredDiagram) -> StorageResult<()>;

    /// Load a diagram.
    fn load(&self, id: &str) -> StorageResult<StoredDiagram>;

    /// Delete a diagram.
    fn delete(&mut self, id: &str) -> StorageResult<()>;

    /// List all stored diagram ids.
    fn list(&self) -> StorageResult<Vec<String>>;

    /// Check if a diagram exists.
    fn exists(&self, id: &str) -> bool;
}

/// In-memory store for tests and ephemeral sessions. Keeps the serialized
/// form so the full encode/decode path is exercised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    diagrams: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagramStore for MemoryStore {
    fn save(&mut self, id: &str, diagram: &StoredDiagram) -> StorageResult<()> {
        let json = serde_json::to_string(diagram)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.diagrams.insert(id.to_string(), json);
        Ok(())
    }

    fn load(&self, id: &str) -> StorageResult<StoredDiagram> {
        let json = self
            .diagrams
            .get(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn delete(&mut self, id: &str) -> StorageResult<()> {
        self.diagrams
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        Ok(self.diagrams.keys().cloned().collect())
    }

    fn exists(&self, id: &str) -> bool {
        self.diagrams.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, ElementKind};

    fn diagram_with_one_rect() -> (StoredDiagram, crate::element::ElementId) {
        let element = Element::new(ElementKind::Rectangle, 0.0, 0.0, 100.0, 100.0);
        let id = element.id;
        let mut state = DiagramState::default();
        state.elements.insert(id, element);
        (
            StoredDiagram {
                title: "untitled".to_string(),
                state,
            },
            id,
        )
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut store = MemoryStore::new();
        let (diagram, id) = diagram_with_one_rect();
        store.save("d1", &diagram).unwrap();

        let loaded = store.load("d1").unwrap();
        assert_eq!(loaded.title, "untitled");
        let element = &loaded.state.elements[&id];
        assert_eq!(element.version, diagram.state.elements[&id].version);
    }

    #[test]
    fn test_tombstones_survive_persistence() {
        let mut store = MemoryStore::new();
        let (mut diagram, id) = diagram_with_one_rect();
        diagram.state.elements.get_mut(&id).unwrap().is_deleted = true;
        store.save("d1", &diagram).unwrap();

        let loaded = store.load("d1").unwrap();
        assert!(loaded.state.elements[&id].is_deleted);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.load("nope"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_delete_and_list() {
        let mut store = MemoryStore::new();
        let (diagram, _) = diagram_with_one_rect();
        store.save("d1", &diagram).unwrap();
        store.save("d2", &diagram).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);

        store.delete("d1").unwrap();
        assert!(!store.exists("d1"));
        assert!(store.exists("d2"));
    }
}
