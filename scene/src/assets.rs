//! Storage backends for scene and prefab documents.
//!
//! Documents are addressed by id. [`MemorySource`] keeps them in memory
//! (tests, generated content); [`DirectorySource`] stores one
//! `<id>.json` file per document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use redlilium_core::Guid;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by an [`AssetSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("asset {0} not found")]
    NotFound(Guid),
    #[error("asset source is read-only")]
    ReadOnly,
    #[error("asset {id} is malformed: {message}")]
    Format { id: Guid, message: String },
    #[error("IO error for asset {id}: {message}")]
    Io { id: Guid, message: String },
}

/// A store of JSON documents keyed by id.
pub trait AssetSource: Send + Sync {
    fn load_json(&self, id: Guid) -> Result<Value, AssetError>;

    fn save_json(&self, _id: Guid, _document: &Value) -> Result<(), AssetError> {
        Err(AssetError::ReadOnly)
    }

    fn contains(&self, id: Guid) -> bool;

    fn is_read_only(&self) -> bool {
        false
    }
}

/// In-memory document store.
///
/// Clones share the same storage, so a test can keep a handle while the
/// library owns another.
#[derive(Clone, Default)]
pub struct MemorySource {
    documents: Arc<RwLock<HashMap<Guid, String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `document` under `id`, replacing any previous one.
    pub fn insert(&self, id: Guid, document: &Value) {
        self.documents.write().insert(id, document.to_string());
    }

    /// Stores raw text, which need not be valid JSON.
    pub fn insert_text(&self, id: Guid, text: impl Into<String>) {
        self.documents.write().insert(id, text.into());
    }

    pub fn text(&self, id: Guid) -> Option<String> {
        self.documents.read().get(&id).cloned()
    }

    pub fn remove(&self, id: Guid) -> Option<String> {
        self.documents.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

impl AssetSource for MemorySource {
    fn load_json(&self, id: Guid) -> Result<Value, AssetError> {
        let documents = self.documents.read();
        let text = documents.get(&id).ok_or(AssetError::NotFound(id))?;
        serde_json::from_str(text).map_err(|e| AssetError::Format {
            id,
            message: e.to_string(),
        })
    }

    fn save_json(&self, id: Guid, document: &Value) -> Result<(), AssetError> {
        let text = serde_json::to_string_pretty(document).map_err(|e| AssetError::Format {
            id,
            message: e.to_string(),
        })?;
        self.documents.write().insert(id, text);
        Ok(())
    }

    fn contains(&self, id: Guid) -> bool {
        self.documents.read().contains_key(&id)
    }
}

/// Documents stored as `<root>/<id>.json`.
pub struct DirectorySource {
    root: PathBuf,
    read_only: bool,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
        }
    }

    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: Guid) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

impl AssetSource for DirectorySource {
    fn load_json(&self, id: Guid) -> Result<Value, AssetError> {
        let path = self.path_of(id);
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssetError::NotFound(id),
            _ => AssetError::Io {
                id,
                message: e.to_string(),
            },
        })?;
        serde_json::from_str(&text).map_err(|e| AssetError::Format {
            id,
            message: e.to_string(),
        })
    }

    fn save_json(&self, id: Guid, document: &Value) -> Result<(), AssetError> {
        if self.read_only {
            return Err(AssetError::ReadOnly);
        }
        let io = |e: std::io::Error| AssetError::Io {
            id,
            message: e.to_string(),
        };
        let text = serde_json::to_string_pretty(document).map_err(|e| AssetError::Format {
            id,
            message: e.to_string(),
        })?;
        std::fs::create_dir_all(&self.root).map_err(io)?;
        std::fs::write(self.path_of(id), text).map_err(io)
    }

    fn contains(&self, id: Guid) -> bool {
        self.path_of(id).is_file()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn memory_source_round_trip() {
        let source = MemorySource::new();
        let id = Guid::new();
        assert_eq!(source.load_json(id), Err(AssetError::NotFound(id)));
        source.save_json(id, &json!({ "a": 1 })).unwrap();
        assert!(source.contains(id));
        assert_eq!(source.load_json(id).unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn memory_source_reports_bad_json() {
        let source = MemorySource::new();
        let id = Guid::new();
        source.insert_text(id, "{ not json");
        assert!(matches!(source.load_json(id), Err(AssetError::Format { .. })));
    }

    #[test]
    fn clones_share_storage() {
        let source = MemorySource::new();
        let other = source.clone();
        source.insert(Guid::new(), &json!({}));
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn directory_source_round_trip() {
        let root = std::env::temp_dir().join(format!("redlilium-scene-{}", Guid::new()));
        let source = DirectorySource::new(&root);
        let id = Guid::new();
        assert_eq!(source.load_json(id), Err(AssetError::NotFound(id)));
        source.save_json(id, &json!({ "b": [1, 2] })).unwrap();
        assert!(source.contains(id));
        assert_eq!(source.load_json(id).unwrap(), json!({ "b": [1, 2] }));

        let read_only = DirectorySource::read_only(&root);
        assert_eq!(read_only.save_json(id, &json!({})), Err(AssetError::ReadOnly));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
