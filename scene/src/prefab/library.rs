//! Cache of loaded prefabs.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use redlilium_core::Guid;
use serde_json::Value;

use super::Prefab;
use crate::SceneError;
use crate::assets::{AssetError, AssetSource};

/// Loads prefabs from an [`AssetSource`] and keeps them cached by id.
///
/// Loading a prefab also loads every prefab it nests, so a circular chain
/// is rejected up front.
pub struct PrefabLibrary {
    source: Arc<dyn AssetSource>,
    cache: RwLock<HashMap<Guid, Arc<Prefab>>>,
}

impl PrefabLibrary {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &Arc<dyn AssetSource> {
        &self.source
    }

    pub fn load(&self, id: Guid) -> Result<Arc<Prefab>, SceneError> {
        let mut stack = Vec::new();
        self.load_checked(id, &mut stack)
    }

    fn load_checked(&self, id: Guid, stack: &mut Vec<Guid>) -> Result<Arc<Prefab>, SceneError> {
        if stack.contains(&id) {
            return Err(SceneError::CircularPrefabReference(id));
        }
        if let Some(prefab) = self.cache.read().get(&id) {
            return Ok(Arc::clone(prefab));
        }
        if !id.is_valid() {
            return Err(SceneError::MissingPrefab(id));
        }

        let document = self.source.load_json(id).map_err(|err| match err {
            AssetError::NotFound(_) => SceneError::MissingPrefab(id),
            other => SceneError::PrefabLoadFailed {
                id,
                reason: other.to_string(),
            },
        })?;
        let prefab = Prefab::from_json(id, &document).map_err(|err| SceneError::PrefabLoadFailed {
            id,
            reason: err.to_string(),
        })?;

        stack.push(id);
        for nested in prefab.nested_prefab_ids() {
            self.load_checked(nested, stack).map_err(|err| match err {
                SceneError::CircularPrefabReference(_) => err,
                other => SceneError::PrefabLoadFailed {
                    id,
                    reason: format!("nested prefab {nested}: {other}"),
                },
            })?;
        }
        stack.pop();

        log::debug!(
            "Loaded prefab {id} ({} objects, build {})",
            prefab.object_count(),
            prefab.engine_build()
        );
        let mut cache = self.cache.write();
        Ok(Arc::clone(cache.entry(id).or_insert_with(|| Arc::new(prefab))))
    }

    pub fn is_loaded(&self, id: Guid) -> bool {
        self.cache.read().contains_key(&id)
    }

    /// Drops the cached copy so the next load re-reads the source.
    pub fn reload(&self, id: Guid) -> bool {
        self.cache.write().remove(&id).is_some()
    }

    /// Writes a prefab document and invalidates the cached copy.
    pub fn save(&self, id: Guid, document: &Value) -> Result<(), SceneError> {
        self.source.save_json(id, document)?;
        self.reload(id);
        Ok(())
    }
}
