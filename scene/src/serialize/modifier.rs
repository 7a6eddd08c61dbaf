//! Per-load id translation state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use redlilium_core::Guid;
use redlilium_core::pool::{PoolGuard, Poolable, SyncPool};

use super::ENGINE_BUILD;

static MODIFIER_POOL: SyncPool<Modifier> = SyncPool::new();

/// Takes a reset [`Modifier`] from the process-wide pool.
pub fn acquire_modifier() -> PoolGuard<'static, Modifier> {
    MODIFIER_POOL.acquire()
}

/// Translation state consulted by every id read.
///
/// Lookup order is the current prefab instance's mapping, then the base
/// mapping, then the id itself.
#[derive(Debug)]
pub struct Modifier {
    /// Build of the data currently being read.
    pub engine_build: u32,
    /// Base mapping for the whole load (clone remaps, replaced prefab roots).
    pub ids_mapping: HashMap<Guid, Guid>,
    pub(crate) instance_mapping: HashMap<Guid, Guid>,
    pub(crate) current_instance: Option<usize>,
    deprecated: AtomicBool,
}

impl Modifier {
    /// Translates a stored id into a live id.
    pub fn resolve(&self, id: Guid) -> Guid {
        if !id.is_valid() {
            return id;
        }
        self.instance_mapping
            .get(&id)
            .or_else(|| self.ids_mapping.get(&id))
            .copied()
            .unwrap_or(id)
    }

    /// Records that the data just read used an outdated layout.
    pub fn mark_deprecated(&self) {
        self.deprecated.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once any read was upgraded from an old layout.
    pub fn is_deprecated(&self) -> bool {
        self.deprecated.load(Ordering::Relaxed)
    }

    /// Index of the prefab instance whose mapping is loaded, if any.
    pub fn current_instance(&self) -> Option<usize> {
        self.current_instance
    }

    pub(crate) fn set_instance(&mut self, index: usize, mapping: &HashMap<Guid, Guid>) {
        self.current_instance = Some(index);
        self.instance_mapping.clone_from(mapping);
    }

    /// Copies translation state from `other`; the deprecated flag is kept.
    pub(crate) fn seed_from(&mut self, other: &Modifier) {
        self.engine_build = other.engine_build;
        self.ids_mapping.clone_from(&other.ids_mapping);
        self.instance_mapping.clone_from(&other.instance_mapping);
        self.current_instance = other.current_instance;
    }
}

impl Poolable for Modifier {
    fn new_empty() -> Self {
        Self {
            engine_build: ENGINE_BUILD,
            ids_mapping: HashMap::new(),
            instance_mapping: HashMap::new(),
            current_instance: None,
            deprecated: AtomicBool::new(false),
        }
    }

    fn reset(&mut self) {
        self.engine_build = ENGINE_BUILD;
        self.ids_mapping.clear();
        self.instance_mapping.clear();
        self.current_instance = None;
        *self.deprecated.get_mut() = false;
    }
}
