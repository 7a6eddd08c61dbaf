//! Shared state for one load, clone or spawn batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::ThreadId;

use parking_lot::{Mutex, MutexGuard};
use redlilium_core::Guid;
use redlilium_core::pool::PoolGuard;

use super::{Modifier, acquire_modifier};
use crate::prefab::{Prefab, PrefabLibrary};

/// One prefab instance discovered in the batch.
#[derive(Debug)]
pub struct PrefabInstanceRecord {
    pub prefab: Arc<Prefab>,
    /// Scene id of the instance root.
    pub root_id: Guid,
    /// Index in the stream of the element that opened the instance.
    pub root_index: usize,
    /// Prefab-object id (and replaced ids) to scene id.
    pub ids_mapping: HashMap<Guid, Guid>,
    /// The root was replaced and must be re-attached to the stored parent.
    pub fix_root_parent: bool,
    /// Enclosing instance when this one is nested.
    pub parent_instance: Option<usize>,
}

/// Instance records plus the per-object chain of instances, ordered from
/// the outermost prefab to the innermost nested one.
#[derive(Debug, Default)]
pub struct InstanceTables {
    pub instances: Vec<PrefabInstanceRecord>,
    pub object_to_instance: HashMap<Guid, Vec<usize>>,
}

impl InstanceTables {
    /// Outermost instance containing `id`.
    pub fn instance_of(&self, id: Guid) -> Option<usize> {
        self.object_to_instance
            .get(&id)
            .and_then(|chain| chain.first())
            .copied()
    }

    /// Instance at nesting `depth` (0 = outermost) containing `id`.
    pub fn instance_at(&self, id: Guid, depth: usize) -> Option<usize> {
        self.object_to_instance
            .get(&id)
            .and_then(|chain| chain.get(depth))
            .copied()
    }

    pub fn open_instance(
        &mut self,
        prefab: Arc<Prefab>,
        root_id: Guid,
        root_index: usize,
        parent_instance: Option<usize>,
    ) -> usize {
        self.instances.push(PrefabInstanceRecord {
            prefab,
            root_id,
            root_index,
            ids_mapping: HashMap::new(),
            fix_root_parent: false,
            parent_instance,
        });
        self.instances.len() - 1
    }

    /// Maps `prefab_object_id` to `scene_id` inside `instance` and returns
    /// the depth of `instance` in the object's chain.
    pub fn map_object(&mut self, instance: usize, prefab_object_id: Guid, scene_id: Guid) -> usize {
        self.instances[instance]
            .ids_mapping
            .insert(prefab_object_id, scene_id);
        let chain = self.object_to_instance.entry(scene_id).or_default();
        match chain.iter().position(|&i| i == instance) {
            Some(depth) => depth,
            None => {
                chain.push(instance);
                chain.len() - 1
            }
        }
    }
}

/// State shared by every stage of a batch.
///
/// Outside parallel sections all reads go through the primary modifier.
/// While the context is async, each worker thread lazily forks a private
/// modifier seeded from the primary; [`SceneContext::end_async`] folds them
/// back in.
pub struct SceneContext {
    primary: Mutex<PoolGuard<'static, Modifier>>,
    thread_modifiers: Mutex<HashMap<ThreadId, PoolGuard<'static, Modifier>>>,
    is_async: AtomicBool,
    tables: Mutex<InstanceTables>,
    library: Arc<PrefabLibrary>,
    deprecated: AtomicBool,
}

impl SceneContext {
    pub fn new(library: Arc<PrefabLibrary>, engine_build: u32) -> Self {
        let mut primary = acquire_modifier();
        primary.engine_build = engine_build;
        Self {
            primary: Mutex::new(primary),
            thread_modifiers: Mutex::new(HashMap::new()),
            is_async: AtomicBool::new(false),
            tables: Mutex::new(InstanceTables::default()),
            library,
            deprecated: AtomicBool::new(false),
        }
    }

    pub fn library(&self) -> &Arc<PrefabLibrary> {
        &self.library
    }

    /// Locks the primary modifier. Lock order is modifier before tables.
    pub fn lock_modifier(&self) -> MutexGuard<'_, PoolGuard<'static, Modifier>> {
        self.primary.lock()
    }

    pub fn lock_tables(&self) -> MutexGuard<'_, InstanceTables> {
        self.tables.lock()
    }

    /// Runs `f` with the modifier that belongs to the calling thread.
    pub fn with_modifier<R>(&self, f: impl FnOnce(&mut Modifier) -> R) -> R {
        if !self.is_async.load(Ordering::Acquire) {
            let mut primary = self.primary.lock();
            return f(&mut **primary);
        }
        let thread = std::thread::current().id();
        let cached = self.thread_modifiers.lock().remove(&thread);
        let mut modifier = cached.unwrap_or_else(|| self.fork_modifier());
        let result = f(&mut *modifier);
        self.thread_modifiers.lock().insert(thread, modifier);
        result
    }

    fn fork_modifier(&self) -> PoolGuard<'static, Modifier> {
        let mut modifier = acquire_modifier();
        modifier.seed_from(&**self.primary.lock());
        modifier
    }

    pub fn begin_async(&self) {
        self.is_async.store(true, Ordering::Release);
    }

    /// Leaves the parallel section and returns the worker modifiers to the
    /// pool, keeping their deprecated flags.
    pub fn end_async(&self) {
        self.is_async.store(false, Ordering::Release);
        for (_, modifier) in self.thread_modifiers.lock().drain() {
            if modifier.is_deprecated() {
                self.deprecated.store(true, Ordering::Relaxed);
            }
        }
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated.load(Ordering::Relaxed) || self.primary.lock().is_deprecated()
    }

    /// Points `modifier` at the instance mapping for `object_id` at nesting
    /// `level` (0 and 1 both select the outermost instance).
    ///
    /// Objects outside any instance read with the base mapping only. The
    /// mapping is reloaded only when the selected instance changes.
    pub fn setup_ids_mapping(&self, object_id: Guid, level: usize, modifier: &mut Modifier) {
        let tables = self.tables.lock();
        let Some(chain) = tables.object_to_instance.get(&object_id) else {
            if modifier.current_instance.take().is_some() {
                modifier.instance_mapping.clear();
            }
            return;
        };
        let depth = level.saturating_sub(1);
        let Some(&index) = chain.get(depth).or_else(|| chain.last()) else {
            return;
        };
        if modifier.current_instance == Some(index) {
            return;
        }
        modifier.set_instance(index, &tables.instances[index].ids_mapping);
    }
}
