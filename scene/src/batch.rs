//! A set of objects loaded together from one data array.
//!
//! Scene loads, subtree clones, prefab spawns and prefab default instances
//! all run the same pipeline over a [`SceneBatch`]:
//!
//! 1. spawn every element (allocation only)
//! 2. discover prefab instances
//! 3. create objects the prefabs gained since the data was saved
//! 4. deserialize fields, then link parents in array order
//! 5. re-synchronize instances with their prefabs
//!
//! The scene loader drives these steps one at a time under a time budget;
//! everything else calls [`SceneBatch::run_pipeline`].

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use redlilium_core::Guid;
use serde_json::{Map, Value};

use crate::SceneError;
use crate::factory;
use crate::hierarchy;
use crate::object::ObjectRef;
use crate::parallel::{ParConfig, par_map};
use crate::prefab::{DefaultInstance, Prefab, PrefabLibrary, sync};
use crate::registry::objects;
use crate::serialize::{SceneContext, guid_field};
use crate::settings::SceneSettings;
use crate::type_registry::types;

/// How a batch treats its objects.
#[derive(Debug, Clone)]
pub(crate) struct BatchOptions {
    /// Add objects to the global registry and resolve outside parents
    /// through it.
    pub register: bool,
    /// Replace objects of unknown types with placeholders.
    pub placeholders: bool,
    /// Element 0 is a scene root that adopts every element stored without
    /// a parent.
    pub scene_root: bool,
    pub parallel_spawn: bool,
    pub parallel_deserialize: bool,
    pub par: ParConfig,
}

impl BatchOptions {
    pub fn from_settings(settings: &SceneSettings) -> Self {
        Self {
            register: true,
            placeholders: settings.missing_object_placeholders,
            scene_root: true,
            parallel_spawn: settings.parallel_spawn,
            parallel_deserialize: settings.parallel_deserialize,
            par: settings.par_config(),
        }
    }

    /// Sequential, registered batch for clones and prefab spawns.
    pub fn registered() -> Self {
        Self {
            register: true,
            placeholders: true,
            scene_root: false,
            parallel_spawn: false,
            parallel_deserialize: false,
            par: ParConfig::default(),
        }
    }

    /// Sequential batch whose objects stay invisible to the registry.
    pub fn detached() -> Self {
        Self {
            register: false,
            ..Self::registered()
        }
    }
}

/// An object synthesized for a prefab instance during the batch.
#[derive(Debug)]
pub(crate) struct NewPrefabObject {
    pub index: usize,
    pub prefab: Arc<Prefab>,
    pub prefab_object_id: Guid,
}

pub(crate) struct SceneBatch {
    pub data: Vec<Map<String, Value>>,
    pub objects: Vec<Option<ObjectRef>>,
    pub lookup: HashMap<Guid, usize>,
    pub context: SceneContext,
    pub new_objects: Vec<NewPrefabObject>,
    pub options: BatchOptions,
}

impl SceneBatch {
    pub fn new(data: Vec<Map<String, Value>>, context: SceneContext, options: BatchOptions) -> Self {
        let count = data.len();
        Self {
            data,
            objects: vec![None; count],
            lookup: HashMap::with_capacity(count),
            context,
            new_objects: Vec::new(),
            options,
        }
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Object spawned (or synthesized) in this batch with the given id.
    pub fn find_local(&self, id: Guid) -> Option<ObjectRef> {
        self.lookup
            .get(&id)
            .and_then(|&index| self.objects[index].clone())
    }

    /// Batch lookup first, then the global registry for registered
    /// batches.
    pub fn find(&self, id: Guid) -> Option<ObjectRef> {
        self.find_local(id).or_else(|| {
            if self.options.register {
                objects().find(id)
            } else {
                None
            }
        })
    }

    pub fn insert_object(&mut self, index: usize, object: ObjectRef) {
        let id = object.read().id();
        self.lookup.insert(id, index);
        self.objects[index] = Some(object);
    }

    /// Appends an object that has no element in the data array.
    pub fn push_object(&mut self, object: ObjectRef) -> usize {
        let index = self.objects.len();
        self.objects.push(None);
        self.insert_object(index, object);
        index
    }

    pub fn live_objects(&self) -> impl Iterator<Item = &ObjectRef> {
        self.objects.iter().flatten()
    }

    // ------------------------------------------------------------------
    // Spawn
    // ------------------------------------------------------------------

    /// Spawns the root element strictly: any failure fails the batch.
    pub fn spawn_root(&mut self) -> Result<ObjectRef, SceneError> {
        let data = self
            .data
            .first()
            .ok_or_else(|| SceneError::InvalidStream("empty Data array".to_owned()))?;
        let object = self
            .context
            .with_modifier(|modifier| factory::spawn(&self.context, modifier, data))?;
        if self.options.register {
            objects().register(&object);
        }
        self.insert_object(0, Arc::clone(&object));
        Ok(object)
    }

    pub fn spawn_range(&mut self, range: Range<usize>) {
        let results = {
            let context = &self.context;
            let options = &self.options;
            let data = &self.data[range.clone()];
            if options.parallel_spawn && options.par.should_split(data.len()) {
                context.begin_async();
                let out = par_map(data, &options.par, |element| {
                    spawn_element(context, options, element)
                });
                context.end_async();
                out
            } else {
                data.iter()
                    .map(|element| spawn_element(context, options, element))
                    .collect::<Vec<_>>()
            }
        };
        for (offset, object) in results.into_iter().enumerate() {
            if let Some(object) = object {
                self.insert_object(range.start + offset, object);
            }
        }
    }

    // ------------------------------------------------------------------
    // Deserialize and link
    // ------------------------------------------------------------------

    pub fn deserialize_range(&mut self, range: Range<usize>) {
        let indices: Vec<usize> = range
            .filter(|&i| self.objects[i].is_some())
            .collect();
        let context = &self.context;
        let objects = &self.objects;
        let data = &self.data;
        let work = |&index: &usize| {
            if let Some(object) = &objects[index] {
                let result = context
                    .with_modifier(|modifier| factory::deserialize(context, modifier, object, &data[index]));
                if let Err(err) = result {
                    log::warn!(
                        "Failed to deserialize object {}: {err}",
                        factory::describe(&data[index])
                    );
                }
            }
        };
        if self.options.parallel_deserialize && self.options.par.should_split(indices.len()) {
            context.begin_async();
            par_map(&indices, &self.options.par, work);
            context.end_async();
        } else {
            indices.iter().for_each(work);
        }
    }

    /// Attaches every object in `range` to its stored parent, in order.
    pub fn link_range(&mut self, range: Range<usize>) {
        for index in range {
            if let Some(object) = self.objects[index].clone() {
                self.link_object(index, &object);
            }
        }
    }

    pub fn link_object(&mut self, index: usize, object: &ObjectRef) {
        let (id, parent_id, current) = {
            let o = object.read();
            (o.id(), o.parent_id(), o.parent())
        };
        if !parent_id.is_valid() {
            if current.is_none() {
                self.link_to_scene_root(index, object);
            }
            return;
        }
        if current.is_some_and(|p| p.read().id() == parent_id) {
            return;
        }
        if parent_id == id {
            log::warn!("Object {id} is its own parent; dropping it");
            self.drop_object(index);
            return;
        }
        let Some(parent) = self.find(parent_id) else {
            log::trace!("Parent {parent_id} of {id} is not loaded yet");
            return;
        };
        if let Err(err) = hierarchy::set_parent(object, Some(&parent)) {
            log::warn!("{err}; dropping object {id}");
            self.drop_object(index);
        }
    }

    /// Parentless data elements of a scene belong to the scene root.
    fn link_to_scene_root(&mut self, index: usize, object: &ObjectRef) {
        if !self.options.scene_root || index == 0 || index >= self.data.len() {
            return;
        }
        let Some(scene) = self.objects[0].clone() else {
            return;
        };
        let id = object.read().id();
        log::trace!("Object {id} has no stored parent; attaching it to the scene root");
        if let Err(err) = hierarchy::set_parent(object, Some(&scene)) {
            log::warn!("{err}; dropping object {id}");
            self.drop_object(index);
        }
    }

    pub fn drop_object(&mut self, index: usize) {
        if let Some(object) = self.objects.get_mut(index).and_then(Option::take) {
            let id = object.read().id();
            self.lookup.remove(&id);
            hierarchy::delete_object(&object);
        }
    }

    // ------------------------------------------------------------------
    // Finish
    // ------------------------------------------------------------------

    /// Initializes every surviving object. With `delete_orphans`, objects
    /// other than `root` that still have no parent are deleted first.
    pub fn initialize_objects(&mut self, root: Option<&ObjectRef>, delete_orphans: bool) {
        for index in 0..self.objects.len() {
            let Some(object) = self.objects[index].clone() else {
                continue;
            };
            if object.read().is_destroyed() {
                self.objects[index] = None;
                continue;
            }
            let is_root = root.is_some_and(|r| Arc::ptr_eq(r, &object));
            if delete_orphans && !is_root && object.read().parent().is_none() {
                let err = SceneError::MissingParent(object.read().id());
                log::warn!("{err}; deleting it");
                self.drop_object(index);
                continue;
            }
            object.write().initialize();
        }
    }

    /// Objects of the batch whose parent is not part of it.
    pub fn roots(&self) -> Vec<ObjectRef> {
        self.live_objects()
            .filter(|object| {
                let parent = object.read().parent();
                parent.is_none_or(|p| !self.lookup.contains_key(&p.read().id()))
            })
            .cloned()
            .collect()
    }

    /// Every step from spawn to prefab synchronization.
    pub fn run_pipeline(&mut self) {
        let count = self.data_len();
        self.spawn_range(0..count);
        self.finish_pipeline();
    }

    /// Every step after spawn, for batches that spawned their elements
    /// themselves.
    pub fn finish_pipeline(&mut self) {
        let count = self.data_len();
        sync::setup_prefab_instances(self);
        sync::synchronize_new_prefab_instances(self);
        self.deserialize_range(0..count);
        self.link_range(0..count);
        sync::synchronize_prefab_instances(self);
    }

    pub fn is_deprecated(&self) -> bool {
        self.context.is_deprecated()
    }
}

/// Spawns one element; failures are logged and may leave a placeholder.
fn spawn_element(
    context: &SceneContext,
    options: &BatchOptions,
    element: &Map<String, Value>,
) -> Option<ObjectRef> {
    let result = context.with_modifier(|modifier| factory::spawn(context, modifier, element));
    let object = match result {
        Ok(object) => object,
        Err(err) if options.placeholders && err.allows_placeholder() => {
            let raw_id = guid_field(element, "ID")?;
            let id = context.with_modifier(|modifier| modifier.resolve(raw_id));
            let type_name = element
                .get("TypeName")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let script = factory::looks_like_script(element);
            log::warn!(
                "Failed to spawn object {}: {err}; keeping a placeholder",
                factory::describe(element)
            );
            types().construct_placeholder(type_name, id, script)
        }
        Err(err) => {
            log::warn!("Failed to spawn object {}: {err}", factory::describe(element));
            return None;
        }
    };
    if options.register {
        objects().register(&object);
    }
    Some(object)
}

/// Instances `prefab` into unregistered objects with fresh ids.
pub(crate) fn build_default_instance(
    prefab: &Prefab,
    library: &Arc<PrefabLibrary>,
) -> Result<DefaultInstance, SceneError> {
    let context = SceneContext::new(Arc::clone(library), prefab.engine_build());
    let mut prefab_ids = Vec::with_capacity(prefab.object_count());
    {
        let mut modifier = context.lock_modifier();
        for data in prefab.objects() {
            let prefab_object_id = guid_field(data, "ID").unwrap_or(Guid::EMPTY);
            prefab_ids.push(prefab_object_id);
            modifier.ids_mapping.insert(prefab_object_id, Guid::new());
        }
    }
    let mut batch = SceneBatch::new(prefab.objects().to_vec(), context, BatchOptions::detached());
    batch.run_pipeline();

    let mut objects = HashMap::with_capacity(prefab_ids.len());
    for (index, prefab_object_id) in prefab_ids.into_iter().enumerate() {
        if let Some(object) = &batch.objects[index] {
            objects.insert(prefab_object_id, Arc::clone(object));
        }
    }
    let root = objects
        .get(&prefab.root_id())
        .cloned()
        .ok_or(SceneError::MissingPrefabObject {
            prefab: prefab.id(),
            object: prefab.root_id(),
        })?;
    hierarchy::update_world_transforms(&root);
    log::debug!(
        "Built default instance of prefab {} ({} objects)",
        prefab.id(),
        objects.len()
    );
    Ok(DefaultInstance::new(root, objects))
}
