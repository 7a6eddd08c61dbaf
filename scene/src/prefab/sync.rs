//! Keeping prefab instances in step with their prefabs during a load.
//!
//! Runs over a [`SceneBatch`] in three passes:
//!
//! - [`setup_prefab_instances`]: groups linked objects into instance
//!   records and builds each record's prefab-object to scene-id mapping,
//!   including the records of nested prefabs.
//! - [`synchronize_new_prefab_instances`]: replaces instance roots that no
//!   longer match the prefab and spawns objects the prefab gained since
//!   the data was saved.
//! - [`synchronize_prefab_instances`]: after deserialization, re-parents
//!   instance objects to match the prefab, loads the synthesized objects
//!   and restores sibling order from the prefab's default instance.

use std::sync::Arc;

use redlilium_core::Guid;

use super::{Prefab, PrefabLibrary};
use crate::batch::{NewPrefabObject, SceneBatch};
use crate::factory;
use crate::hierarchy;
use crate::object::{ObjectRef, PrefabLink};
use crate::registry::objects;
use crate::serialize::{InstanceTables, guid_field, guid_list_field};

// ----------------------------------------------------------------------
// Instance discovery
// ----------------------------------------------------------------------

pub(crate) fn setup_prefab_instances(batch: &SceneBatch) {
    let library = Arc::clone(batch.context.library());
    let modifier = batch.context.lock_modifier();
    let mut tables = batch.context.lock_tables();

    for (index, element) in batch.data.iter().enumerate() {
        let (Some(prefab_id), Some(prefab_object_id), Some(raw_id)) = (
            guid_field(element, "PrefabID"),
            guid_field(element, "PrefabObjectID"),
            guid_field(element, "ID"),
        ) else {
            continue;
        };
        let prefab = match library.load(prefab_id) {
            Ok(prefab) => prefab,
            Err(err) => {
                log::warn!("Skipping prefab instance object {raw_id}: {err}");
                continue;
            }
        };
        let id = modifier.resolve(raw_id);
        let parent_id = guid_field(element, "ParentID")
            .map(|parent| modifier.resolve(parent))
            .unwrap_or(Guid::EMPTY);

        let joined = if prefab_object_id == prefab.root_id() {
            None
        } else {
            tables
                .instance_of(parent_id)
                .filter(|&i| tables.instances[i].prefab.id() == prefab_id)
        };
        let instance =
            joined.unwrap_or_else(|| tables.open_instance(Arc::clone(&prefab), id, index, None));
        map_instance_object(&mut tables, &library, instance, &prefab, prefab_object_id, id, index);
    }
    log::debug!("Found {} prefab instances", tables.instances.len());
}

/// Maps one object into `instance` and, when the prefab object itself
/// instances a nested prefab, into the matching nested record.
fn map_instance_object(
    tables: &mut InstanceTables,
    library: &PrefabLibrary,
    instance: usize,
    prefab: &Prefab,
    prefab_object_id: Guid,
    scene_id: Guid,
    index: usize,
) {
    let depth = tables.map_object(instance, prefab_object_id, scene_id);
    let Some(link) = prefab.nested_link(prefab_object_id) else {
        return;
    };
    let nested_prefab = match library.load(link.prefab_id) {
        Ok(prefab) => prefab,
        Err(err) => {
            log::warn!("Nested prefab of {scene_id} unavailable: {err}");
            return;
        }
    };
    let joined = if link.prefab_object_id == nested_prefab.root_id() {
        None
    } else {
        prefab
            .parent_of(prefab_object_id)
            .and_then(|parent_pid| tables.instances[instance].ids_mapping.get(&parent_pid).copied())
            .and_then(|parent_id| tables.instance_at(parent_id, depth + 1))
            .filter(|&i| tables.instances[i].prefab.id() == link.prefab_id)
    };
    let nested = joined.unwrap_or_else(|| {
        tables.open_instance(Arc::clone(&nested_prefab), scene_id, index, Some(instance))
    });
    map_instance_object(
        tables,
        library,
        nested,
        &nested_prefab,
        link.prefab_object_id,
        scene_id,
        index,
    );
}

// ----------------------------------------------------------------------
// New objects
// ----------------------------------------------------------------------

pub(crate) fn synchronize_new_prefab_instances(batch: &mut SceneBatch) {
    let library = Arc::clone(batch.context.library());
    let instance_count = batch.context.lock_tables().instances.len();
    for instance in 0..instance_count {
        replace_missing_root(batch, &library, instance);
    }

    for index in 0..batch.data_len() {
        let Some(object) = batch.objects[index].clone() else {
            continue;
        };
        let (id, link) = {
            let o = object.read();
            if !o.is_actor() {
                continue;
            }
            (o.id(), o.prefab_link())
        };
        if !link.is_valid() {
            continue;
        }
        let Some((instance, prefab)) = instance_with_prefab(batch, id, link.prefab_id) else {
            continue;
        };
        let removed = guid_list_field(&batch.data[index], "RemovedObjects");
        add_missing_children(batch, &library, instance, &prefab, link.prefab_object_id, &removed);
    }
}

fn instance_with_prefab(batch: &SceneBatch, id: Guid, prefab_id: Guid) -> Option<(usize, Arc<Prefab>)> {
    let tables = batch.context.lock_tables();
    let instance = tables.instance_of(id)?;
    let prefab = &tables.instances[instance].prefab;
    (prefab.id() == prefab_id).then(|| (instance, Arc::clone(prefab)))
}

/// Gives an outer instance a root matching the prefab's current root.
///
/// The saved root may have failed to spawn (its prefab object no longer
/// exists) or may no longer be the prefab's root. Either an existing
/// instance object that maps the new root is adopted, or a new one is
/// spawned. References to the old root then resolve to the replacement.
fn replace_missing_root(batch: &mut SceneBatch, library: &Arc<PrefabLibrary>, instance: usize) {
    let (prefab, old_root_id, root_index, existing) = {
        let tables = batch.context.lock_tables();
        let record = &tables.instances[instance];
        if record.parent_instance.is_some() {
            return;
        }
        let existing = record.ids_mapping.get(&record.prefab.root_id()).copied();
        (
            Arc::clone(&record.prefab),
            record.root_id,
            record.root_index,
            existing,
        )
    };
    let declared_root = prefab.root_id();
    let existing = existing.filter(|id| batch.find_local(*id).is_some());
    if existing.is_none() && batch.find_local(old_root_id).is_some() {
        return;
    }
    if existing == Some(old_root_id) {
        return;
    }
    let old_prefab_object_id =
        guid_field(&batch.data[root_index], "PrefabObjectID").unwrap_or(Guid::EMPTY);

    let (new_root_id, spawned_index) = match existing {
        Some(id) => (id, None),
        None => {
            let new_id = Guid::new();
            let spawned = {
                let mut modifier = batch.context.lock_modifier();
                factory::spawn_prefab_object(
                    &batch.context,
                    &mut modifier,
                    &prefab,
                    declared_root,
                    new_id,
                )
            };
            let object = match spawned {
                Ok(object) => object,
                Err(err) => {
                    log::warn!("Failed to rebuild root of prefab {} instance: {err}", prefab.id());
                    return;
                }
            };
            if batch.options.register {
                objects().register(&object);
            }
            (new_id, Some(batch.push_object(object)))
        }
    };
    log::warn!(
        "Prefab {} instance root {old_root_id} no longer matches the prefab; using {new_root_id}",
        prefab.id()
    );

    {
        let mut modifier = batch.context.lock_modifier();
        let mut tables = batch.context.lock_tables();
        for key in [old_root_id, old_prefab_object_id, declared_root] {
            if key.is_valid() {
                tables.instances[instance].ids_mapping.insert(key, new_root_id);
                modifier.ids_mapping.insert(key, new_root_id);
            }
        }
        let record = &mut tables.instances[instance];
        record.root_id = new_root_id;
        record.fix_root_parent = true;
        map_instance_object(
            &mut tables,
            library,
            instance,
            &prefab,
            declared_root,
            new_root_id,
            spawned_index.unwrap_or(root_index),
        );
    }

    if let Some(index) = spawned_index {
        batch.new_objects.push(NewPrefabObject {
            index,
            prefab: Arc::clone(&prefab),
            prefab_object_id: declared_root,
        });
        let removed = guid_list_field(&batch.data[root_index], "RemovedObjects");
        add_missing_children(batch, library, instance, &prefab, declared_root, &removed);
    }
}

/// Spawns every prefab child of `parent_pid` the instance does not have,
/// recursing into the new actors.
fn add_missing_children(
    batch: &mut SceneBatch,
    library: &Arc<PrefabLibrary>,
    instance: usize,
    prefab: &Arc<Prefab>,
    parent_pid: Guid,
    removed: &[Guid],
) {
    let children = prefab.children_of(parent_pid).to_vec();
    for child_pid in children {
        if removed.contains(&child_pid) || find_instance_object(batch, instance, child_pid).is_some() {
            continue;
        }
        let new_id = Guid::new();
        let spawned = {
            let mut modifier = batch.context.lock_modifier();
            factory::spawn_prefab_object(&batch.context, &mut modifier, prefab, child_pid, new_id)
        };
        let object = match spawned {
            Ok(object) => object,
            Err(err) => {
                log::warn!("Failed to add prefab object {child_pid} to instance: {err}");
                continue;
            }
        };
        if batch.options.register {
            objects().register(&object);
        }
        let is_actor = object.read().is_actor();
        let index = batch.push_object(object);
        {
            let mut tables = batch.context.lock_tables();
            map_instance_object(&mut tables, library, instance, prefab, child_pid, new_id, index);
        }
        batch.new_objects.push(NewPrefabObject {
            index,
            prefab: Arc::clone(prefab),
            prefab_object_id: child_pid,
        });
        log::debug!("Added prefab object {child_pid} as {new_id}");
        if is_actor {
            add_missing_children(batch, library, instance, prefab, child_pid, &[]);
        }
    }
}

/// Index of the object in `instance` linked to `prefab_object_id`.
///
/// The search starts at the instance's root element and wraps around.
fn find_instance_object(batch: &SceneBatch, instance: usize, prefab_object_id: Guid) -> Option<usize> {
    let tables = batch.context.lock_tables();
    let record = &tables.instances[instance];
    let count = batch.objects.len();
    let start = record.root_index.min(count);
    let wanted = PrefabLink::new(record.prefab.id(), prefab_object_id);
    (start..count).chain(0..start).find(|&index| {
        batch.objects[index].as_ref().is_some_and(|object| {
            let o = object.read();
            o.prefab_link() == wanted && tables.instance_of(o.id()) == Some(instance)
        })
    })
}

// ----------------------------------------------------------------------
// Post-deserialize synchronization
// ----------------------------------------------------------------------

pub(crate) fn synchronize_prefab_instances(batch: &mut SceneBatch) {
    let library = Arc::clone(batch.context.library());

    for index in 0..batch.data_len() {
        reparent_to_prefab(batch, index);
    }

    let new_objects = std::mem::take(&mut batch.new_objects);
    for entry in &new_objects {
        let Some(object) = batch.objects[entry.index].clone() else {
            continue;
        };
        if let Some(data) = entry.prefab.object_data(entry.prefab_object_id) {
            let result = {
                let mut modifier = batch.context.lock_modifier();
                factory::deserialize_prefab_data(
                    &batch.context,
                    &mut modifier,
                    &object,
                    &entry.prefab,
                    data,
                )
            };
            if let Err(err) = result {
                log::warn!("Failed to load prefab object {}: {err}", entry.prefab_object_id);
            }
        }
        object
            .write()
            .set_prefab_link(PrefabLink::new(entry.prefab.id(), entry.prefab_object_id));
        batch.link_object(entry.index, &object);
    }

    fix_replaced_roots(batch);
    restore_prefab_order(batch, &library);
}

/// Moves a pre-existing instance object under the parent its prefab
/// declares when the stored parent differs.
fn reparent_to_prefab(batch: &mut SceneBatch, index: usize) {
    let Some(object) = batch.objects[index].clone() else {
        return;
    };
    let (id, link, current_parent) = {
        let o = object.read();
        (o.id(), o.prefab_link(), o.parent_id())
    };
    if !link.is_valid() {
        return;
    }
    let declared_parent = {
        let tables = batch.context.lock_tables();
        let Some(instance) = tables.instance_of(id) else {
            return;
        };
        let record = &tables.instances[instance];
        if record.root_id == id || record.prefab.id() != link.prefab_id {
            return;
        }
        match record.prefab.parent_of(link.prefab_object_id) {
            Some(parent) => parent,
            None => return,
        }
    };
    let target_id = {
        let mut modifier = batch.context.lock_modifier();
        batch.context.setup_ids_mapping(id, 1, &mut modifier);
        modifier.resolve(declared_parent)
    };
    if target_id == current_parent {
        return;
    }
    let Some(target) = batch.find(target_id) else {
        return;
    };
    log::debug!("Re-parenting {id} to {target_id} to match prefab {}", link.prefab_id);
    if let Err(err) = hierarchy::set_parent(&object, Some(&target)) {
        log::warn!("{err}");
    }
}

/// Re-attaches replaced instance roots to the parent stored for the
/// original root.
fn fix_replaced_roots(batch: &mut SceneBatch) {
    let fixes: Vec<(Guid, usize)> = batch
        .context
        .lock_tables()
        .instances
        .iter()
        .filter(|record| record.fix_root_parent)
        .map(|record| (record.root_id, record.root_index))
        .collect();
    for (root_id, root_index) in fixes {
        let Some(root) = batch.find_local(root_id) else {
            continue;
        };
        let Some(stored_parent) = guid_field(&batch.data[root_index], "ParentID") else {
            continue;
        };
        let parent_id = batch.context.lock_modifier().resolve(stored_parent);
        match batch.find(parent_id) {
            Some(parent) => {
                if let Err(err) = hierarchy::set_parent(&root, Some(&parent)) {
                    log::warn!("{err}");
                }
            }
            None => log::warn!("Parent {parent_id} of replaced prefab root {root_id} is missing"),
        }
    }
}

/// Applies sibling order from each prefab's default instance.
fn restore_prefab_order(batch: &SceneBatch, library: &Arc<PrefabLibrary>) {
    let mut moves: Vec<(usize, ObjectRef)> = Vec::new();
    for object in batch.live_objects() {
        let (id, link) = {
            let o = object.read();
            (o.id(), o.prefab_link())
        };
        if !link.is_valid() {
            continue;
        }
        let prefab = {
            let tables = batch.context.lock_tables();
            let Some(instance) = tables.instance_of(id) else {
                continue;
            };
            let record = &tables.instances[instance];
            if record.root_id == id || record.prefab.id() != link.prefab_id {
                continue;
            }
            Arc::clone(&record.prefab)
        };
        match prefab.default_instance(library) {
            Ok(defaults) => {
                if let Some(order) = defaults.order_in_parent(link.prefab_object_id) {
                    moves.push((order, Arc::clone(object)));
                }
            }
            Err(err) => log::warn!("No default instance for prefab {}: {err}", prefab.id()),
        }
    }
    moves.sort_by_key(|(order, _)| *order);
    for (order, object) in moves {
        hierarchy::set_order_in_parent(&object, order);
    }
}
