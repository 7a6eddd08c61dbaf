//! Copying object subtrees through the binary clone stream.
//!
//! [`serialize_objects`] packs subtrees (the same per-object JSON a scene
//! save produces, plus each object's order in its parent).
//! [`deserialize_objects`] spawns them again with a caller-supplied id
//! mapping; [`clone_objects`] does both with fresh ids so references
//! between the copied objects point at the copies.

use std::collections::HashMap;
use std::sync::Arc;

use redlilium_core::Guid;

use crate::SceneError;
use crate::batch::{BatchOptions, SceneBatch};
use crate::hierarchy;
use crate::object::ObjectRef;
use crate::prefab::PrefabLibrary;
use crate::save::SaveContext;
use crate::serialize::{
    ENGINE_BUILD, MIN_SUPPORTED_ENGINE_BUILD, SceneContext, check_engine_build,
    decode_clone_stream, encode_clone_stream,
};

/// Packs the subtrees under `roots` into a clone stream.
pub fn serialize_objects(
    roots: &[ObjectRef],
    library: &Arc<PrefabLibrary>,
) -> Result<Vec<u8>, SceneError> {
    let mut ctx = SaveContext::new(library);
    let mut ids = Vec::new();
    let mut records = Vec::new();
    for root in roots {
        for object in hierarchy::collect_subtree(root) {
            let order = hierarchy::order_in_parent(&object)
                .and_then(|order| i32::try_from(order).ok())
                .unwrap_or(-1);
            ids.push(object.read().id());
            records.push((ctx.serialize_object(&object)?, order));
        }
    }
    encode_clone_stream(ENGINE_BUILD, &ids, &records)
}

/// Spawns the objects of a clone stream and returns the new roots.
///
/// Stored ids found in `ids_mapping` are replaced by their mapped value;
/// other ids are kept. Roots attach to their stored parent when it is
/// alive and start playing if that parent is playing.
pub fn deserialize_objects(
    bytes: &[u8],
    library: &Arc<PrefabLibrary>,
    ids_mapping: &HashMap<Guid, Guid>,
) -> Result<Vec<ObjectRef>, SceneError> {
    let stream = decode_clone_stream(bytes)?;
    check_engine_build(stream.engine_build, MIN_SUPPORTED_ENGINE_BUILD)?;

    let context = SceneContext::new(Arc::clone(library), stream.engine_build);
    context
        .lock_modifier()
        .ids_mapping
        .extend(ids_mapping.iter().map(|(k, v)| (*k, *v)));
    let orders = stream.orders;
    let mut batch = SceneBatch::new(stream.objects, context, BatchOptions::registered());
    batch.run_pipeline();
    batch.initialize_objects(None, false);

    let roots = batch.roots();
    for (index, order) in orders.iter().enumerate() {
        let Some(object) = batch.objects.get(index).and_then(Option::as_ref) else {
            continue;
        };
        if roots.iter().any(|root| Arc::ptr_eq(root, object)) {
            continue;
        }
        if let Ok(order) = usize::try_from(*order) {
            hierarchy::set_order_in_parent(object, order);
        }
    }
    for root in &roots {
        hierarchy::update_world_transforms(root);
        let parent_playing = root.read().parent().is_some_and(|p| p.read().is_playing());
        if parent_playing {
            hierarchy::begin_play_tree(root);
        }
    }
    log::debug!(
        "Deserialized {} objects ({} roots) from clone stream",
        batch.live_objects().count(),
        roots.len()
    );
    Ok(roots)
}

/// Duplicates the subtrees under `roots` with fresh ids.
pub fn clone_objects(
    roots: &[ObjectRef],
    library: &Arc<PrefabLibrary>,
) -> Result<Vec<ObjectRef>, SceneError> {
    let mut mapping = HashMap::new();
    for root in roots {
        for object in hierarchy::collect_subtree(root) {
            mapping.insert(object.read().id(), Guid::new());
        }
    }
    let bytes = serialize_objects(roots, library)?;
    deserialize_objects(&bytes, library, &mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use crate::hierarchy::set_parent;
    use crate::type_registry::{ACTOR_TYPE, types};

    fn library() -> Arc<PrefabLibrary> {
        Arc::new(PrefabLibrary::new(Arc::new(MemorySource::new())))
    }

    fn named(name: &str) -> ObjectRef {
        let object = types().construct(ACTOR_TYPE, Guid::new()).unwrap();
        object.write().actor_mut().unwrap().name = name.to_owned();
        object
    }

    #[test]
    fn clone_keeps_shape_and_order_with_new_ids() {
        let parent = named("Parent");
        let root = named("Root");
        let kids: Vec<_> = ["A", "B", "C"].iter().map(|n| named(n)).collect();
        set_parent(&root, Some(&parent)).unwrap();
        for kid in &kids {
            set_parent(kid, Some(&root)).unwrap();
        }
        hierarchy::register_tree(&parent);

        let library = library();
        let copies = clone_objects(std::slice::from_ref(&root), &library).unwrap();
        assert_eq!(copies.len(), 1);
        let copy = &copies[0];
        assert_ne!(copy.read().id(), root.read().id());
        assert_eq!(copy.read().name(), "Root");
        let names: Vec<String> = copy
            .read()
            .children()
            .iter()
            .map(|c| c.read().name().to_owned())
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(parent.read().children().len(), 2);
        assert!(copy.read().is_initialized());
    }

    #[test]
    fn stream_without_mapping_keeps_ids() {
        let root = named("Solo");
        let library = library();
        let bytes = serialize_objects(std::slice::from_ref(&root), &library).unwrap();
        let id = root.read().id();
        hierarchy::delete_object(&root);
        let restored = deserialize_objects(&bytes, &library, &HashMap::new()).unwrap();
        assert_eq!(restored[0].read().id(), id);
    }

    #[test]
    fn corrupt_stream_is_rejected() {
        let library = library();
        assert!(matches!(
            deserialize_objects(&[1, 2, 3], &library, &HashMap::new()),
            Err(SceneError::InvalidStream(_))
        ));
    }
}
