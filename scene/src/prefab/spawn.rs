//! Instantiating a prefab into a live scene outside of a scene load.

use std::sync::Arc;

use redlilium_core::Guid;
use serde_json::{Map, Value};

use super::PrefabLibrary;
use crate::SceneError;
use crate::batch::{BatchOptions, SceneBatch};
use crate::hierarchy;
use crate::object::ObjectRef;
use crate::serialize::{ENGINE_BUILD, SceneContext};

/// Instantiates prefab `prefab_id` under `parent` with fresh ids.
///
/// The new objects are registered and initialized, and begin play when
/// the parent is playing.
pub fn spawn_prefab(
    library: &Arc<PrefabLibrary>,
    prefab_id: Guid,
    parent: Option<&ObjectRef>,
) -> Result<ObjectRef, SceneError> {
    if let Some(parent) = parent
        && !parent.read().is_actor()
    {
        return Err(SceneError::InvalidArgument(
            "prefab parent must be an actor".to_owned(),
        ));
    }
    let prefab = library.load(prefab_id)?;

    let id = Guid::new();
    let mut element = Map::new();
    element.insert("ID".to_owned(), Value::String(id.to_string()));
    element.insert("PrefabID".to_owned(), Value::String(prefab_id.to_string()));
    element.insert(
        "PrefabObjectID".to_owned(),
        Value::String(prefab.root_id().to_string()),
    );

    let context = SceneContext::new(Arc::clone(library), ENGINE_BUILD);
    let mut batch = SceneBatch::new(vec![element], context, BatchOptions::registered());
    let root = batch.spawn_root()?;
    batch.finish_pipeline();
    if let Some(parent) = parent
        && let Err(err) = hierarchy::set_parent(&root, Some(parent))
    {
        for object in batch.live_objects() {
            hierarchy::delete_object(object);
        }
        return Err(err);
    }
    batch.initialize_objects(Some(&root), false);

    hierarchy::update_world_transforms(&root);
    if parent.is_some_and(|p| p.read().is_playing()) {
        hierarchy::begin_play_tree(&root);
    }
    log::debug!(
        "Spawned prefab {prefab_id} as {id} ({} objects)",
        batch.live_objects().count()
    );
    Ok(root)
}
