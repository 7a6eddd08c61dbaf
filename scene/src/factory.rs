//! Object allocation and field loading from stored data.
//!
//! Loading is split in two so that every object of a batch exists before
//! any reference between them is read: [`spawn`] allocates from `ID` and
//! `TypeName` (or the prefab object it instances), [`deserialize`] fills
//! the fields afterwards.

use serde_json::{Map, Value};

use redlilium_core::Guid;

use crate::SceneError;
use crate::object::{ObjectRef, PrefabLink};
use crate::prefab::Prefab;
use crate::serialize::{Modifier, ReadStream, SceneContext, guid_field};
use crate::type_registry::types;

/// Allocates the object described by `data` without reading its fields.
pub(crate) fn spawn(
    ctx: &SceneContext,
    modifier: &mut Modifier,
    data: &Map<String, Value>,
) -> Result<ObjectRef, SceneError> {
    let raw_id = guid_field(data, "ID").ok_or_else(|| invalid_id(data))?;
    let id = modifier.resolve(raw_id);

    if let Some(prefab_object_id) = guid_field(data, "PrefabObjectID") {
        let prefab_id = guid_field(data, "PrefabID").unwrap_or(Guid::EMPTY);
        let prefab = ctx.library().load(prefab_id)?;
        return spawn_prefab_object(ctx, modifier, &prefab, prefab_object_id, id);
    }

    let type_name = data.get("TypeName").and_then(Value::as_str).unwrap_or("");
    types().construct(type_name, id)
}

/// Allocates prefab object `prefab_object_id` under scene id `id`.
///
/// The prefab object id maps to `id` only while the prefab data is
/// spawned; the previous mapping is restored afterwards.
pub(crate) fn spawn_prefab_object(
    ctx: &SceneContext,
    modifier: &mut Modifier,
    prefab: &Prefab,
    prefab_object_id: Guid,
    id: Guid,
) -> Result<ObjectRef, SceneError> {
    let data = prefab
        .object_data(prefab_object_id)
        .ok_or(SceneError::MissingPrefabObject {
            prefab: prefab.id(),
            object: prefab_object_id,
        })?;
    let previous = modifier.ids_mapping.insert(prefab_object_id, id);
    let result = spawn(ctx, modifier, data);
    match previous {
        Some(previous) => modifier.ids_mapping.insert(prefab_object_id, previous),
        None => modifier.ids_mapping.remove(&prefab_object_id),
    };
    let object = result?;
    object
        .write()
        .set_prefab_link(PrefabLink::new(prefab.id(), prefab_object_id));
    Ok(object)
}

/// Reads `data` into `object`, layering it over the prefab data it
/// instances (innermost prefab first).
pub(crate) fn deserialize(
    ctx: &SceneContext,
    modifier: &mut Modifier,
    object: &ObjectRef,
    data: &Map<String, Value>,
) -> Result<(), SceneError> {
    deserialize_level(ctx, modifier, object, data, 0)
}

/// Reads prefab object data into an object synthesized for an instance.
pub(crate) fn deserialize_prefab_data(
    ctx: &SceneContext,
    modifier: &mut Modifier,
    object: &ObjectRef,
    prefab: &Prefab,
    data: &Map<String, Value>,
) -> Result<(), SceneError> {
    let build = std::mem::replace(&mut modifier.engine_build, prefab.engine_build());
    let result = deserialize_level(ctx, modifier, object, data, 1);
    modifier.engine_build = build;
    result
}

fn deserialize_level(
    ctx: &SceneContext,
    modifier: &mut Modifier,
    object: &ObjectRef,
    data: &Map<String, Value>,
    level: usize,
) -> Result<(), SceneError> {
    if let (Some(prefab_id), Some(prefab_object_id)) = (
        guid_field(data, "PrefabID"),
        guid_field(data, "PrefabObjectID"),
    ) {
        let prefab = ctx.library().load(prefab_id)?;
        let prefab_data = prefab
            .object_data(prefab_object_id)
            .ok_or(SceneError::MissingPrefabObject {
                prefab: prefab_id,
                object: prefab_object_id,
            })?;
        let build = std::mem::replace(&mut modifier.engine_build, prefab.engine_build());
        let result = deserialize_level(ctx, modifier, object, prefab_data, level + 1);
        modifier.engine_build = build;
        result?;
    }

    let id = object.read().id();
    ctx.setup_ids_mapping(id, level, modifier);
    object
        .write()
        .deserialize(&ReadStream::new(data, modifier))?;
    Ok(())
}

fn invalid_id(data: &Map<String, Value>) -> SceneError {
    SceneError::InvalidId(data.get("ID").map(Value::to_string).unwrap_or_default())
}

/// Best-effort description of where `data` sits, for warnings.
pub(crate) fn describe(data: &Map<String, Value>) -> String {
    let id = data.get("ID").and_then(Value::as_str).unwrap_or("?");
    let type_name = data
        .get("TypeName")
        .and_then(Value::as_str)
        .or_else(|| data.get("PrefabObjectID").and_then(Value::as_str))
        .unwrap_or("?");
    match data.get("ParentID").and_then(Value::as_str) {
        Some(parent) => format!("{id} ({type_name}, parent {parent})"),
        None => format!("{id} ({type_name})"),
    }
}

/// Whether data that failed to spawn looks like a script rather than an
/// actor: it has a parent and none of the actor-only fields.
pub(crate) fn looks_like_script(data: &Map<String, Value>) -> bool {
    const ACTOR_KEYS: &[&str] = &["Name", "Transform", "IsActive", "Tag", "Tags", "Layer"];
    data.contains_key("ParentID") && !ACTOR_KEYS.iter().any(|key| data.contains_key(*key))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::assets::MemorySource;
    use crate::prefab::PrefabLibrary;
    use crate::serialize::{ENGINE_BUILD, acquire_modifier};

    fn context(source: MemorySource) -> SceneContext {
        SceneContext::new(Arc::new(PrefabLibrary::new(Arc::new(source))), ENGINE_BUILD)
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn spawn_uses_type_name_and_mapping() {
        let ctx = context(MemorySource::new());
        let stored = Guid::new();
        let live = Guid::new();
        let mut modifier = acquire_modifier();
        modifier.ids_mapping.insert(stored, live);
        let object = spawn(
            &ctx,
            &mut modifier,
            &map(json!({ "ID": stored.to_string(), "TypeName": "EmptyActor" })),
        )
        .unwrap();
        assert_eq!(object.read().id(), live);
        assert_eq!(object.read().type_name(), "EmptyActor");
    }

    #[test]
    fn spawn_reports_bad_ids_and_types() {
        let ctx = context(MemorySource::new());
        let mut modifier = acquire_modifier();
        assert!(matches!(
            spawn(&ctx, &mut modifier, &map(json!({ "TypeName": "Actor" }))),
            Err(SceneError::InvalidId(_))
        ));
        assert!(matches!(
            spawn(
                &ctx,
                &mut modifier,
                &map(json!({ "ID": Guid::EMPTY.to_string(), "TypeName": "Actor" }))
            ),
            Err(SceneError::InvalidId(_))
        ));
        assert!(matches!(
            spawn(
                &ctx,
                &mut modifier,
                &map(json!({ "ID": Guid::new().to_string(), "TypeName": "Nope" }))
            ),
            Err(SceneError::UnknownType { .. })
        ));
    }

    #[test]
    fn prefab_objects_spawn_from_prefab_type() {
        let source = MemorySource::new();
        let prefab_id = Guid::new();
        let root = Guid::new();
        source.insert(
            prefab_id,
            &json!({
                "EngineBuild": ENGINE_BUILD,
                "Data": [{ "ID": root.to_string(), "TypeName": "EmptyActor", "Name": "Base" }],
            }),
        );
        let ctx = context(source);
        let mut modifier = acquire_modifier();
        let id = Guid::new();
        let data = map(json!({
            "ID": id.to_string(),
            "PrefabID": prefab_id.to_string(),
            "PrefabObjectID": root.to_string(),
            "Name": "Override",
        }));
        let object = spawn(&ctx, &mut modifier, &data).unwrap();
        assert_eq!(object.read().id(), id);
        assert_eq!(object.read().prefab_link(), PrefabLink::new(prefab_id, root));
        assert!(modifier.ids_mapping.is_empty());

        deserialize(&ctx, &mut modifier, &object, &data).unwrap();
        assert_eq!(object.read().name(), "Override");
    }

    #[test]
    fn missing_prefab_is_reported() {
        let ctx = context(MemorySource::new());
        let mut modifier = acquire_modifier();
        let prefab_id = Guid::new();
        let data = map(json!({
            "ID": Guid::new().to_string(),
            "PrefabID": prefab_id.to_string(),
            "PrefabObjectID": Guid::new().to_string(),
        }));
        assert_eq!(
            spawn(&ctx, &mut modifier, &data).unwrap_err(),
            SceneError::MissingPrefab(prefab_id)
        );
    }

    #[test]
    fn script_heuristic() {
        let parent = Guid::new().to_string();
        assert!(looks_like_script(&map(json!({ "ParentID": parent, "Speed": 1 }))));
        assert!(!looks_like_script(&map(json!({ "ParentID": parent, "Name": "a" }))));
        assert!(!looks_like_script(&map(json!({ "Speed": 1 }))));
    }
}
