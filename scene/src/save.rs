//! Writing live objects back to scene documents.
//!
//! Objects are written depth-first (actor, its scripts, then its
//! children), each diffed against a base object so only changed fields are
//! stored:
//!
//! - plain objects against a default-constructed object of their type,
//! - prefab instance objects against the matching object of the prefab's
//!   default instance. These omit `TypeName`.

use std::collections::HashMap;
use std::sync::Arc;

use redlilium_core::Guid;
use serde_json::{Map, Value, json};

use crate::SceneError;
use crate::hierarchy;
use crate::object::{ObjectRef, PrefabLink, SceneObject};
use crate::prefab::PrefabLibrary;
use crate::serialize::{ENGINE_BUILD, WriteStream};
use crate::type_registry::types;

/// Serializes `scene` and everything below it into a scene document.
pub fn save_scene(scene: &ObjectRef, library: &Arc<PrefabLibrary>) -> Result<Value, SceneError> {
    let (id, type_name) = {
        let s = scene.read();
        (s.id(), s.type_name().to_owned())
    };
    let data = save_objects(std::slice::from_ref(scene), library)?;
    log::debug!("Saved scene {id} ({} objects)", data.len());
    Ok(json!({
        "ID": id.to_string(),
        "TypeName": type_name,
        "EngineBuild": ENGINE_BUILD,
        "Data": data,
    }))
}

/// Serializes the subtrees under `roots` into a flat `Data` array.
pub fn save_objects(
    roots: &[ObjectRef],
    library: &Arc<PrefabLibrary>,
) -> Result<Vec<Value>, SceneError> {
    let mut ctx = SaveContext::new(library);
    let mut data = Vec::new();
    for root in roots {
        for object in hierarchy::collect_subtree(root) {
            data.push(Value::Object(ctx.serialize_object(&object)?));
        }
    }
    Ok(data)
}

/// Diff bases shared across one save.
pub(crate) struct SaveContext<'a> {
    library: &'a Arc<PrefabLibrary>,
    type_defaults: HashMap<String, Option<ObjectRef>>,
}

impl<'a> SaveContext<'a> {
    pub fn new(library: &'a Arc<PrefabLibrary>) -> Self {
        Self {
            library,
            type_defaults: HashMap::new(),
        }
    }

    /// Serializes `object` using its own prefab link.
    pub fn serialize_object(&mut self, object: &ObjectRef) -> Result<Map<String, Value>, SceneError> {
        let link = object.read().prefab_link();
        self.serialize_object_as(object, link.is_valid().then_some(link))
    }

    /// Serializes `object` as an instance of `link`, or as a plain object
    /// when `link` is `None`.
    pub fn serialize_object_as(
        &mut self,
        object: &ObjectRef,
        link: Option<PrefabLink>,
    ) -> Result<Map<String, Value>, SceneError> {
        let base = match link {
            Some(link) => self.prefab_base(object, link),
            None => self.type_base(&object.read()),
        };
        let base_guard = base.as_ref().map(|b| b.read());

        let o = object.read();
        let mut stream = WriteStream::new();
        stream.write_id("ID", o.id());
        match link {
            Some(link) => {
                stream.write_id("PrefabID", link.prefab_id);
                stream.write_id("PrefabObjectID", link.prefab_object_id);
            }
            None => stream.write_value("TypeName", Value::String(o.type_name().to_owned())),
        }
        if let Some(parent) = o.parent() {
            stream.write_id("ParentID", parent.read().id());
        }
        o.serialize(&mut stream, base_guard.as_deref())?;

        if let Some(link) = link
            && o.is_actor()
        {
            let removed = self.removed_objects(&o, link);
            if !removed.is_empty() {
                stream.write_value(
                    "RemovedObjects",
                    Value::Array(removed.iter().map(|id| Value::String(id.to_string())).collect()),
                );
            }
        }
        Ok(stream.into_map())
    }

    fn type_base(&mut self, object: &SceneObject) -> Option<ObjectRef> {
        self.type_defaults
            .entry(object.type_name().to_owned())
            .or_insert_with(|| types().default_for(object))
            .clone()
    }

    fn prefab_base(&mut self, object: &ObjectRef, link: PrefabLink) -> Option<ObjectRef> {
        let base = self
            .library
            .load(link.prefab_id)
            .and_then(|prefab| {
                prefab
                    .default_instance(self.library)
                    .map(|defaults| defaults.object(link.prefab_object_id).cloned())
            });
        match base {
            Ok(Some(base)) => Some(base),
            Ok(None) => {
                log::warn!(
                    "Prefab {} has no object {}; saving {} in full",
                    link.prefab_id,
                    link.prefab_object_id,
                    object.read().id()
                );
                None
            }
            Err(err) => {
                log::warn!("Saving {} in full: {err}", object.read().id());
                None
            }
        }
    }

    /// Prefab children declared for `object` that the instance no longer
    /// has.
    fn removed_objects(&self, object: &SceneObject, link: PrefabLink) -> Vec<Guid> {
        let Ok(prefab) = self.library.load(link.prefab_id) else {
            return Vec::new();
        };
        let present: Vec<PrefabLink> = object
            .scripts()
            .iter()
            .chain(object.children())
            .map(|child| child.read().prefab_link())
            .collect();
        prefab
            .children_of(link.prefab_object_id)
            .iter()
            .copied()
            .filter(|&child| !present.contains(&PrefabLink::new(link.prefab_id, child)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemorySource;
    use crate::hierarchy::set_parent;
    use crate::type_registry::{ACTOR_TYPE, SCENE_TYPE};

    fn library() -> Arc<PrefabLibrary> {
        Arc::new(PrefabLibrary::new(Arc::new(MemorySource::new())))
    }

    #[test]
    fn plain_objects_write_type_and_changed_fields() {
        let scene = types().construct(SCENE_TYPE, Guid::new()).unwrap();
        let child = types().construct(ACTOR_TYPE, Guid::new()).unwrap();
        child.write().actor_mut().unwrap().name = "Child".to_owned();
        set_parent(&child, Some(&scene)).unwrap();

        let doc = save_scene(&scene, &library()).unwrap();
        let data = doc["Data"].as_array().unwrap();
        assert_eq!(doc["EngineBuild"], json!(ENGINE_BUILD));
        assert_eq!(data.len(), 2);
        assert_eq!(
            data[0],
            json!({ "ID": scene.read().id().to_string(), "TypeName": "Scene" })
        );
        assert_eq!(
            data[1],
            json!({
                "ID": child.read().id().to_string(),
                "TypeName": "Actor",
                "ParentID": scene.read().id().to_string(),
                "Name": "Child",
            })
        );
    }

    #[test]
    fn missing_prefab_falls_back_to_full_write() {
        let object = types().construct(ACTOR_TYPE, Guid::new()).unwrap();
        let link = PrefabLink::new(Guid::new(), Guid::new());
        object.write().set_prefab_link(link);
        let library = library();
        let map = SaveContext::new(&library).serialize_object(&object).unwrap();
        assert!(map.contains_key("PrefabID"));
        assert!(!map.contains_key("TypeName"));
        assert!(map.contains_key("Transform"));
    }
}
