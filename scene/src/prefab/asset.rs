//! Parsed prefab documents.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use redlilium_core::Guid;
use serde_json::{Map, Value};

use super::PrefabLibrary;
use crate::SceneError;
use crate::hierarchy;
use crate::object::{ObjectRef, PrefabLink};
use crate::serialize::{MIN_SUPPORTED_ENGINE_BUILD, check_engine_build, guid_field};

/// A reusable object template.
///
/// The data array has the same layout as a scene document's `Data`. Object
/// ids inside are prefab-object ids; instancing maps them to fresh scene ids.
pub struct Prefab {
    id: Guid,
    engine_build: u32,
    objects: Vec<Map<String, Value>>,
    index: HashMap<Guid, usize>,
    parents: HashMap<Guid, Guid>,
    hierarchy: HashMap<Guid, Vec<Guid>>,
    root_id: Guid,
    nested: HashMap<Guid, PrefabLink>,
    default_instance: OnceCell<DefaultInstance>,
}

impl Prefab {
    /// Parses and indexes a prefab document.
    pub fn from_json(id: Guid, document: &Value) -> Result<Self, SceneError> {
        let root = document
            .as_object()
            .ok_or_else(|| SceneError::InvalidStream("prefab document is not an object".to_owned()))?;
        let engine_build = root
            .get("EngineBuild")
            .and_then(Value::as_u64)
            .and_then(|b| u32::try_from(b).ok())
            .ok_or_else(|| SceneError::InvalidStream("missing EngineBuild".to_owned()))?;
        check_engine_build(engine_build, MIN_SUPPORTED_ENGINE_BUILD)?;
        let items = root
            .get("Data")
            .and_then(Value::as_array)
            .ok_or_else(|| SceneError::InvalidStream("missing Data array".to_owned()))?;

        let mut objects = Vec::with_capacity(items.len());
        for item in items {
            let map = item
                .as_object()
                .ok_or_else(|| SceneError::InvalidStream("Data element is not an object".to_owned()))?;
            objects.push(map.clone());
        }
        Self::from_objects(id, engine_build, objects)
    }

    pub(crate) fn from_objects(
        id: Guid,
        engine_build: u32,
        objects: Vec<Map<String, Value>>,
    ) -> Result<Self, SceneError> {
        let mut index = HashMap::with_capacity(objects.len());
        let mut parents = HashMap::new();
        let mut hierarchy: HashMap<Guid, Vec<Guid>> = HashMap::new();
        let mut nested = HashMap::new();
        let mut roots = Vec::new();

        for (i, object) in objects.iter().enumerate() {
            let object_id = guid_field(object, "ID").ok_or_else(|| {
                SceneError::InvalidId(object.get("ID").map(Value::to_string).unwrap_or_default())
            })?;
            if index.insert(object_id, i).is_some() {
                return Err(SceneError::InvalidStream(format!(
                    "duplicate object {object_id} in prefab {id}"
                )));
            }
            match guid_field(object, "ParentID") {
                Some(parent) => {
                    parents.insert(object_id, parent);
                    hierarchy.entry(parent).or_default().push(object_id);
                }
                None => roots.push(object_id),
            }
            if let (Some(prefab_id), Some(prefab_object_id)) = (
                guid_field(object, "PrefabID"),
                guid_field(object, "PrefabObjectID"),
            ) {
                nested.insert(object_id, PrefabLink::new(prefab_id, prefab_object_id));
            }
        }

        let root_id = match roots.as_slice() {
            [root] => *root,
            [] => {
                return Err(SceneError::InvalidStream(format!("prefab {id} has no root object")));
            }
            _ => {
                return Err(SceneError::InvalidStream(format!(
                    "prefab {id} has {} root objects",
                    roots.len()
                )));
            }
        };

        Ok(Self {
            id,
            engine_build,
            objects,
            index,
            parents,
            hierarchy,
            root_id,
            nested,
            default_instance: OnceCell::new(),
        })
    }

    pub fn id(&self) -> Guid {
        self.id
    }

    pub fn engine_build(&self) -> u32 {
        self.engine_build
    }

    /// Prefab-object id of the single object without a parent.
    pub fn root_id(&self) -> Guid {
        self.root_id
    }

    pub fn objects(&self) -> &[Map<String, Value>] {
        &self.objects
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn contains(&self, prefab_object_id: Guid) -> bool {
        self.index.contains_key(&prefab_object_id)
    }

    pub fn object_data(&self, prefab_object_id: Guid) -> Option<&Map<String, Value>> {
        self.index
            .get(&prefab_object_id)
            .map(|&i| &self.objects[i])
    }

    pub fn parent_of(&self, prefab_object_id: Guid) -> Option<Guid> {
        self.parents.get(&prefab_object_id).copied()
    }

    /// Direct children (actors and scripts) in data order.
    pub fn children_of(&self, prefab_object_id: Guid) -> &[Guid] {
        self.hierarchy
            .get(&prefab_object_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Link of an object that instances another prefab.
    pub fn nested_link(&self, prefab_object_id: Guid) -> Option<PrefabLink> {
        self.nested.get(&prefab_object_id).copied()
    }

    /// Distinct ids of prefabs referenced by nested objects.
    pub fn nested_prefab_ids(&self) -> Vec<Guid> {
        let mut ids: Vec<Guid> = self.nested.values().map(|link| link.prefab_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Fully-linked, unregistered instance used as the diff base on save
    /// and as the reference for sibling order. Built on first use.
    pub fn default_instance(
        &self,
        library: &Arc<PrefabLibrary>,
    ) -> Result<&DefaultInstance, SceneError> {
        self.default_instance
            .get_or_try_init(|| crate::batch::build_default_instance(self, library))
    }

    #[cfg(test)]
    pub(crate) fn empty_for_tests() -> Self {
        let mut root = Map::new();
        root.insert("ID".to_owned(), Value::String(Guid::new().to_string()));
        root.insert("TypeName".to_owned(), Value::String("Actor".to_owned()));
        match Self::from_objects(Guid::new(), crate::serialize::ENGINE_BUILD, vec![root]) {
            Ok(prefab) => prefab,
            Err(err) => panic!("{err}"),
        }
    }
}

impl std::fmt::Debug for Prefab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prefab")
            .field("id", &self.id)
            .field("engine_build", &self.engine_build)
            .field("root_id", &self.root_id)
            .field("objects", &self.objects.len())
            .finish_non_exhaustive()
    }
}

/// Objects of a prefab's default instance, keyed by prefab-object id.
pub struct DefaultInstance {
    root: ObjectRef,
    objects: HashMap<Guid, ObjectRef>,
}

impl DefaultInstance {
    pub(crate) fn new(root: ObjectRef, objects: HashMap<Guid, ObjectRef>) -> Self {
        Self { root, objects }
    }

    pub fn root(&self) -> &ObjectRef {
        &self.root
    }

    pub fn object(&self, prefab_object_id: Guid) -> Option<&ObjectRef> {
        self.objects.get(&prefab_object_id)
    }

    pub fn order_in_parent(&self, prefab_object_id: Guid) -> Option<usize> {
        self.object(prefab_object_id)
            .and_then(hierarchy::order_in_parent)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::serialize::ENGINE_BUILD;

    #[test]
    fn indexes_hierarchy_and_nested_links() {
        let (root, child, script, nested) = (Guid::new(), Guid::new(), Guid::new(), Guid::new());
        let other_prefab = Guid::new();
        let doc = json!({
            "ID": Guid::new().to_string(),
            "EngineBuild": ENGINE_BUILD,
            "Data": [
                { "ID": root.to_string(), "TypeName": "Actor" },
                { "ID": child.to_string(), "TypeName": "Actor", "ParentID": root.to_string() },
                { "ID": script.to_string(), "TypeName": "Script", "ParentID": root.to_string() },
                {
                    "ID": nested.to_string(),
                    "PrefabID": other_prefab.to_string(),
                    "PrefabObjectID": Guid::new().to_string(),
                    "ParentID": child.to_string(),
                },
            ],
        });
        let prefab = Prefab::from_json(Guid::new(), &doc).unwrap();
        assert_eq!(prefab.root_id(), root);
        assert_eq!(prefab.children_of(root), &[child, script]);
        assert_eq!(prefab.parent_of(nested), Some(child));
        assert_eq!(prefab.nested_prefab_ids(), vec![other_prefab]);
        assert!(prefab.nested_link(child).is_none());
        assert!(prefab.object_data(script).is_some());
    }

    #[test]
    fn rejects_multiple_or_missing_roots() {
        let two_roots = json!({
            "EngineBuild": ENGINE_BUILD,
            "Data": [
                { "ID": Guid::new().to_string(), "TypeName": "Actor" },
                { "ID": Guid::new().to_string(), "TypeName": "Actor" },
            ],
        });
        assert!(matches!(
            Prefab::from_json(Guid::new(), &two_roots),
            Err(SceneError::InvalidStream(_))
        ));
        let empty = json!({ "EngineBuild": ENGINE_BUILD, "Data": [] });
        assert!(Prefab::from_json(Guid::new(), &empty).is_err());
    }

    #[test]
    fn rejects_unsupported_builds() {
        let doc = json!({
            "EngineBuild": 1,
            "Data": [{ "ID": Guid::new().to_string(), "TypeName": "Actor" }],
        });
        assert!(matches!(
            Prefab::from_json(Guid::new(), &doc),
            Err(SceneError::UnsupportedVersion { .. })
        ));
    }
}
