//! Type-specific state attached to scene objects.

use std::any::Any;

use redlilium_core::Guid;
use serde_json::{Map, Value};

use crate::serialize::{DeserializeError, ReadStream, SerializeError, WriteStream};

/// Helper trait for downcasting behaviours.
pub trait AsAny: 'static {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Custom fields and lifecycle hooks of a registered object type.
///
/// The object's common fields (name, transform, tags, ...) are handled by
/// [`SceneObject`](crate::SceneObject); a behaviour only deals with what its
/// type adds. `other` in [`serialize`](Self::serialize) is the diff base and
/// is normally the same concrete type, so implementations downcast it:
///
/// ```
/// use redlilium_core::Guid;
/// use redlilium_scene::behaviour::{AsAny, ObjectBehaviour};
/// use redlilium_scene::serialize::{DeserializeError, ReadStream, SerializeError, WriteStream};
///
/// #[derive(Default)]
/// struct Follow {
///     target: Guid,
/// }
///
/// impl ObjectBehaviour for Follow {
///     fn serialize(
///         &self,
///         stream: &mut WriteStream,
///         other: Option<&dyn ObjectBehaviour>,
///     ) -> Result<(), SerializeError> {
///         let other = other.and_then(|o| o.as_any().downcast_ref::<Self>());
///         stream.write_diff("Target", &self.target, other.map(|o| &o.target))
///     }
///
///     fn deserialize(&mut self, stream: &ReadStream<'_>) -> Result<(), DeserializeError> {
///         if let Some(target) = stream.read_id("Target")? {
///             self.target = target;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ObjectBehaviour: AsAny + Send + Sync {
    fn serialize(
        &self,
        _stream: &mut WriteStream,
        _other: Option<&dyn ObjectBehaviour>,
    ) -> Result<(), SerializeError> {
        Ok(())
    }

    fn deserialize(&mut self, _stream: &ReadStream<'_>) -> Result<(), DeserializeError> {
        Ok(())
    }

    /// Called once after the whole batch is linked.
    fn on_initialize(&mut self, _owner: Guid) {}

    fn on_begin_play(&mut self, _owner: Guid) {}

    fn on_end_play(&mut self, _owner: Guid) {}
}

/// Behaviour of types that add no fields of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyBehaviour;

impl ObjectBehaviour for EmptyBehaviour {}

/// Stand-in for an object whose type could not be created.
///
/// Keeps every field it does not understand so the object is written back
/// unchanged on save.
#[derive(Debug, Default, Clone)]
pub struct MissingObject {
    data: Map<String, Value>,
}

/// Keys handled by the object model itself rather than by a behaviour.
pub(crate) const RESERVED_KEYS: &[&str] = &[
    "ID",
    "TypeName",
    "ParentID",
    "PrefabID",
    "PrefabObjectID",
    "RemovedObjects",
    "Name",
    "Transform",
    "IsActive",
    "Tag",
    "Tags",
    "Layer",
    "Enabled",
];

impl MissingObject {
    /// Fields preserved from the original data.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

impl ObjectBehaviour for MissingObject {
    fn serialize(
        &self,
        stream: &mut WriteStream,
        _other: Option<&dyn ObjectBehaviour>,
    ) -> Result<(), SerializeError> {
        for (key, value) in &self.data {
            stream.write_value(key, value.clone());
        }
        Ok(())
    }

    fn deserialize(&mut self, stream: &ReadStream<'_>) -> Result<(), DeserializeError> {
        for (key, value) in stream.map() {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                self.data.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::serialize::acquire_modifier;

    #[test]
    fn downcast_through_trait_object() {
        let boxed: Box<dyn ObjectBehaviour> = Box::new(MissingObject::default());
        let behaviour: &dyn ObjectBehaviour = &*boxed;
        assert!(behaviour.as_any().downcast_ref::<MissingObject>().is_some());
        assert!(behaviour.as_any().downcast_ref::<EmptyBehaviour>().is_none());
    }

    #[test]
    fn missing_object_keeps_unknown_fields() {
        let data = json!({ "ID": "x", "Name": "n", "Speed": 3, "Mode": "fast" });
        let map = data.as_object().unwrap();
        let modifier = acquire_modifier();
        let mut missing = MissingObject::default();
        missing.deserialize(&ReadStream::new(map, &modifier)).unwrap();
        assert_eq!(missing.data().len(), 2);

        let mut out = WriteStream::new();
        missing.serialize(&mut out, None).unwrap();
        assert_eq!(out.get("Speed"), Some(&json!(3)));
        assert!(!out.contains("Name"));
    }
}
