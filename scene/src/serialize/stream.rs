//! JSON-backed field streams.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use redlilium_core::Guid;

use super::{DeserializeError, Modifier, SerializeError};

/// Collects one object's fields as a JSON object.
#[derive(Debug, Default, Clone)]
pub struct WriteStream {
    map: Map<String, Value>,
}

impl WriteStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a field unconditionally.
    pub fn write<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<(), SerializeError> {
        let value = serde_json::to_value(value).map_err(|e| SerializeError::FieldError {
            field: name.to_owned(),
            message: e.to_string(),
        })?;
        self.map.insert(name.to_owned(), value);
        Ok(())
    }

    /// Writes a field only when it differs from the diff base.
    ///
    /// With no base every field is written.
    pub fn write_diff<T: Serialize + PartialEq + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
        base: Option<&T>,
    ) -> Result<(), SerializeError> {
        if base.is_some_and(|base| base == value) {
            return Ok(());
        }
        self.write(name, value)
    }

    /// Writes an object reference in its text form.
    pub fn write_id(&mut self, name: &str, id: Guid) {
        self.map.insert(name.to_owned(), Value::String(id.to_string()));
    }

    /// Writes an already-encoded value.
    pub fn write_value(&mut self, name: &str, value: Value) {
        self.map.insert(name.to_owned(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.map.remove(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.map
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.map)
    }
}

/// Read access to one object's stored fields.
///
/// Absent fields leave the target untouched, so partial (diffed) data
/// layers on top of whatever the object already holds.
#[derive(Clone, Copy)]
pub struct ReadStream<'a> {
    map: &'a Map<String, Value>,
    modifier: &'a Modifier,
}

impl<'a> ReadStream<'a> {
    pub fn new(map: &'a Map<String, Value>, modifier: &'a Modifier) -> Self {
        Self { map, modifier }
    }

    pub fn has(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name)
    }

    pub fn map(&self) -> &'a Map<String, Value> {
        self.map
    }

    /// Decodes a field, returning `None` when it is absent.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, DeserializeError> {
        match self.map.get(name) {
            None => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| DeserializeError::TypeMismatch {
                    field: name.to_owned(),
                    expected: std::any::type_name::<T>().to_owned(),
                    found: e.to_string(),
                }),
        }
    }

    /// Decodes a field into `target` if present. Returns whether it was.
    pub fn read_into<T: DeserializeOwned>(
        &self,
        name: &str,
        target: &mut T,
    ) -> Result<bool, DeserializeError> {
        match self.read(name)? {
            Some(value) => {
                *target = value;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reads an object reference and translates it through the modifier.
    pub fn read_id(&self, name: &str) -> Result<Option<Guid>, DeserializeError> {
        Ok(self.read_raw_id(name)?.map(|id| self.modifier.resolve(id)))
    }

    /// Reads an object reference without translation.
    pub fn read_raw_id(&self, name: &str) -> Result<Option<Guid>, DeserializeError> {
        match self.map.get(name) {
            None => Ok(None),
            Some(value) => parse_guid_value(value)
                .map(Some)
                .ok_or_else(|| DeserializeError::TypeMismatch {
                    field: name.to_owned(),
                    expected: "object id".to_owned(),
                    found: value.to_string(),
                }),
        }
    }

    /// Build of the data being read.
    pub fn engine_build(&self) -> u32 {
        self.modifier.engine_build
    }

    pub fn modifier(&self) -> &'a Modifier {
        self.modifier
    }

    /// Flags the load as having upgraded outdated data.
    pub fn mark_deprecated(&self) {
        self.modifier.mark_deprecated();
    }
}

fn parse_guid_value(value: &Value) -> Option<Guid> {
    value.as_str().and_then(Guid::parse_hex)
}

/// Reads a non-empty id field from raw object data.
pub(crate) fn guid_field(map: &Map<String, Value>, name: &str) -> Option<Guid> {
    map.get(name)
        .and_then(parse_guid_value)
        .filter(Guid::is_valid)
}

/// Reads an array of ids, skipping malformed entries.
pub(crate) fn guid_list_field(map: &Map<String, Value>, name: &str) -> Vec<Guid> {
    map.get(name)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_guid_value).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::serialize::acquire_modifier;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn write_diff_skips_equal_values() {
        let mut stream = WriteStream::new();
        stream.write_diff("Name", "a", Some("a")).unwrap();
        stream.write_diff("Layer", &3, Some(&0)).unwrap();
        stream.write_diff("IsActive", &true, None).unwrap();
        assert!(!stream.contains("Name"));
        assert_eq!(stream.get("Layer"), Some(&json!(3)));
        assert_eq!(stream.get("IsActive"), Some(&json!(true)));
    }

    #[test]
    fn read_leaves_absent_fields_untouched() {
        let map = object(json!({ "Layer": 4 }));
        let modifier = acquire_modifier();
        let stream = ReadStream::new(&map, &modifier);
        let mut layer = 0;
        let mut name = String::from("keep");
        assert!(stream.read_into("Layer", &mut layer).unwrap());
        assert!(!stream.read_into("Name", &mut name).unwrap());
        assert_eq!(layer, 4);
        assert_eq!(name, "keep");
    }

    #[test]
    fn type_mismatch_names_the_field() {
        let map = object(json!({ "Layer": "four" }));
        let modifier = acquire_modifier();
        let stream = ReadStream::new(&map, &modifier);
        let err = stream.read::<i32>("Layer").unwrap_err();
        assert!(matches!(err, DeserializeError::TypeMismatch { field, .. } if field == "Layer"));
    }

    #[test]
    fn read_id_goes_through_modifier() {
        let stored = Guid::new();
        let live = Guid::new();
        let map = object(json!({ "Target": stored.to_string() }));
        let mut modifier = acquire_modifier();
        modifier.ids_mapping.insert(stored, live);
        let stream = ReadStream::new(&map, &modifier);
        assert_eq!(stream.read_id("Target").unwrap(), Some(live));
        assert_eq!(stream.read_raw_id("Target").unwrap(), Some(stored));
    }

    #[test]
    fn raw_field_helpers() {
        let a = Guid::new();
        let b = Guid::new();
        let map = object(json!({
            "ID": a.to_string(),
            "Zero": Guid::EMPTY.to_string(),
            "List": [a.to_string(), "junk", b.to_string()],
        }));
        assert_eq!(guid_field(&map, "ID"), Some(a));
        assert_eq!(guid_field(&map, "Zero"), None);
        assert_eq!(guid_field(&map, "Missing"), None);
        assert_eq!(guid_list_field(&map, "List"), vec![a, b]);
    }
}
