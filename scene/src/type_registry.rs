//! Registry of object types that can appear in scene data.
//!
//! Types are looked up by the `TypeName` stored with every object. Each
//! type names an optional base type; whether a type is an actor, a script
//! or not a scene object at all follows from its base chain.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use redlilium_core::Guid;
use serde_json::{Map, Value};

use crate::SceneError;
use crate::behaviour::{EmptyBehaviour, MissingObject, ObjectBehaviour};
use crate::object::{ActorData, ObjectKind, ObjectRef, SceneObject, ScriptData};
use crate::serialize::{ReadStream, WriteStream, acquire_modifier};

pub type Constructor = fn() -> Box<dyn ObjectBehaviour>;

pub const SCENE_OBJECT_TYPE: &str = "SceneObject";
pub const ACTOR_TYPE: &str = "Actor";
pub const EMPTY_ACTOR_TYPE: &str = "EmptyActor";
pub const SCENE_TYPE: &str = "Scene";
pub const SCRIPT_TYPE: &str = "Script";
pub const MISSING_ACTOR_TYPE: &str = "MissingActor";
pub const MISSING_SCRIPT_TYPE: &str = "MissingScript";

const ACTOR_FIELDS: &[&str] = &["Name", "Transform", "IsActive", "Tags", "Layer"];
const SCRIPT_FIELDS: &[&str] = &["Enabled"];

/// What a type resolves to once its base chain is followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Actor,
    Script,
    Other,
}

/// Registration record for one type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    name: String,
    base: Option<String>,
    constructor: Option<Constructor>,
    fields: Vec<String>,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            constructor: None,
            fields: Vec::new(),
        }
    }

    /// Shorthand for a type deriving from `Actor`.
    pub fn actor(name: impl Into<String>) -> Self {
        Self::new(name).with_base(ACTOR_TYPE)
    }

    /// Shorthand for a type deriving from `Script`.
    pub fn script(name: impl Into<String>) -> Self {
        Self::new(name).with_base(SCRIPT_TYPE)
    }

    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    #[must_use]
    pub fn with_constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// Declares a serialized field added by this type.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

pub type TypeHandle = Arc<TypeInfo>;

/// Name-keyed table of [`TypeInfo`].
pub struct TypeRegistry {
    types: RwLock<HashMap<String, TypeHandle>>,
}

static TYPE_REGISTRY: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::with_builtins);

/// The process-wide type registry.
pub fn types() -> &'static TypeRegistry {
    &TYPE_REGISTRY
}

impl TypeRegistry {
    /// An empty registry (not even the built-in types).
    pub fn empty() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the built-in actor and script types.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register(TypeInfo::new(SCENE_OBJECT_TYPE));
        let mut actor = TypeInfo::new(ACTOR_TYPE).with_base(SCENE_OBJECT_TYPE);
        for field in ACTOR_FIELDS {
            actor = actor.with_field(*field);
        }
        registry.register(actor);
        let mut script = TypeInfo::new(SCRIPT_TYPE).with_base(SCENE_OBJECT_TYPE);
        for field in SCRIPT_FIELDS {
            script = script.with_field(*field);
        }
        registry.register(script);
        registry.register(TypeInfo::actor(EMPTY_ACTOR_TYPE));
        registry.register(TypeInfo::actor(SCENE_TYPE));
        registry.register(
            TypeInfo::actor(MISSING_ACTOR_TYPE).with_constructor(missing_object),
        );
        registry.register(
            TypeInfo::script(MISSING_SCRIPT_TYPE).with_constructor(missing_object),
        );
        registry
    }

    /// Adds or replaces a type.
    pub fn register(&self, info: TypeInfo) -> TypeHandle {
        let handle = Arc::new(info);
        self.types
            .write()
            .insert(handle.name.clone(), Arc::clone(&handle));
        handle
    }

    pub fn find(&self, name: &str) -> Option<TypeHandle> {
        self.types.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Returns `true` when `name` is `target` or derives from it.
    pub fn is_assignable(&self, name: &str, target: &str) -> bool {
        let types = self.types.read();
        let mut current = Some(name);
        let mut steps = 0;
        while let Some(type_name) = current {
            if type_name == target {
                return true;
            }
            // Guards against base cycles in user registrations.
            steps += 1;
            if steps > types.len() {
                return false;
            }
            current = types.get(type_name).and_then(|info| info.base());
        }
        false
    }

    pub fn kind_of(&self, name: &str) -> TypeKind {
        if self.is_assignable(name, ACTOR_TYPE) {
            TypeKind::Actor
        } else if self.is_assignable(name, SCRIPT_TYPE) {
            TypeKind::Script
        } else {
            TypeKind::Other
        }
    }

    /// Looks a field up on the type and its bases.
    pub fn has_field(&self, name: &str, field: &str) -> bool {
        let types = self.types.read();
        let mut current = types.get(name);
        let mut steps = 0;
        while let Some(info) = current {
            if info.fields.iter().any(|f| f == field) {
                return true;
            }
            steps += 1;
            if steps > types.len() {
                return false;
            }
            current = info.base().and_then(|base| types.get(base));
        }
        false
    }

    /// Creates an unregistered object of type `name` with default fields.
    pub fn construct(&self, name: &str, id: Guid) -> Result<ObjectRef, SceneError> {
        let handle = self.find(name).ok_or_else(|| SceneError::UnknownType {
            type_name: name.to_owned(),
        })?;
        let kind = match self.kind_of(name) {
            TypeKind::Actor => ObjectKind::Actor(ActorData::default()),
            TypeKind::Script => ObjectKind::Script(ScriptData::default()),
            TypeKind::Other => {
                return Err(SceneError::NotASceneObject {
                    type_name: name.to_owned(),
                });
            }
        };
        let behaviour = handle
            .constructor
            .map_or_else(|| Box::new(EmptyBehaviour) as Box<dyn ObjectBehaviour>, |c| c());
        Ok(SceneObject::new(id, name, kind, behaviour).into_ref())
    }

    /// Creates a placeholder that keeps `type_name` and the raw data of an
    /// object whose type could not be constructed.
    pub fn construct_placeholder(&self, type_name: &str, id: Guid, script: bool) -> ObjectRef {
        let kind = if script {
            ObjectKind::Script(ScriptData::default())
        } else {
            ObjectKind::Actor(ActorData::default())
        };
        SceneObject::new(id, type_name, kind, Box::new(MissingObject::default())).into_ref()
    }

    /// Default object used as the diff base when saving `object`.
    pub fn default_for(&self, object: &SceneObject) -> Option<ObjectRef> {
        self.construct(object.type_name(), Guid::EMPTY).ok().or_else(|| {
            let fallback = if object.is_script() {
                MISSING_SCRIPT_TYPE
            } else {
                MISSING_ACTOR_TYPE
            };
            self.construct(fallback, Guid::EMPTY).ok()
        })
    }
}

fn missing_object() -> Box<dyn ObjectBehaviour> {
    Box::new(MissingObject::default())
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Reads one serialized field of `object` by name.
pub fn get_field(object: &SceneObject, field: &str) -> Result<Option<Value>, SceneError> {
    let mut stream = WriteStream::new();
    object.serialize(&mut stream, None)?;
    Ok(stream.get(field).cloned())
}

/// Writes one serialized field of `object` by name.
///
/// The field must be declared by the object's type or one of its bases.
pub fn set_field(object: &mut SceneObject, field: &str, value: Value) -> Result<(), SceneError> {
    if !types().has_field(object.type_name(), field) {
        return Err(SceneError::InvalidArgument(format!(
            "type '{}' has no field '{field}'",
            object.type_name()
        )));
    }
    let mut map = Map::new();
    map.insert(field.to_owned(), value);
    let modifier = acquire_modifier();
    object.deserialize(&ReadStream::new(&map, &modifier))?;
    Ok(())
}
