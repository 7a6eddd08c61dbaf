//! Scene objects: actors and scripts.
//!
//! Objects are shared as [`ObjectRef`] (`Arc<RwLock<SceneObject>>`). A parent
//! owns its children and scripts through strong references; the back link
//! to the parent is weak, so detaching a subtree releases it.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use redlilium_core::Guid;
use redlilium_core::math::Transform;
use serde_json::{Map, Value};

use crate::behaviour::ObjectBehaviour;
use crate::serialize::{
    DeserializeError, ReadStream, SerializeError, TAGS_ARRAY_BUILD, WriteStream,
};

pub type ObjectRef = Arc<RwLock<SceneObject>>;
pub type WeakObjectRef = Weak<RwLock<SceneObject>>;

/// Association of a scene object with the prefab object it instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PrefabLink {
    pub prefab_id: Guid,
    pub prefab_object_id: Guid,
}

impl PrefabLink {
    pub const NONE: Self = Self {
        prefab_id: Guid::EMPTY,
        prefab_object_id: Guid::EMPTY,
    };

    pub const fn new(prefab_id: Guid, prefab_object_id: Guid) -> Self {
        Self {
            prefab_id,
            prefab_object_id,
        }
    }

    pub const fn is_valid(&self) -> bool {
        self.prefab_id.is_valid() && self.prefab_object_id.is_valid()
    }
}

/// Fields shared by every actor.
#[derive(Debug, Clone)]
pub struct ActorData {
    pub name: String,
    /// Local transform relative to the parent.
    pub transform: Transform,
    pub is_active: bool,
    pub tags: Vec<String>,
    pub layer: i32,
    world: Transform,
    children: Vec<ObjectRef>,
    scripts: Vec<ObjectRef>,
}

impl Default for ActorData {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Transform::IDENTITY,
            is_active: true,
            tags: Vec::new(),
            layer: 0,
            world: Transform::IDENTITY,
            children: Vec::new(),
            scripts: Vec::new(),
        }
    }
}

impl ActorData {
    /// World transform computed by the last transform pass.
    pub fn world_transform(&self) -> Transform {
        self.world
    }

    pub fn children(&self) -> &[ObjectRef] {
        &self.children
    }

    pub fn scripts(&self) -> &[ObjectRef] {
        &self.scripts
    }
}

/// Fields shared by every script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptData {
    pub enabled: bool,
}

impl Default for ScriptData {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Actor or script. Scripts never have children.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    Actor(ActorData),
    Script(ScriptData),
}

#[derive(Debug, Clone, Copy, Default)]
struct ObjectState {
    initialized: bool,
    playing: bool,
    destroyed: bool,
}

/// A node of the scene tree.
pub struct SceneObject {
    id: Guid,
    type_name: String,
    kind: ObjectKind,
    parent: Option<WeakObjectRef>,
    parent_id: Guid,
    prefab: PrefabLink,
    behaviour: Box<dyn ObjectBehaviour>,
    state: ObjectState,
}

impl SceneObject {
    pub fn new(
        id: Guid,
        type_name: impl Into<String>,
        kind: ObjectKind,
        behaviour: Box<dyn ObjectBehaviour>,
    ) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            kind,
            parent: None,
            parent_id: Guid::EMPTY,
            prefab: PrefabLink::NONE,
            behaviour,
            state: ObjectState::default(),
        }
    }

    pub fn into_ref(self) -> ObjectRef {
        Arc::new(RwLock::new(self))
    }

    pub fn id(&self) -> Guid {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn is_actor(&self) -> bool {
        matches!(self.kind, ObjectKind::Actor(_))
    }

    pub fn is_script(&self) -> bool {
        matches!(self.kind, ObjectKind::Script(_))
    }

    pub fn actor(&self) -> Option<&ActorData> {
        match &self.kind {
            ObjectKind::Actor(actor) => Some(actor),
            ObjectKind::Script(_) => None,
        }
    }

    pub fn actor_mut(&mut self) -> Option<&mut ActorData> {
        match &mut self.kind {
            ObjectKind::Actor(actor) => Some(actor),
            ObjectKind::Script(_) => None,
        }
    }

    pub fn script(&self) -> Option<&ScriptData> {
        match &self.kind {
            ObjectKind::Script(script) => Some(script),
            ObjectKind::Actor(_) => None,
        }
    }

    pub fn script_mut(&mut self) -> Option<&mut ScriptData> {
        match &mut self.kind {
            ObjectKind::Script(script) => Some(script),
            ObjectKind::Actor(_) => None,
        }
    }

    /// Actor name; scripts have none.
    pub fn name(&self) -> &str {
        self.actor().map_or("", |actor| actor.name.as_str())
    }

    pub fn children(&self) -> &[ObjectRef] {
        match &self.kind {
            ObjectKind::Actor(actor) => &actor.children,
            ObjectKind::Script(_) => &[],
        }
    }

    pub fn scripts(&self) -> &[ObjectRef] {
        match &self.kind {
            ObjectKind::Actor(actor) => &actor.scripts,
            ObjectKind::Script(_) => &[],
        }
    }

    pub fn parent(&self) -> Option<ObjectRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Id of the parent: the linked parent, or the one read from the
    /// stream until linking happens.
    pub fn parent_id(&self) -> Guid {
        self.parent_id
    }

    pub fn prefab_link(&self) -> PrefabLink {
        self.prefab
    }

    pub fn set_prefab_link(&mut self, link: PrefabLink) {
        self.prefab = link;
    }

    pub fn behaviour(&self) -> &dyn ObjectBehaviour {
        &*self.behaviour
    }

    pub fn behaviour_mut(&mut self) -> &mut dyn ObjectBehaviour {
        &mut *self.behaviour
    }

    pub fn behaviour_as<T: 'static>(&self) -> Option<&T> {
        self.behaviour().as_any().downcast_ref::<T>()
    }

    pub fn behaviour_as_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.behaviour_mut().as_any_mut().downcast_mut::<T>()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Writes this object's own fields, skipping values equal to `other`.
    ///
    /// Identity and hierarchy keys (`ID`, `TypeName`, `ParentID`, prefab
    /// link) are written by the save layer.
    pub fn serialize(
        &self,
        stream: &mut WriteStream,
        other: Option<&SceneObject>,
    ) -> Result<(), SerializeError> {
        match &self.kind {
            ObjectKind::Actor(actor) => {
                let base = other.and_then(SceneObject::actor);
                stream.write_diff("Name", &actor.name, base.map(|b| &b.name))?;
                write_transform(stream, &actor.transform, base.map(|b| &b.transform))?;
                stream.write_diff("IsActive", &actor.is_active, base.map(|b| &b.is_active))?;
                stream.write_diff("Tags", &actor.tags, base.map(|b| &b.tags))?;
                stream.write_diff("Layer", &actor.layer, base.map(|b| &b.layer))?;
            }
            ObjectKind::Script(script) => {
                let base = other.and_then(SceneObject::script);
                stream.write_diff("Enabled", &script.enabled, base.map(|b| &b.enabled))?;
            }
        }
        self.behaviour
            .serialize(stream, other.map(SceneObject::behaviour))
    }

    /// Applies the fields present in `stream` on top of the current state.
    pub fn deserialize(&mut self, stream: &ReadStream<'_>) -> Result<(), DeserializeError> {
        if let Some(parent_id) = stream.read_id("ParentID")? {
            self.parent_id = parent_id;
        }
        if let (Some(prefab_id), Some(prefab_object_id)) = (
            stream.read_raw_id("PrefabID")?,
            stream.read_raw_id("PrefabObjectID")?,
        ) {
            self.prefab = PrefabLink::new(prefab_id, prefab_object_id);
        }
        match &mut self.kind {
            ObjectKind::Actor(actor) => {
                stream.read_into("Name", &mut actor.name)?;
                read_transform(stream, &mut actor.transform)?;
                stream.read_into("IsActive", &mut actor.is_active)?;
                if !stream.read_into("Tags", &mut actor.tags)?
                    && stream.engine_build() < TAGS_ARRAY_BUILD
                    && let Some(tag) = stream.read::<String>("Tag")?
                {
                    actor.tags = if tag.is_empty() { Vec::new() } else { vec![tag] };
                    stream.mark_deprecated();
                }
                stream.read_into("Layer", &mut actor.layer)?;
            }
            ObjectKind::Script(script) => {
                stream.read_into("Enabled", &mut script.enabled)?;
            }
        }
        self.behaviour.deserialize(stream)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub(crate) fn initialize(&mut self) {
        if self.state.initialized || self.state.destroyed {
            return;
        }
        self.state.initialized = true;
        self.behaviour.on_initialize(self.id);
    }

    pub(crate) fn begin_play(&mut self) {
        if self.state.playing || !self.state.initialized || self.state.destroyed {
            return;
        }
        self.state.playing = true;
        self.behaviour.on_begin_play(self.id);
    }

    pub(crate) fn end_play(&mut self) {
        if !self.state.playing {
            return;
        }
        self.state.playing = false;
        self.behaviour.on_end_play(self.id);
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.state.destroyed = true;
    }

    // ------------------------------------------------------------------
    // Hierarchy plumbing (see `hierarchy`)
    // ------------------------------------------------------------------

    pub(crate) fn set_parent_link(&mut self, parent: Option<&ObjectRef>, parent_id: Guid) {
        self.parent = parent.map(Arc::downgrade);
        self.parent_id = parent_id;
    }

    pub(crate) fn set_world_transform(&mut self, world: Transform) {
        if let Some(actor) = self.actor_mut() {
            actor.world = world;
        }
    }

    /// Children list, or the script list when `script` is set.
    pub(crate) fn slot_mut(&mut self, script: bool) -> Option<&mut Vec<ObjectRef>> {
        let actor = self.actor_mut()?;
        Some(if script {
            &mut actor.scripts
        } else {
            &mut actor.children
        })
    }

    pub(crate) fn take_children(&mut self) -> (Vec<ObjectRef>, Vec<ObjectRef>) {
        match self.actor_mut() {
            Some(actor) => (
                std::mem::take(&mut actor.children),
                std::mem::take(&mut actor.scripts),
            ),
            None => (Vec::new(), Vec::new()),
        }
    }
}

impl std::fmt::Debug for SceneObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneObject")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("name", &self.name())
            .field("parent_id", &self.parent_id)
            .field("prefab", &self.prefab)
            .finish_non_exhaustive()
    }
}

/// Writes only the transform components that differ from `base`.
fn write_transform(
    stream: &mut WriteStream,
    value: &Transform,
    base: Option<&Transform>,
) -> Result<(), SerializeError> {
    let mut map = Map::new();
    let mut put = |name: &str, changed: bool, v: &[f32]| -> Result<(), SerializeError> {
        if changed {
            let encoded = serde_json::to_value(v).map_err(|e| SerializeError::FieldError {
                field: format!("Transform.{name}"),
                message: e.to_string(),
            })?;
            map.insert(name.to_owned(), encoded);
        }
        Ok(())
    };
    put(
        "Translation",
        base.is_none_or(|b| b.translation != value.translation),
        value.translation.as_slice(),
    )?;
    put(
        "Orientation",
        base.is_none_or(|b| b.orientation != value.orientation),
        value.orientation.as_slice(),
    )?;
    put(
        "Scale",
        base.is_none_or(|b| b.scale != value.scale),
        value.scale.as_slice(),
    )?;
    if !map.is_empty() {
        stream.write_value("Transform", Value::Object(map));
    }
    Ok(())
}

fn read_transform(stream: &ReadStream<'_>, target: &mut Transform) -> Result<(), DeserializeError> {
    let Some(value) = stream.get("Transform") else {
        return Ok(());
    };
    let Some(map) = value.as_object() else {
        return Err(DeserializeError::TypeMismatch {
            field: "Transform".to_owned(),
            expected: "object".to_owned(),
            found: value.to_string(),
        });
    };
    let part = ReadStream::new(map, stream.modifier());
    part.read_into("Translation", &mut target.translation)?;
    part.read_into("Orientation", &mut target.orientation)?;
    part.read_into("Scale", &mut target.scale)?;
    Ok(())
}
