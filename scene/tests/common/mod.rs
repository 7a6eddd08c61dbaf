//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_core::Guid;
use redlilium_scene::behaviour::ObjectBehaviour;
use redlilium_scene::serialize::{
    DeserializeError, ENGINE_BUILD, ReadStream, SerializeError, WriteStream,
};
use redlilium_scene::{
    MemorySource, ObjectRef, PrefabLibrary, SceneLoader, SceneSettings, TypeInfo, types,
};
use serde_json::{Value, json};

pub const TARGET_SCRIPT: &str = "TargetScript";

pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Script holding a reference to another object.
#[derive(Debug, Default)]
pub struct TargetScript {
    pub target: Guid,
}

impl ObjectBehaviour for TargetScript {
    fn serialize(
        &self,
        stream: &mut WriteStream,
        other: Option<&dyn ObjectBehaviour>,
    ) -> Result<(), SerializeError> {
        let other = other.and_then(|o| o.as_any().downcast_ref::<Self>());
        stream.write_diff("Target", &self.target, other.map(|o| &o.target))
    }

    fn deserialize(&mut self, stream: &ReadStream<'_>) -> Result<(), DeserializeError> {
        if let Some(target) = stream.read_id("Target")? {
            self.target = target;
        }
        Ok(())
    }
}

fn target_script() -> Box<dyn ObjectBehaviour> {
    Box::new(TargetScript::default())
}

pub fn register_types() {
    types().register(
        TypeInfo::script(TARGET_SCRIPT)
            .with_constructor(target_script)
            .with_field("Target"),
    );
}

/// Target of the `TargetScript` attached to `object`.
pub fn target_of(script: &ObjectRef) -> Guid {
    script
        .read()
        .behaviour_as::<TargetScript>()
        .map(|s| s.target)
        .unwrap_or(Guid::EMPTY)
}

pub struct Fixture {
    pub source: MemorySource,
    pub library: Arc<PrefabLibrary>,
}

impl Fixture {
    pub fn new() -> Self {
        init_logging();
        register_types();
        let source = MemorySource::new();
        let library = Arc::new(PrefabLibrary::new(Arc::new(source.clone())));
        Self { source, library }
    }

    /// Stores a prefab made of `objects` under a fresh id.
    pub fn add_prefab(&self, objects: Vec<Value>) -> Guid {
        let id = Guid::new();
        self.put_prefab(id, objects);
        id
    }

    /// Replaces the stored prefab `id` and drops the cached copy.
    pub fn put_prefab(&self, id: Guid, objects: Vec<Value>) {
        self.source.insert(id, &document(id, "Actor", objects));
        self.library.reload(id);
    }

    pub fn load(&self, document: Value) -> ObjectRef {
        self.load_with(document, &SceneSettings::default())
    }

    pub fn load_with(&self, document: Value, settings: &SceneSettings) -> ObjectRef {
        let mut loader = SceneLoader::new(document, Arc::clone(&self.library), settings);
        match loader.run_to_end() {
            Ok(scene) => scene,
            Err(err) => panic!("scene failed to load: {err}"),
        }
    }
}

pub fn id_text(id: Guid) -> String {
    id.to_string()
}

pub fn document(id: Guid, type_name: &str, data: Vec<Value>) -> Value {
    json!({
        "ID": id.to_string(),
        "TypeName": type_name,
        "EngineBuild": ENGINE_BUILD,
        "Data": data,
    })
}

/// Scene document whose root has id `scene` followed by `objects`.
pub fn scene_document(scene: Guid, objects: Vec<Value>) -> Value {
    let mut data = vec![json!({ "ID": scene.to_string(), "TypeName": "Scene" })];
    data.extend(objects);
    document(scene, "Scene", data)
}

pub fn actor(id: Guid, parent: Guid, name: &str) -> Value {
    json!({
        "ID": id.to_string(),
        "TypeName": "Actor",
        "ParentID": parent.to_string(),
        "Name": name,
    })
}

pub fn prefab_root(id: Guid, name: &str) -> Value {
    json!({ "ID": id.to_string(), "TypeName": "Actor", "Name": name })
}

pub fn target_script_data(id: Guid, parent: Guid, target: Guid) -> Value {
    json!({
        "ID": id.to_string(),
        "TypeName": TARGET_SCRIPT,
        "ParentID": parent.to_string(),
        "Target": target.to_string(),
    })
}

pub fn instance(id: Guid, parent: Guid, prefab: Guid, prefab_object: Guid) -> Value {
    json!({
        "ID": id.to_string(),
        "ParentID": parent.to_string(),
        "PrefabID": prefab.to_string(),
        "PrefabObjectID": prefab_object.to_string(),
    })
}

pub fn names(objects: &[ObjectRef]) -> Vec<String> {
    objects.iter().map(|o| o.read().name().to_owned()).collect()
}

pub fn child_names(object: &ObjectRef) -> Vec<String> {
    names(object.read().children())
}
