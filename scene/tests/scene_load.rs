mod common;

use std::time::Duration;

use common::*;
use redlilium_core::Guid;
use redlilium_scene::registry::objects;
use redlilium_scene::serialize::{ENGINE_BUILD, TAGS_ARRAY_BUILD};
use redlilium_scene::{
    LoadStage, LoadStatus, SceneError, SceneLoader, SceneSettings, hierarchy, save_scene,
};
use rstest::rstest;
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn plain_scene_round_trips() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let a = Guid::new();
    let b = Guid::new();
    let script = Guid::new();
    let mut lamp = actor(b, a, "Lamp");
    lamp["Transform"] = json!({ "Translation": [1.0, 2.0, 3.0] });
    lamp["Layer"] = json!(4);
    let doc = scene_document(
        scene_id,
        vec![
            actor(a, scene_id, "Room"),
            target_script_data(script, a, b),
            lamp,
        ],
    );

    let scene = fx.load(doc.clone());
    assert_eq!(scene.read().id(), scene_id);
    assert!(scene.read().is_playing());
    let room = hierarchy::find_by_name(&scene, "Room").unwrap();
    assert_eq!(child_names(&room), vec!["Lamp"]);
    let lamp = room.read().children()[0].clone();
    let world = lamp.read().actor().unwrap().world_transform();
    assert_eq!(world.translation, [1.0, 2.0, 3.0]);
    assert_eq!(target_of(&room.read().scripts()[0]), b);

    let saved = save_scene(&scene, &fx.library).unwrap();
    assert_eq!(saved, doc);
}

#[test]
fn references_resolve_regardless_of_order() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let a = Guid::new();
    let b = Guid::new();
    let script = Guid::new();
    // The script and the child come before their parent in the array.
    let doc = scene_document(
        scene_id,
        vec![
            target_script_data(script, a, a),
            actor(b, a, "Child"),
            actor(a, scene_id, "Parent"),
        ],
    );
    let scene = fx.load(doc);
    let parent = hierarchy::find_by_name(&scene, "Parent").unwrap();
    assert_eq!(child_names(&parent), vec!["Child"]);
    assert_eq!(target_of(&parent.read().scripts()[0]), a);
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

#[test]
fn legacy_tag_is_upgraded() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let a = Guid::new();
    let mut doc = scene_document(scene_id, vec![]);
    doc["EngineBuild"] = json!(TAGS_ARRAY_BUILD - 130);
    doc["Data"]
        .as_array_mut()
        .unwrap()
        .push(json!({
            "ID": a.to_string(),
            "TypeName": "Actor",
            "ParentID": scene_id.to_string(),
            "Tag": "Enemy",
        }));

    let mut loader = SceneLoader::new(doc, fx.library.clone(), &SceneSettings::default());
    let scene = loader.run_to_end().unwrap();
    assert!(loader.is_deprecated());
    let enemy = objects().find(a).unwrap();
    assert_eq!(enemy.read().actor().unwrap().tags, vec!["Enemy".to_owned()]);

    let saved = save_scene(&scene, &fx.library).unwrap();
    assert_eq!(saved["EngineBuild"], json!(ENGINE_BUILD));
    assert_eq!(saved["Data"][1]["Tags"], json!(["Enemy"]));
    assert!(saved["Data"][1].get("Tag").is_none());
}

#[test]
fn current_scene_is_not_deprecated() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let doc = scene_document(scene_id, vec![actor(Guid::new(), scene_id, "A")]);
    let mut loader = SceneLoader::new(doc, fx.library.clone(), &SceneSettings::default());
    loader.run_to_end().unwrap();
    assert!(!loader.is_deprecated());
}

#[rstest]
#[case(5000)]
#[case(ENGINE_BUILD + 1)]
fn unsupported_build_is_rejected(#[case] build: u32) {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let mut doc = scene_document(scene_id, vec![]);
    doc["EngineBuild"] = json!(build);
    let mut loader = SceneLoader::new(doc, fx.library.clone(), &SceneSettings::default());
    let err = loader.tick(Duration::MAX).unwrap_err();
    assert!(matches!(err, SceneError::UnsupportedVersion { build: b, .. } if b == build));
    assert!(loader.scene().is_none());
}

#[rstest]
#[case(json!({ "EngineBuild": ENGINE_BUILD }))]
#[case(json!({ "EngineBuild": ENGINE_BUILD, "Data": [] }))]
#[case(json!({ "EngineBuild": ENGINE_BUILD, "Data": [3] }))]
#[case(json!({ "Data": [{ "ID": Guid::new().to_string(), "TypeName": "Scene" }] }))]
fn malformed_documents_fail(#[case] doc: Value) {
    let fx = Fixture::new();
    let mut loader = SceneLoader::new(doc, fx.library.clone(), &SceneSettings::default());
    assert!(matches!(
        loader.run_to_end(),
        Err(SceneError::InvalidStream(_))
    ));
}

#[test]
fn root_must_be_a_scene() {
    let fx = Fixture::new();
    let id = Guid::new();
    let doc = document(id, "Actor", vec![prefab_root(id, "NotAScene")]);
    let mut loader = SceneLoader::new(doc, fx.library.clone(), &SceneSettings::default());
    assert!(matches!(
        loader.run_to_end(),
        Err(SceneError::NotASceneObject { .. })
    ));
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[test]
fn unknown_types_keep_a_placeholder() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let widget = Guid::new();
    let doc = scene_document(
        scene_id,
        vec![json!({
            "ID": widget.to_string(),
            "TypeName": "Plugin.Widget",
            "ParentID": scene_id.to_string(),
            "Name": "Widget",
            "Speed": 3,
        })],
    );
    let scene = fx.load(doc.clone());
    let placeholder = objects().find(widget).unwrap();
    assert_eq!(placeholder.read().type_name(), "Plugin.Widget");
    assert_eq!(placeholder.read().name(), "Widget");

    let saved = save_scene(&scene, &fx.library).unwrap();
    assert_eq!(saved, doc);
}

#[test]
fn unknown_types_are_dropped_without_placeholders() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let widget = Guid::new();
    let child = Guid::new();
    let doc = scene_document(
        scene_id,
        vec![
            json!({
                "ID": widget.to_string(),
                "TypeName": "Plugin.Widget",
                "ParentID": scene_id.to_string(),
            }),
            actor(child, widget, "Orphan"),
        ],
    );
    let settings = SceneSettings {
        missing_object_placeholders: false,
        ..SceneSettings::default()
    };
    let scene = fx.load_with(doc, &settings);
    assert!(scene.read().children().is_empty());
    assert!(!objects().contains(widget));
    assert!(!objects().contains(child));
}

#[test]
fn missing_prefab_drops_only_the_instance() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let kept = Guid::new();
    let doc = scene_document(
        scene_id,
        vec![
            instance(Guid::new(), scene_id, Guid::new(), Guid::new()),
            actor(kept, scene_id, "Kept"),
        ],
    );
    let scene = fx.load(doc);
    assert_eq!(child_names(&scene), vec!["Kept"]);
}

#[test]
fn orphans_are_deleted() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let orphan = Guid::new();
    let doc = scene_document(scene_id, vec![actor(orphan, Guid::new(), "Orphan")]);
    let scene = fx.load(doc);
    assert!(scene.read().children().is_empty());
    assert!(!objects().contains(orphan));
}

#[test]
fn parentless_objects_belong_to_the_scene() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let absent = Guid::new();
    let zero = Guid::new();
    let doc = scene_document(
        scene_id,
        vec![
            json!({ "ID": absent.to_string(), "TypeName": "Actor", "Name": "Absent" }),
            actor(zero, Guid::EMPTY, "Zero"),
        ],
    );
    let scene = fx.load(doc);
    assert_eq!(child_names(&scene), vec!["Absent", "Zero"]);
    for id in [absent, zero] {
        let object = objects().find(id).unwrap();
        assert_eq!(object.read().parent_id(), scene_id);
        assert!(object.read().is_playing());
    }
}

#[test]
fn self_parent_and_cycles_are_dropped() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let own = Guid::new();
    let a = Guid::new();
    let b = Guid::new();
    let fine = Guid::new();
    let doc = scene_document(
        scene_id,
        vec![
            actor(own, own, "Self"),
            actor(a, b, "A"),
            actor(b, a, "B"),
            actor(fine, scene_id, "Fine"),
        ],
    );
    let scene = fx.load(doc);
    assert_eq!(child_names(&scene), vec!["Fine"]);
    for id in [own, a, b] {
        assert!(!objects().contains(id), "{id} should be gone");
    }
}

#[test]
fn bad_ids_are_skipped() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let doc = scene_document(
        scene_id,
        vec![
            json!({ "ID": "not-an-id", "TypeName": "Actor", "ParentID": scene_id.to_string() }),
            json!({ "ID": Guid::EMPTY.to_string(), "TypeName": "Actor", "ParentID": scene_id.to_string() }),
            actor(Guid::new(), scene_id, "Good"),
        ],
    );
    let scene = fx.load(doc);
    assert_eq!(child_names(&scene), vec!["Good"]);
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[rstest]
#[case(false, false)]
#[case(true, false)]
#[case(true, true)]
fn parallel_stages_keep_order(#[case] parallel_spawn: bool, #[case] parallel_deserialize: bool) {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let group = Guid::new();
    let mut objects_data = vec![actor(group, scene_id, "Group")];
    let mut expected = Vec::new();
    for i in 0..200 {
        let name = format!("Child{i:03}");
        objects_data.push(actor(Guid::new(), group, &name));
        expected.push(name);
    }
    let settings = SceneSettings {
        parallel_spawn,
        parallel_deserialize,
        parallel_min_batch: 8,
        parallel_threads: Some(4),
        ..SceneSettings::default()
    };
    let scene = fx.load_with(scene_document(scene_id, objects_data), &settings);
    let group = hierarchy::find_by_name(&scene, "Group").unwrap();
    assert_eq!(child_names(&group), expected);
}

#[test]
fn zero_budget_still_makes_progress() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let data = (0..20)
        .map(|i| actor(Guid::new(), scene_id, &format!("A{i}")))
        .collect();
    let mut loader = SceneLoader::new(
        scene_document(scene_id, data),
        fx.library.clone(),
        &SceneSettings::default(),
    );

    let mut ticks = 0;
    let mut stages = vec![loader.stage()];
    while loader.tick(Duration::ZERO).unwrap() == LoadStatus::Wait {
        ticks += 1;
        assert!(ticks < 1000, "loader stopped making progress");
        if stages.last() != Some(&loader.stage()) {
            stages.push(loader.stage());
        }
    }
    assert!(ticks > 1);
    assert!(loader.is_done());
    assert!(stages.contains(&LoadStage::Spawn));
    assert!(stages.contains(&LoadStage::Deserialize));
    assert_eq!(loader.scene().unwrap().read().children().len(), 20);
}

#[test]
fn abort_deletes_partial_scene() {
    let fx = Fixture::new();
    let scene_id = Guid::new();
    let a = Guid::new();
    let mut loader = SceneLoader::new(
        scene_document(scene_id, vec![actor(a, scene_id, "A")]),
        fx.library.clone(),
        &SceneSettings::default(),
    );
    assert_eq!(loader.tick(Duration::ZERO).unwrap(), LoadStatus::Wait);
    assert!(objects().contains(scene_id));
    loader.abort();
    assert!(loader.is_done());
    assert!(!objects().contains(scene_id));
}
