use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use redlilium_core::guid::Guid;
use redlilium_scene::serialize::ENGINE_BUILD;
use redlilium_scene::{
    MemorySource, ObjectRef, PrefabLibrary, SceneLoader, SceneSettings, clone_objects, hierarchy,
    save_scene, spawn_prefab,
};
use serde_json::{Value, json};

fn library() -> (MemorySource, Arc<PrefabLibrary>) {
    let source = MemorySource::new();
    let library = Arc::new(PrefabLibrary::new(Arc::new(source.clone())));
    (source, library)
}

/// Scene with `groups` actors under the root, each holding `per_group`
/// children.
fn scene_document(groups: usize, per_group: usize) -> Value {
    let scene = Guid::new();
    let mut data = vec![json!({ "ID": scene.to_string(), "TypeName": "Scene" })];
    for g in 0..groups {
        let group = Guid::new();
        data.push(json!({
            "ID": group.to_string(),
            "TypeName": "Actor",
            "ParentID": scene.to_string(),
            "Name": format!("Group{g}"),
        }));
        for c in 0..per_group {
            data.push(json!({
                "ID": Guid::new().to_string(),
                "TypeName": "Actor",
                "ParentID": group.to_string(),
                "Name": format!("Child{c}"),
                "Transform": { "Translation": [c as f32, 0.0, 0.0] },
            }));
        }
    }
    json!({
        "ID": scene.to_string(),
        "TypeName": "Scene",
        "EngineBuild": ENGINE_BUILD,
        "Data": data,
    })
}

fn load(document: &Value, library: &Arc<PrefabLibrary>, settings: &SceneSettings) -> ObjectRef {
    let mut loader = SceneLoader::new(document.clone(), Arc::clone(library), settings);
    match loader.run_to_end() {
        Ok(scene) => scene,
        Err(err) => panic!("benchmark scene failed to load: {err}"),
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn bench_load(c: &mut Criterion) {
    let (_, library) = library();
    let document = scene_document(20, 50);
    let mut group = c.benchmark_group("scene_load_1000");
    for parallel in [false, true] {
        let settings = SceneSettings {
            parallel_spawn: parallel,
            parallel_deserialize: parallel,
            ..SceneSettings::default()
        };
        let label = if parallel { "parallel" } else { "serial" };
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter(|| {
                let scene = load(black_box(&document), &library, &settings);
                hierarchy::delete_object(&scene);
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Saving and cloning
// ---------------------------------------------------------------------------

fn bench_save(c: &mut Criterion) {
    let (_, library) = library();
    let scene = load(&scene_document(20, 50), &library, &SceneSettings::default());
    c.bench_function("scene_save_1000", |b| {
        b.iter(|| black_box(save_scene(&scene, &library)));
    });
    hierarchy::delete_object(&scene);
}

fn bench_clone(c: &mut Criterion) {
    let (_, library) = library();
    let scene = load(&scene_document(1, 200), &library, &SceneSettings::default());
    let group = scene.read().children()[0].clone();
    c.bench_function("clone_subtree_200", |b| {
        b.iter(|| {
            if let Ok(copies) = clone_objects(black_box(std::slice::from_ref(&group)), &library) {
                for copy in &copies {
                    hierarchy::delete_object(copy);
                }
            }
        });
    });
    hierarchy::delete_object(&scene);
}

// ---------------------------------------------------------------------------
// Prefabs
// ---------------------------------------------------------------------------

fn bench_spawn_prefab(c: &mut Criterion) {
    let (source, library) = library();
    let prefab_id = Guid::new();
    let root = Guid::new();
    let mut data = vec![json!({ "ID": root.to_string(), "TypeName": "Actor", "Name": "Tree" })];
    for i in 0..32 {
        data.push(json!({
            "ID": Guid::new().to_string(),
            "TypeName": "Actor",
            "ParentID": root.to_string(),
            "Name": format!("Branch{i}"),
        }));
    }
    source.insert(
        prefab_id,
        &json!({
            "ID": prefab_id.to_string(),
            "TypeName": "Actor",
            "EngineBuild": ENGINE_BUILD,
            "Data": data,
        }),
    );
    c.bench_function("spawn_prefab_33", |b| {
        b.iter(|| {
            if let Ok(instance) = spawn_prefab(&library, black_box(prefab_id), None) {
                hierarchy::delete_object(&instance);
            }
        });
    });
}

criterion_group!(
    benches,
    bench_load,
    bench_save,
    bench_clone,
    bench_spawn_prefab,
);
criterion_main!(benches);
