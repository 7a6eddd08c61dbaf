//! Resumable, time-budgeted scene loading.
//!
//! [`SceneLoader::tick`] advances through the load stages until the budget
//! runs out and then reports [`LoadStatus::Wait`]; the next tick resumes at
//! the saved stage and cursor. Every tick makes progress on at least one
//! element, so a zero budget still finishes eventually.

use std::sync::Arc;
use std::time::{Duration, Instant};

use redlilium_core::Guid;
use serde_json::{Map, Value};

use crate::SceneError;
use crate::batch::{BatchOptions, SceneBatch};
use crate::hierarchy;
use crate::object::ObjectRef;
use crate::prefab::{PrefabLibrary, sync};
use crate::serialize::{SceneContext, check_engine_build, guid_field};
use crate::settings::SceneSettings;
use crate::type_registry::{SCENE_TYPE, types};

/// Load stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStage {
    Begin,
    Spawn,
    SetupPrefabs,
    SyncNewPrefabs,
    Deserialize,
    SyncPrefabs,
    SetupTransforms,
    Initialize,
    BeginPlay,
    End,
    Loaded,
}

impl LoadStage {
    fn next(self) -> Self {
        match self {
            Self::Begin => Self::Spawn,
            Self::Spawn => Self::SetupPrefabs,
            Self::SetupPrefabs => Self::SyncNewPrefabs,
            Self::SyncNewPrefabs => Self::Deserialize,
            Self::Deserialize => Self::SyncPrefabs,
            Self::SyncPrefabs => Self::SetupTransforms,
            Self::SetupTransforms => Self::Initialize,
            Self::Initialize => Self::BeginPlay,
            Self::BeginPlay => Self::End,
            Self::End | Self::Loaded => Self::Loaded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Done,
    Wait,
}

enum StageProgress {
    Finished,
    Paused,
}

/// Loads one scene document in resumable steps.
pub struct SceneLoader {
    stage: LoadStage,
    cursor: usize,
    document: Option<Value>,
    library: Arc<PrefabLibrary>,
    settings: SceneSettings,
    batch: Option<SceneBatch>,
    scene: Option<ObjectRef>,
    scene_id: Guid,
    deprecated: bool,
    started: Option<Instant>,
}

impl SceneLoader {
    pub fn new(document: Value, library: Arc<PrefabLibrary>, settings: &SceneSettings) -> Self {
        Self {
            stage: LoadStage::Begin,
            cursor: 0,
            document: Some(document),
            library,
            settings: settings.clone(),
            batch: None,
            scene: None,
            scene_id: Guid::EMPTY,
            deprecated: false,
            started: None,
        }
    }

    /// Parses `text` and prepares a loader for it.
    pub fn from_json_str(
        text: &str,
        library: Arc<PrefabLibrary>,
        settings: &SceneSettings,
    ) -> Result<Self, SceneError> {
        let document =
            serde_json::from_str(text).map_err(|e| SceneError::InvalidStream(e.to_string()))?;
        Ok(Self::new(document, library, settings))
    }

    pub fn stage(&self) -> LoadStage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.stage == LoadStage::Loaded
    }

    /// The scene root, available once the `Begin` stage has run.
    pub fn scene(&self) -> Option<&ObjectRef> {
        self.scene.as_ref()
    }

    pub fn scene_id(&self) -> Guid {
        self.scene_id
    }

    /// Whether any data was upgraded from an outdated layout.
    pub fn is_deprecated(&self) -> bool {
        self.deprecated
            || self
                .batch
                .as_ref()
                .is_some_and(SceneBatch::is_deprecated)
    }

    /// Runs stages until done or until `budget` is used up.
    ///
    /// On error everything created so far is deleted and the loader stays
    /// unusable.
    pub fn tick(&mut self, budget: Duration) -> Result<LoadStatus, SceneError> {
        let start = Instant::now();
        self.started.get_or_insert(start);
        while self.stage != LoadStage::Loaded {
            match self.run_stage(start, budget) {
                Ok(StageProgress::Finished) => {
                    let next = self.stage.next();
                    log::debug!("Scene {}: {:?} -> {:?}", self.scene_id, self.stage, next);
                    self.stage = next;
                    self.cursor = 0;
                }
                Ok(StageProgress::Paused) => return Ok(LoadStatus::Wait),
                Err(err) => {
                    self.abort();
                    return Err(err);
                }
            }
            if self.stage != LoadStage::Loaded && start.elapsed() >= budget {
                return Ok(LoadStatus::Wait);
            }
        }
        Ok(LoadStatus::Done)
    }

    /// Runs every remaining stage.
    pub fn run_to_end(&mut self) -> Result<ObjectRef, SceneError> {
        while self.tick(Duration::MAX)? == LoadStatus::Wait {}
        self.scene
            .clone()
            .ok_or_else(|| SceneError::InvalidStream("scene loader produced no scene".to_owned()))
    }

    /// Deletes everything created so far.
    pub fn abort(&mut self) {
        if let Some(batch) = self.batch.take() {
            for object in batch.live_objects() {
                hierarchy::delete_object(object);
            }
        }
        if let Some(scene) = self.scene.take() {
            hierarchy::delete_object(&scene);
        }
        self.document = None;
        self.stage = LoadStage::Loaded;
    }

    fn batch_mut(&mut self) -> Result<&mut SceneBatch, SceneError> {
        self.batch
            .as_mut()
            .ok_or_else(|| SceneError::InvalidStream("scene loader has no data".to_owned()))
    }

    fn run_stage(&mut self, start: Instant, budget: Duration) -> Result<StageProgress, SceneError> {
        match self.stage {
            LoadStage::Begin => {
                self.begin()?;
                Ok(StageProgress::Finished)
            }
            LoadStage::Spawn => {
                self.cursor = self.cursor.max(1);
                let parallel = self.settings.parallel_spawn;
                self.run_elements(start, budget, parallel, |batch, range| {
                    batch.spawn_range(range)
                })
            }
            LoadStage::SetupPrefabs => {
                sync::setup_prefab_instances(self.batch_mut()?);
                Ok(StageProgress::Finished)
            }
            LoadStage::SyncNewPrefabs => {
                sync::synchronize_new_prefab_instances(self.batch_mut()?);
                Ok(StageProgress::Finished)
            }
            LoadStage::Deserialize => {
                let parallel = self.settings.parallel_deserialize;
                let progress = self.run_elements(start, budget, parallel, |batch, range| {
                    batch.deserialize_range(range)
                })?;
                if let StageProgress::Finished = progress {
                    let batch = self.batch_mut()?;
                    let count = batch.data_len();
                    batch.link_range(0..count);
                }
                Ok(progress)
            }
            LoadStage::SyncPrefabs => {
                sync::synchronize_prefab_instances(self.batch_mut()?);
                Ok(StageProgress::Finished)
            }
            LoadStage::SetupTransforms => {
                if let Some(scene) = &self.scene {
                    hierarchy::update_world_transforms(scene);
                }
                Ok(StageProgress::Finished)
            }
            LoadStage::Initialize => {
                let scene = self.scene.clone();
                self.batch_mut()?.initialize_objects(scene.as_ref(), true);
                Ok(StageProgress::Finished)
            }
            LoadStage::BeginPlay => {
                if let Some(scene) = &self.scene {
                    hierarchy::begin_play_tree(scene);
                }
                Ok(StageProgress::Finished)
            }
            LoadStage::End => {
                self.end();
                Ok(StageProgress::Finished)
            }
            LoadStage::Loaded => Ok(StageProgress::Finished),
        }
    }

    /// Processes elements from the cursor on. A parallel stage takes the
    /// whole remainder at once; otherwise elements go one at a time with a
    /// budget check after each.
    fn run_elements(
        &mut self,
        start: Instant,
        budget: Duration,
        parallel: bool,
        step: impl Fn(&mut SceneBatch, std::ops::Range<usize>),
    ) -> Result<StageProgress, SceneError> {
        let cursor = self.cursor;
        let batch = self.batch_mut()?;
        let (cursor, progress) = advance(batch, cursor, start, budget, parallel, step);
        self.cursor = cursor;
        Ok(progress)
    }

    fn begin(&mut self) -> Result<(), SceneError> {
        let document = self
            .document
            .take()
            .ok_or_else(|| SceneError::InvalidStream("scene loader already started".to_owned()))?;
        let Value::Object(mut root) = document else {
            return Err(SceneError::InvalidStream(
                "scene document is not an object".to_owned(),
            ));
        };
        let engine_build = root
            .get("EngineBuild")
            .and_then(Value::as_u64)
            .and_then(|b| u32::try_from(b).ok())
            .ok_or_else(|| SceneError::InvalidStream("missing EngineBuild".to_owned()))?;
        check_engine_build(engine_build, self.settings.min_supported_build)?;

        let Some(Value::Array(items)) = root.remove("Data") else {
            return Err(SceneError::InvalidStream("missing Data array".to_owned()));
        };
        let data = items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                _ => Err(SceneError::InvalidStream(
                    "Data element is not an object".to_owned(),
                )),
            })
            .collect::<Result<Vec<Map<String, Value>>, _>>()?;
        let first = data
            .first()
            .ok_or_else(|| SceneError::InvalidStream("empty Data array".to_owned()))?;

        let root_type = first.get("TypeName").and_then(Value::as_str).unwrap_or("");
        if !types().is_assignable(root_type, SCENE_TYPE) {
            return Err(SceneError::NotASceneObject {
                type_name: root_type.to_owned(),
            });
        }
        if let Some(declared) = root.get("TypeName").and_then(Value::as_str)
            && declared != root_type
        {
            log::warn!("Scene document type '{declared}' differs from root object type '{root_type}'");
        }
        self.scene_id = guid_field(&root, "ID")
            .or_else(|| guid_field(first, "ID"))
            .unwrap_or(Guid::EMPTY);

        let context = SceneContext::new(Arc::clone(&self.library), engine_build);
        let mut batch = SceneBatch::new(data, context, BatchOptions::from_settings(&self.settings));
        let scene = batch.spawn_root()?;
        self.scene_id = scene.read().id();
        log::debug!(
            "Loading scene {} ({} objects, build {engine_build})",
            self.scene_id,
            batch.data_len()
        );
        self.scene = Some(scene);
        self.batch = Some(batch);
        Ok(())
    }

    fn end(&mut self) {
        if let Some(batch) = self.batch.take() {
            self.deprecated |= batch.is_deprecated();
            let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
            log::info!(
                "Loaded scene {} ({} objects) in {:.2} ms",
                self.scene_id,
                batch.live_objects().count(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
    }
}

fn advance(
    batch: &mut SceneBatch,
    mut cursor: usize,
    start: Instant,
    budget: Duration,
    parallel: bool,
    step: impl Fn(&mut SceneBatch, std::ops::Range<usize>),
) -> (usize, StageProgress) {
    let count = batch.data_len();
    if parallel && batch.options.par.should_split(count.saturating_sub(cursor)) {
        step(batch, cursor..count);
        return (count, StageProgress::Finished);
    }
    while cursor < count {
        step(batch, cursor..cursor + 1);
        cursor += 1;
        if cursor < count && start.elapsed() >= budget {
            return (cursor, StageProgress::Paused);
        }
    }
    (cursor, StageProgress::Finished)
}
