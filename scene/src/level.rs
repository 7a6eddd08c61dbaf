//! The set of loaded scenes and the operations that change it.
//!
//! Every operation is available directly and as a queued
//! [`SceneAction`]. Queued actions run from [`Level::tick`] under the
//! configured time budget, strictly in enqueue order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard, RwLock};
use redlilium_core::Guid;
use serde_json::Value;

use crate::SceneError;
use crate::actions::{
    ActionOutcome, ActionQueue, ActionStatus, DeleteActor, LoadScene, ReloadScripts, SaveAll,
    SaveScene, SceneAction, SpawnActor, UnloadAll, UnloadScene,
};
use crate::events::{Events, LevelEvent};
use crate::hierarchy;
use crate::loader::SceneLoader;
use crate::object::ObjectRef;
use crate::prefab::PrefabLibrary;
use crate::registry::objects;
use crate::save;
use crate::settings::SceneSettings;

type ScriptReloadHook = Box<dyn FnMut() + Send>;

pub struct Level {
    scenes: RwLock<Vec<ObjectRef>>,
    queue: ActionQueue,
    tick_lock: Mutex<()>,
    events: Mutex<Events<LevelEvent>>,
    library: Arc<PrefabLibrary>,
    settings: SceneSettings,
    script_reload: Mutex<Option<ScriptReloadHook>>,
}

impl Level {
    pub fn new(library: Arc<PrefabLibrary>, settings: SceneSettings) -> Self {
        Self {
            scenes: RwLock::new(Vec::new()),
            queue: ActionQueue::new(),
            tick_lock: Mutex::new(()),
            events: Mutex::new(Events::new()),
            library,
            settings,
            script_reload: Mutex::new(None),
        }
    }

    /// A level reading documents from the source `settings` names.
    pub fn from_settings(settings: SceneSettings) -> Self {
        let library = Arc::new(PrefabLibrary::new(settings.asset_source()));
        Self::new(library, settings)
    }

    pub fn library(&self) -> &Arc<PrefabLibrary> {
        &self.library
    }

    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    /// Buffered events; see [`Events`].
    pub fn events(&self) -> MutexGuard<'_, Events<LevelEvent>> {
        self.events.lock()
    }

    fn emit(&self, event: LevelEvent) {
        log::trace!("Level event: {event:?}");
        self.events.lock().send(event);
    }

    // ------------------------------------------------------------------
    // Scenes
    // ------------------------------------------------------------------

    /// Snapshot of the loaded scene roots.
    pub fn scenes(&self) -> Vec<ObjectRef> {
        self.scenes.read().clone()
    }

    pub fn find_scene(&self, id: Guid) -> Option<ObjectRef> {
        self.scenes
            .read()
            .iter()
            .find(|scene| scene.read().id() == id)
            .cloned()
    }

    pub fn is_scene_loaded(&self, id: Guid) -> bool {
        self.find_scene(id).is_some()
    }

    /// Loads scene `id` from the asset source in one go.
    pub fn load_scene(&self, id: Guid) -> Result<ObjectRef, SceneError> {
        if let Some(scene) = self.find_scene(id) {
            return Ok(scene);
        }
        let mut loader = self.begin_load(id)?;
        self.run_loader(id, &mut loader)?;
        self.finish_load(id, loader)
    }

    /// Loads a scene from an in-memory document in one go.
    pub fn load_scene_document(&self, document: Value) -> Result<ObjectRef, SceneError> {
        let id = document
            .get("ID")
            .and_then(Value::as_str)
            .and_then(Guid::parse_hex)
            .unwrap_or(Guid::EMPTY);
        if id.is_valid()
            && let Some(scene) = self.find_scene(id)
        {
            return Ok(scene);
        }
        self.emit(LevelEvent::SceneLoading(id));
        let mut loader = SceneLoader::new(document, Arc::clone(&self.library), &self.settings);
        self.run_loader(id, &mut loader)?;
        self.finish_load(id, loader)
    }

    fn run_loader(&self, id: Guid, loader: &mut SceneLoader) -> Result<(), SceneError> {
        if let Err(err) = loader.run_to_end() {
            self.fail_load(id, &err);
            return Err(err);
        }
        Ok(())
    }

    /// Reads the document of scene `id` and prepares its loader.
    pub(crate) fn begin_load(&self, id: Guid) -> Result<SceneLoader, SceneError> {
        self.emit(LevelEvent::SceneLoading(id));
        let document = match self.library.source().load_json(id) {
            Ok(document) => document,
            Err(err) => {
                let err = SceneError::from(err);
                self.fail_load(id, &err);
                return Err(err);
            }
        };
        Ok(SceneLoader::new(document, Arc::clone(&self.library), &self.settings))
    }

    /// Adds a fully loaded scene to the level.
    pub(crate) fn finish_load(
        &self,
        requested_id: Guid,
        loader: SceneLoader,
    ) -> Result<ObjectRef, SceneError> {
        let scene = loader.scene().cloned().ok_or_else(|| {
            SceneError::InvalidStream(format!("loading scene {requested_id} produced no scene"))
        })?;
        let id = scene.read().id();
        if self.is_scene_loaded(id) {
            hierarchy::delete_object(&scene);
            let err = SceneError::InvalidArgument(format!("scene {id} is already loaded"));
            self.fail_load(id, &err);
            return Err(err);
        }
        self.scenes.write().push(Arc::clone(&scene));
        self.emit(LevelEvent::SceneLoaded(id));

        if loader.is_deprecated() && self.settings.resave_deprecated {
            log::info!("Scene {id} was stored in an outdated format; saving it again");
            if let Err(err) = self.save_scene(id) {
                log::warn!("Failed to resave scene {id}: {err}");
            }
        }
        Ok(scene)
    }

    pub(crate) fn fail_load(&self, id: Guid, err: &SceneError) {
        log::error!("Failed to load scene {id}: {err}");
        self.emit(LevelEvent::SceneLoadError {
            scene: id,
            error: err.to_string(),
        });
    }

    pub fn unload_scene(&self, id: Guid) -> Result<(), SceneError> {
        let scene = self
            .find_scene(id)
            .ok_or_else(|| SceneError::InvalidArgument(format!("scene {id} is not loaded")))?;
        self.emit(LevelEvent::SceneUnloading(id));
        self.scenes.write().retain(|s| !Arc::ptr_eq(s, &scene));
        hierarchy::delete_object(&scene);
        self.emit(LevelEvent::SceneUnloaded(id));
        log::info!("Unloaded scene {id}");
        Ok(())
    }

    pub fn unload_all(&self) {
        let ids: Vec<Guid> = self.scenes.read().iter().map(|s| s.read().id()).collect();
        for id in ids {
            if let Err(err) = self.unload_scene(id) {
                log::warn!("{err}");
            }
        }
    }

    /// Serializes scene `id` without writing it anywhere.
    pub fn serialize_scene(&self, id: Guid) -> Result<Value, SceneError> {
        let scene = self
            .find_scene(id)
            .ok_or_else(|| SceneError::InvalidArgument(format!("scene {id} is not loaded")))?;
        save::save_scene(&scene, &self.library)
    }

    /// Saves scene `id` to the asset source.
    pub fn save_scene(&self, id: Guid) -> Result<(), SceneError> {
        self.emit(LevelEvent::SceneSaving(id));
        let result = self.serialize_scene(id).and_then(|document| {
            self.library
                .source()
                .save_json(id, &document)
                .map_err(SceneError::from)
        });
        match &result {
            Ok(()) => {
                log::info!("Saved scene {id}");
                self.emit(LevelEvent::SceneSaved(id));
            }
            Err(err) => {
                log::error!("Failed to save scene {id}: {err}");
                self.emit(LevelEvent::SceneSaveError {
                    scene: id,
                    error: err.to_string(),
                });
            }
        }
        result
    }

    /// Saves every scene; reports the first failure after trying all.
    pub fn save_all(&self) -> Result<(), SceneError> {
        let ids: Vec<Guid> = self.scenes.read().iter().map(|s| s.read().id()).collect();
        let mut first_error = None;
        for id in ids {
            if let Err(err) = self.save_scene(id) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // ------------------------------------------------------------------
    // Actors
    // ------------------------------------------------------------------

    /// Attaches `actor` (and its subtree) under `parent`, or under the
    /// first loaded scene when `parent` is `None`.
    pub fn spawn_actor(&self, actor: &ObjectRef, parent: Option<&ObjectRef>) -> Result<(), SceneError> {
        if !actor.read().is_actor() {
            return Err(SceneError::InvalidArgument("only actors can be spawned".to_owned()));
        }
        let parent = match parent {
            Some(parent) => Arc::clone(parent),
            None => self.scenes.read().first().cloned().ok_or_else(|| {
                SceneError::InvalidArgument("no scene loaded to spawn the actor in".to_owned())
            })?,
        };
        hierarchy::set_parent(actor, Some(&parent))?;
        hierarchy::register_tree(actor);
        hierarchy::initialize_tree(actor);
        hierarchy::update_world_transforms(actor);
        if parent.read().is_playing() {
            hierarchy::begin_play_tree(actor);
        }
        let id = actor.read().id();
        log::debug!("Spawned actor {id}");
        self.emit(LevelEvent::ActorSpawned(id));
        Ok(())
    }

    /// Deletes `actor` and its subtree. Scene roots are unloaded instead.
    pub fn delete_actor(&self, actor: &ObjectRef) -> Result<(), SceneError> {
        let id = actor.read().id();
        if self.scenes.read().iter().any(|s| Arc::ptr_eq(s, actor)) {
            return Err(SceneError::InvalidArgument(format!(
                "{id} is a scene; unload it instead"
            )));
        }
        if actor.read().is_destroyed() {
            return Err(SceneError::InvalidArgument(format!("actor {id} is already deleted")));
        }
        hierarchy::delete_object(actor);
        self.emit(LevelEvent::ActorDeleted(id));
        Ok(())
    }

    pub fn set_actor_parent(&self, actor: &ObjectRef, parent: &ObjectRef) -> Result<(), SceneError> {
        hierarchy::set_parent(actor, Some(parent))?;
        hierarchy::update_world_transforms(actor);
        self.emit(LevelEvent::ActorParentChanged {
            actor: actor.read().id(),
            parent: parent.read().id(),
        });
        Ok(())
    }

    pub fn set_actor_order(&self, actor: &ObjectRef, order: usize) -> Result<(), SceneError> {
        if !hierarchy::set_order_in_parent(actor, order) {
            return Err(SceneError::InvalidArgument(format!(
                "actor {} has no parent",
                actor.read().id()
            )));
        }
        let order = hierarchy::order_in_parent(actor).unwrap_or(order);
        self.emit(LevelEvent::ActorOrderChanged {
            actor: actor.read().id(),
            order,
        });
        Ok(())
    }

    pub fn set_actor_name(&self, actor: &ObjectRef, name: &str) -> Result<(), SceneError> {
        let id = {
            let mut a = actor.write();
            let id = a.id();
            let data = a
                .actor_mut()
                .ok_or_else(|| SceneError::InvalidArgument(format!("{id} is not an actor")))?;
            if data.name == name {
                return Ok(());
            }
            data.name = name.to_owned();
            id
        };
        self.emit(LevelEvent::ActorNameChanged {
            actor: id,
            name: name.to_owned(),
        });
        Ok(())
    }

    pub fn set_actor_active(&self, actor: &ObjectRef, active: bool) -> Result<(), SceneError> {
        let id = {
            let mut a = actor.write();
            let id = a.id();
            let data = a
                .actor_mut()
                .ok_or_else(|| SceneError::InvalidArgument(format!("{id} is not an actor")))?;
            if data.is_active == active {
                return Ok(());
            }
            data.is_active = active;
            id
        };
        self.emit(LevelEvent::ActorActiveChanged { actor: id, active });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scripts
    // ------------------------------------------------------------------

    /// Installs the callback that swaps script types during
    /// [`reload_scripts`](Self::reload_scripts).
    pub fn set_script_reload_hook(&self, hook: impl FnMut() + Send + 'static) {
        *self.script_reload.lock() = Some(Box::new(hook));
    }

    /// Saves all scenes to memory, unloads them, runs the reload hook and
    /// loads the scenes back.
    pub fn reload_scripts(&self) -> Result<(), SceneError> {
        self.emit(LevelEvent::ScriptsReloading);
        let ids: Vec<Guid> = self.scenes.read().iter().map(|s| s.read().id()).collect();
        let mut documents = Vec::with_capacity(ids.len());
        for id in &ids {
            documents.push(self.serialize_scene(*id)?);
        }
        self.unload_all();
        objects().prune();

        if let Some(hook) = self.script_reload.lock().as_mut() {
            hook();
        }

        let mut first_error = None;
        for document in documents {
            if let Err(err) = self.load_scene_document(document) {
                first_error.get_or_insert(err);
            }
        }
        self.emit(LevelEvent::ScriptsReloaded);
        log::info!("Reloaded scripts ({} scenes)", ids.len());
        first_error.map_or(Ok(()), Err)
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    pub fn enqueue(&self, action: Box<dyn SceneAction>) {
        self.queue.push(action);
    }

    pub fn enqueue_load_scene(&self, id: Guid) {
        self.enqueue(Box::new(LoadScene::new(id)));
    }

    pub fn enqueue_unload_scene(&self, id: Guid) {
        self.enqueue(Box::new(UnloadScene { scene_id: id }));
    }

    pub fn enqueue_unload_all(&self) {
        self.enqueue(Box::new(UnloadAll));
    }

    pub fn enqueue_save_scene(&self, id: Guid) {
        self.enqueue(Box::new(SaveScene { scene_id: id }));
    }

    pub fn enqueue_save_all(&self) {
        self.enqueue(Box::new(SaveAll));
    }

    pub fn enqueue_spawn_actor(&self, actor: ObjectRef, parent: Option<ObjectRef>) {
        self.enqueue(Box::new(SpawnActor { actor, parent }));
    }

    pub fn enqueue_delete_actor(&self, actor: ObjectRef) {
        self.enqueue(Box::new(DeleteActor { actor }));
    }

    pub fn enqueue_reload_scripts(&self) {
        self.enqueue(Box::new(ReloadScripts));
    }

    pub fn pending_actions(&self) -> usize {
        self.queue.len()
    }

    /// Advances the event buffer, then runs queued actions until the queue
    /// is empty, an action waits, or the action budget is used up.
    pub fn tick(&self) -> Vec<ActionOutcome> {
        let budget = self.settings.action_budget();
        self.tick_with_budget(budget)
    }

    pub fn tick_with_budget(&self, budget: Duration) -> Vec<ActionOutcome> {
        let _running = self.tick_lock.lock();
        self.events.lock().update();

        let start = Instant::now();
        let mut outcomes = Vec::new();
        while let Some(mut action) = self.queue.pop_front() {
            let remaining = budget.saturating_sub(start.elapsed());
            match action.run(self, remaining) {
                ActionStatus::Done => outcomes.push(ActionOutcome {
                    description: action.description().to_owned(),
                    result: Ok(()),
                }),
                ActionStatus::Failed(err) => {
                    log::error!("Scene action '{}' failed: {err}", action.description());
                    outcomes.push(ActionOutcome {
                        description: action.description().to_owned(),
                        result: Err(err),
                    });
                }
                ActionStatus::Wait => {
                    self.queue.push_front(action);
                    break;
                }
            }
            if start.elapsed() >= budget {
                break;
            }
        }
        outcomes
    }

    /// Ticks until the queue is empty.
    pub fn flush(&self) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();
        while !self.queue.is_empty() {
            outcomes.extend(self.tick());
        }
        outcomes
    }
}
