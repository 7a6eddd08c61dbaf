//! Serialized scene mutations.
//!
//! A [`SceneAction`] is queued on a [`Level`] and runs during
//! [`Level::tick`]. Actions run one at a time in enqueue order; an action
//! that returns [`ActionStatus::Wait`] stays at the head of the queue and
//! resumes on the next tick.
//!
//! [`Level`]: crate::Level
//! [`Level::tick`]: crate::Level::tick

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use redlilium_core::Guid;

use crate::SceneError;
use crate::level::Level;
use crate::loader::{LoadStatus, SceneLoader};
use crate::object::ObjectRef;

/// Result of one [`SceneAction::run`] call.
#[derive(Debug)]
pub enum ActionStatus {
    Done,
    /// Not finished; run again next tick.
    Wait,
    Failed(SceneError),
}

/// A queued scene operation.
pub trait SceneAction: fmt::Debug + Send {
    /// Short human-readable name for logs.
    fn description(&self) -> &str;

    /// Runs the action. `budget` is the time left in the current tick;
    /// actions that cannot suspend ignore it.
    fn run(&mut self, level: &Level, budget: Duration) -> ActionStatus;
}

/// What happened to an action that left the queue.
#[derive(Debug)]
pub struct ActionOutcome {
    pub description: String,
    pub result: Result<(), SceneError>,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// FIFO of pending actions.
#[derive(Default)]
pub struct ActionQueue {
    actions: Mutex<VecDeque<Box<dyn SceneAction>>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, action: Box<dyn SceneAction>) {
        log::trace!("Queued scene action: {}", action.description());
        self.actions.lock().push_back(action);
    }

    pub(crate) fn pop_front(&self) -> Option<Box<dyn SceneAction>> {
        self.actions.lock().pop_front()
    }

    pub(crate) fn push_front(&self, action: Box<dyn SceneAction>) {
        self.actions.lock().push_front(action);
    }

    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }
}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.len())
            .finish()
    }
}

fn status(result: Result<(), SceneError>) -> ActionStatus {
    match result {
        Ok(()) => ActionStatus::Done,
        Err(err) => ActionStatus::Failed(err),
    }
}

// ----------------------------------------------------------------------
// Load / unload
// ----------------------------------------------------------------------

/// Loads a scene from the level's asset source, time-sliced.
///
/// Succeeds immediately when the scene is already loaded.
pub struct LoadScene {
    scene_id: Guid,
    loader: Option<SceneLoader>,
}

impl LoadScene {
    pub fn new(scene_id: Guid) -> Self {
        Self {
            scene_id,
            loader: None,
        }
    }
}

impl fmt::Debug for LoadScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadScene")
            .field("scene_id", &self.scene_id)
            .field("stage", &self.loader.as_ref().map(SceneLoader::stage))
            .finish()
    }
}

impl SceneAction for LoadScene {
    fn description(&self) -> &str {
        "Load scene"
    }

    fn run(&mut self, level: &Level, budget: Duration) -> ActionStatus {
        if self.loader.is_none() {
            if level.is_scene_loaded(self.scene_id) {
                log::debug!("Scene {} is already loaded", self.scene_id);
                return ActionStatus::Done;
            }
            match level.begin_load(self.scene_id) {
                Ok(loader) => self.loader = Some(loader),
                Err(err) => return ActionStatus::Failed(err),
            }
        }
        let Some(loader) = self.loader.as_mut() else {
            return ActionStatus::Done;
        };
        let budget = budget.min(level.settings().loader_budget());
        match loader.tick(budget) {
            Ok(LoadStatus::Wait) => ActionStatus::Wait,
            Ok(LoadStatus::Done) => {
                let Some(loader) = self.loader.take() else {
                    return ActionStatus::Done;
                };
                status(level.finish_load(self.scene_id, loader).map(|_| ()))
            }
            Err(err) => {
                self.loader = None;
                level.fail_load(self.scene_id, &err);
                ActionStatus::Failed(err)
            }
        }
    }
}

#[derive(Debug)]
pub struct UnloadScene {
    pub scene_id: Guid,
}

impl SceneAction for UnloadScene {
    fn description(&self) -> &str {
        "Unload scene"
    }

    fn run(&mut self, level: &Level, _budget: Duration) -> ActionStatus {
        status(level.unload_scene(self.scene_id))
    }
}

#[derive(Debug)]
pub struct UnloadAll;

impl SceneAction for UnloadAll {
    fn description(&self) -> &str {
        "Unload all scenes"
    }

    fn run(&mut self, level: &Level, _budget: Duration) -> ActionStatus {
        level.unload_all();
        ActionStatus::Done
    }
}

// ----------------------------------------------------------------------
// Save
// ----------------------------------------------------------------------

#[derive(Debug)]
pub struct SaveScene {
    pub scene_id: Guid,
}

impl SceneAction for SaveScene {
    fn description(&self) -> &str {
        "Save scene"
    }

    fn run(&mut self, level: &Level, _budget: Duration) -> ActionStatus {
        status(level.save_scene(self.scene_id))
    }
}

#[derive(Debug)]
pub struct SaveAll;

impl SceneAction for SaveAll {
    fn description(&self) -> &str {
        "Save all scenes"
    }

    fn run(&mut self, level: &Level, _budget: Duration) -> ActionStatus {
        status(level.save_all())
    }
}

// ----------------------------------------------------------------------
// Actors
// ----------------------------------------------------------------------

/// Adds an actor under `parent`, or under the first loaded scene.
#[derive(Debug)]
pub struct SpawnActor {
    pub actor: ObjectRef,
    pub parent: Option<ObjectRef>,
}

impl SceneAction for SpawnActor {
    fn description(&self) -> &str {
        "Spawn actor"
    }

    fn run(&mut self, level: &Level, _budget: Duration) -> ActionStatus {
        status(level.spawn_actor(&self.actor, self.parent.as_ref()))
    }
}

#[derive(Debug)]
pub struct DeleteActor {
    pub actor: ObjectRef,
}

impl SceneAction for DeleteActor {
    fn description(&self) -> &str {
        "Delete actor"
    }

    fn run(&mut self, level: &Level, _budget: Duration) -> ActionStatus {
        status(level.delete_actor(&self.actor))
    }
}

/// Saves every scene to memory, unloads them, runs the level's script
/// reload hook and loads the scenes back.
#[derive(Debug)]
pub struct ReloadScripts;

impl SceneAction for ReloadScripts {
    fn description(&self) -> &str {
        "Reload scripts"
    }

    fn run(&mut self, level: &Level, _budget: Duration) -> ActionStatus {
        status(level.reload_scripts())
    }
}
