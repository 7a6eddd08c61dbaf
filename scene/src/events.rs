//! Notifications emitted by [`Level`](crate::Level) operations.

use redlilium_core::Guid;

/// Something observable that happened to a scene or actor.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelEvent {
    SceneLoading(Guid),
    SceneLoaded(Guid),
    SceneLoadError { scene: Guid, error: String },
    SceneSaving(Guid),
    SceneSaved(Guid),
    SceneSaveError { scene: Guid, error: String },
    SceneUnloading(Guid),
    SceneUnloaded(Guid),
    ActorSpawned(Guid),
    ActorDeleted(Guid),
    ActorParentChanged { actor: Guid, parent: Guid },
    ActorOrderChanged { actor: Guid, order: usize },
    ActorNameChanged { actor: Guid, name: String },
    ActorActiveChanged { actor: Guid, active: bool },
    ScriptsReloading,
    ScriptsReloaded,
}

/// Double-buffered event queue.
///
/// Events sent during one tick stay readable during that tick and the
/// next. Each [`update`](Self::update) drops the older buffer.
pub struct Events<T: Send + Sync + 'static> {
    current: Vec<T>,
    previous: Vec<T>,
}

impl<T: Send + Sync + 'static> Events<T> {
    pub fn new() -> Self {
        Self {
            current: Vec::new(),
            previous: Vec::new(),
        }
    }

    pub fn send(&mut self, event: T) {
        self.current.push(event);
    }

    /// Events from both buffers, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.previous.iter().chain(self.current.iter())
    }

    /// Events sent since the last update.
    pub fn iter_current(&self) -> impl Iterator<Item = &T> {
        self.current.iter()
    }

    /// Clears the previous buffer and moves the current one into it.
    pub fn update(&mut self) {
        self.previous.clear();
        std::mem::swap(&mut self.current, &mut self.previous);
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.previous.is_empty()
    }

    pub fn len(&self) -> usize {
        self.current.len() + self.previous.len()
    }

    pub fn clear(&mut self) {
        self.current.clear();
        self.previous.clear();
    }
}

impl<T: Send + Sync + 'static> Default for Events<T> {
    fn default() -> Self {
        Self::new()
    }
}
