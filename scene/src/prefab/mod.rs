//! Prefabs: loading, instancing, synchronization and authoring.

mod apply;
mod asset;
mod library;
pub(crate) mod sync;
mod spawn;

pub use apply::{apply_prefab, create_prefab};
pub use asset::{DefaultInstance, Prefab};
pub use library::PrefabLibrary;
pub use spawn::spawn_prefab;
