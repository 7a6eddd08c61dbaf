//! # RedLilium Scene
//!
//! Scene and prefab persistence: turns flat JSON object lists into a live,
//! linked object tree and back.
//!
//! ## Object model
//!
//! - [`SceneObject`] / [`ObjectRef`]: actors and scripts sharing one id space
//! - [`ObjectBehaviour`]: per-type fields and lifecycle hooks
//! - [`type_registry`]: `TypeName` to constructor lookup
//! - [`registry`]: process-wide id to object index
//! - [`hierarchy`]: parenting, sibling order, tree passes
//!
//! ## Persistence
//!
//! - [`SceneLoader`]: resumable, time-budgeted scene load
//! - [`save`]: documents from live objects
//! - [`clone`]: subtree copies through the binary clone stream
//! - [`prefab`]: prefab loading, instancing, synchronization and authoring
//! - [`serialize`]: streams, id remapping and per-load context
//!
//! ## Level
//!
//! - [`Level`]: loaded scenes, queued [`actions`] and [`events`]
//! - [`SceneSettings`]: TOML configuration

pub mod actions;
pub mod assets;
mod batch;
pub mod behaviour;
pub mod clone;
pub mod error;
pub mod events;
mod factory;
pub mod hierarchy;
pub mod level;
pub mod loader;
pub mod object;
pub mod parallel;
pub mod prefab;
pub mod registry;
pub mod save;
pub mod serialize;
pub mod settings;
pub mod type_registry;

pub use actions::{ActionOutcome, ActionStatus, SceneAction};
pub use assets::{AssetError, AssetSource, DirectorySource, MemorySource};
pub use behaviour::ObjectBehaviour;
pub use clone::clone_objects;
pub use error::SceneError;
pub use events::{Events, LevelEvent};
pub use level::Level;
pub use loader::{LoadStage, LoadStatus, SceneLoader};
pub use object::{ObjectRef, PrefabLink, SceneObject};
pub use prefab::{Prefab, PrefabLibrary, apply_prefab, create_prefab, spawn_prefab};
pub use save::save_scene;
pub use settings::SceneSettings;
pub use type_registry::{TypeInfo, types};
