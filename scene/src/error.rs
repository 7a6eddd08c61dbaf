//! Error taxonomy for scene loading, saving and prefab handling.
//!
//! Every variant is either recovered locally (a warning is logged and the
//! offending object is dropped) or fails the whole action. See
//! [`SceneError::is_recoverable`].

use redlilium_core::Guid;
use thiserror::Error;

use crate::assets::AssetError;
use crate::serialize::{DeserializeError, SerializeError};

/// Errors produced by the scene persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// The stream could not be parsed or is structurally wrong.
    #[error("invalid stream: {0}")]
    InvalidStream(String),

    /// `EngineBuild` lies outside the supported range.
    #[error("unsupported engine build {build} (supported {min}..={max})")]
    UnsupportedVersion { build: u32, min: u32, max: u32 },

    /// A stored identifier is zero or malformed.
    #[error("invalid object id {0:?}")]
    InvalidId(String),

    /// The type name is not registered.
    #[error("unknown type '{type_name}'")]
    UnknownType { type_name: String },

    /// The type is registered but is neither an actor nor a script.
    #[error("type '{type_name}' is not a scene object")]
    NotASceneObject { type_name: String },

    /// The prefab asset does not exist.
    #[error("missing prefab {0}")]
    MissingPrefab(Guid),

    /// The prefab asset exists but could not be loaded.
    #[error("failed to load prefab {id}: {reason}")]
    PrefabLoadFailed { id: Guid, reason: String },

    /// The prefab has no object with the requested prefab-object id.
    #[error("prefab {prefab} has no object {object}")]
    MissingPrefabObject { prefab: Guid, object: Guid },

    /// A prefab's nested-prefab chain re-enters itself.
    #[error("circular prefab reference through {0}")]
    CircularPrefabReference(Guid),

    /// An object still has no parent after linking.
    #[error("object {0} has no parent")]
    MissingParent(Guid),

    /// Self-parenting, a parent cycle, or a parent of the wrong kind.
    #[error("invalid hierarchy for {object}: {reason}")]
    InvalidHierarchy { object: Guid, reason: String },

    /// A null or otherwise unusable argument was passed to an operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The asset source failed.
    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl SceneError {
    /// Returns `true` when the error only drops the offending object and the
    /// surrounding load continues.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidId(_)
                | Self::UnknownType { .. }
                | Self::NotASceneObject { .. }
                | Self::MissingPrefab(_)
                | Self::PrefabLoadFailed { .. }
                | Self::MissingPrefabObject { .. }
                | Self::CircularPrefabReference(_)
                | Self::MissingParent(_)
                | Self::InvalidHierarchy { .. }
        )
    }

    /// Returns `true` for errors that allow a "missing object" placeholder.
    pub(crate) fn allows_placeholder(&self) -> bool {
        matches!(self, Self::UnknownType { .. } | Self::NotASceneObject { .. })
    }
}

impl From<SerializeError> for SceneError {
    fn from(err: SerializeError) -> Self {
        Self::InvalidStream(err.to_string())
    }
}

impl From<DeserializeError> for SceneError {
    fn from(err: DeserializeError) -> Self {
        Self::InvalidStream(err.to_string())
    }
}
