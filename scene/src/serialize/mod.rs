//! Stream types and id remapping for scene serialization.
//!
//! Objects write their fields into a [`WriteStream`] and read them back
//! through a [`ReadStream`]. Every read of an object reference goes through
//! the active [`Modifier`], which translates stored ids (prefab-object ids,
//! ids from a cloned subtree) into live scene ids.

mod bytes;
mod context;
mod dependencies;
mod error;
mod modifier;
mod stream;

pub use context::{InstanceTables, PrefabInstanceRecord, SceneContext};
pub use dependencies::collect_dependencies;
pub use error::{DeserializeError, SerializeError};
pub use modifier::{Modifier, acquire_modifier};
pub use stream::{ReadStream, WriteStream};

pub(crate) use bytes::{CloneStream, decode_clone_stream, encode_clone_stream};
pub(crate) use dependencies::rewrite_ids;
pub(crate) use stream::{guid_field, guid_list_field};

use crate::SceneError;

/// Build number written into every saved document.
pub const ENGINE_BUILD: u32 = 6520;

/// Oldest build whose documents can still be loaded.
pub const MIN_SUPPORTED_ENGINE_BUILD: u32 = 6000;

/// First build that stores actor tags as the `"Tags"` array. Older
/// documents carry a single `"Tag"` string.
pub const TAGS_ARRAY_BUILD: u32 = 6330;

/// Rejects builds outside `min..=ENGINE_BUILD`.
pub fn check_engine_build(build: u32, min: u32) -> Result<(), SceneError> {
    if build < min || build > ENGINE_BUILD {
        return Err(SceneError::UnsupportedVersion {
            build,
            min,
            max: ENGINE_BUILD,
        });
    }
    Ok(())
}
