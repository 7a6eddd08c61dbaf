//! Math type aliases and the actor [`Transform`].
//!
//! All scene math is f32. Serialized transforms use plain arrays so the
//! stored form stays independent of nalgebra's layout.

use serde::{Deserialize, Serialize};

pub use nalgebra;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// Quaternion (f32). Stored as `[x, y, z, w]` in memory.
pub type Quat = nalgebra::Quaternion<f32>;

/// Create a quaternion from a `[x, y, z, w]` array.
pub fn quat_from_array(a: [f32; 4]) -> Quat {
    nalgebra::Quaternion::new(a[3], a[0], a[1], a[2])
}

/// Convert a quaternion to a `[x, y, z, w]` array.
pub fn quat_to_array(q: Quat) -> [f32; 4] {
    [q.coords.x, q.coords.y, q.coords.z, q.coords.w]
}

/// Create a quaternion from rotation around the Y axis.
pub fn quat_from_rotation_y(angle: f32) -> Quat {
    nalgebra::UnitQuaternion::from_axis_angle(&nalgebra::Vector3::y_axis(), angle).into_inner()
}

/// Rotate a vector by a quaternion.
pub fn quat_rotate_vec3(q: Quat, v: Vec3) -> Vec3 {
    nalgebra::UnitQuaternion::new_unchecked(q) * v
}

/// Translation, orientation and scale of an actor relative to its parent.
///
/// The serialized field names match the scene file format
/// (`"Translation"`, `"Orientation"`, `"Scale"`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transform {
    /// Translation `[x, y, z]`.
    pub translation: [f32; 3],
    /// Orientation quaternion `[x, y, z, w]`.
    pub orientation: [f32; 4],
    /// Scale `[x, y, z]`.
    pub scale: [f32; 3],
}

impl Transform {
    /// Identity transform: no translation, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        translation: [0.0, 0.0, 0.0],
        orientation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0, 1.0, 1.0],
    };

    /// Returns this transform with a different translation.
    #[must_use]
    pub const fn with_translation(mut self, translation: [f32; 3]) -> Self {
        self.translation = translation;
        self
    }

    /// Returns this transform with a different orientation.
    #[must_use]
    pub const fn with_orientation(mut self, orientation: [f32; 4]) -> Self {
        self.orientation = orientation;
        self
    }

    /// Returns this transform with a different scale.
    #[must_use]
    pub const fn with_scale(mut self, scale: [f32; 3]) -> Self {
        self.scale = scale;
        self
    }

    /// Composes `self` (a local transform) under `parent`, yielding the
    /// transform in the parent's space.
    ///
    /// Scale is applied component-wise; non-uniform scale combined with
    /// rotation is approximated the same way the renderer does.
    pub fn compose(&self, parent: &Transform) -> Transform {
        let parent_rotation = quat_from_array(parent.orientation);
        let parent_scale = Vec3::from(parent.scale);
        let local = Vec3::from(self.translation).component_mul(&parent_scale);
        let translation = Vec3::from(parent.translation) + quat_rotate_vec3(parent_rotation, local);
        let orientation = parent_rotation * quat_from_array(self.orientation);
        let scale = parent_scale.component_mul(&Vec3::from(self.scale));
        Transform {
            translation: translation.into(),
            orientation: quat_to_array(orientation),
            scale: scale.into(),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
