//! Generic `SceneBackend` trait for the render surface.
//!
//! The backend is an arena: every object it creates is addressed by a
//! [`SceneHandle`] index.  Handles are neither `Clone` nor `Copy`, so the
//! holder owns the object exclusively and [`SceneBackend::release`] consumes
//! the handle, which makes a double release unrepresentable.

use geolens_perception::transform::{Quaternion, Transform3D};
use geolens_types::{GeoLensError, RenderStats};

use crate::loader::ModelAsset;
use crate::style::VisualStyle;

/// Exclusive ownership token for one live object in a [`SceneBackend`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SceneHandle(u64);

impl SceneHandle {
    /// Mint a handle.  Only backends should call this, once per object.
    pub fn new(index: u64) -> Self {
        Self(index)
    }

    /// Arena index of the object.
    pub fn index(&self) -> u64 {
        self.0
    }
}

/// What to put in the scene for an agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    /// A loaded 3-D model.
    Model(ModelAsset),
    /// A primitive placeholder used when the model could not be loaded.
    Primitive(VisualStyle),
}

impl Representation {
    /// Uniform scale the object should be placed with.
    pub fn base_scale(&self) -> f64 {
        match self {
            Representation::Model(asset) => asset.scale,
            Representation::Primitive(style) => style.base_scale,
        }
    }
}

/// A render surface able to host agent representations.
///
/// Implementations register nothing globally; the
/// [`SceneObjectManager`][crate::manager::SceneObjectManager] owns one and is
/// the only caller of the object lifecycle methods.
pub trait SceneBackend: Send {
    /// Create an object for `agent_id` and return its handle.
    ///
    /// # Errors
    ///
    /// Returns [`GeoLensError::Backend`] when the representation cannot be
    /// created (e.g. out of GPU memory, unsupported mesh).
    fn instantiate(
        &mut self,
        agent_id: &str,
        representation: Representation,
    ) -> Result<SceneHandle, GeoLensError>;

    /// Move an existing object.
    fn set_transform(&mut self, handle: &SceneHandle, transform: Transform3D);

    /// Destroy an object and free everything it owns.
    fn release(&mut self, handle: SceneHandle);

    /// Orient the camera (camera-relative rendering follows the device
    /// heading).
    fn set_camera_rotation(&mut self, rotation: Quaternion);

    /// Resize the viewport; the aspect ratio follows.
    fn resize(&mut self, width: u32, height: u32);

    /// Approximate triangle / draw-call counters.
    fn stats(&self) -> RenderStats;

    /// Tear down renderer-level resources.  Called once at session end after
    /// every object handle has been released.
    fn dispose(&mut self);
}
