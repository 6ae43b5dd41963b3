//! `geolens-scene` – materialising agents in the 3-D scene.
//!
//! # Modules
//!
//! - [`backend`] – [`SceneBackend`][backend::SceneBackend]: the render
//!   surface, addressed through owned [`SceneHandle`][backend::SceneHandle]s.
//! - [`loader`] – [`ModelLoader`][loader::ModelLoader]: asynchronous model
//!   fetch, the only suspension point of the core.
//! - [`manager`] – [`SceneObjectManager`][manager::SceneObjectManager]:
//!   distance/budget selection, load/evict lifecycle, placement.
//! - [`style`] – type-tag → placeholder primitive.
//! - [`jitter`] – pluggable cosmetic position jitter.
//! - [`sim`] – headless backend and catalog loader for tests and demos.

pub mod backend;
pub mod jitter;
pub mod loader;
pub mod manager;
pub mod sim;
pub mod style;

pub use backend::{Representation, SceneBackend, SceneHandle};
pub use jitter::{HashJitter, Jitter, NoJitter};
pub use loader::{ModelAsset, ModelLoader};
pub use manager::{PlacedObject, SceneConfig, SceneObjectManager};
pub use style::{PrimitiveShape, VisualStyle};
