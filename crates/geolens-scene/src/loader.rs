//! Asynchronous model loading.
//!
//! A [`ModelLoader`] fetches and parses the 3-D model for an agent.  Loads are
//! the only suspension points in the core; everything else is synchronous.

use async_trait::async_trait;
use geolens_types::{AgentRecord, GeoLensError};

/// A fetched and parsed 3-D model, ready to be instantiated.
///
/// Dropping an asset frees it, so a load whose result is no longer wanted is
/// released simply by not handing it to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    /// Where the model came from (URL or catalog key).
    pub uri: String,
    /// Approximate triangle count.
    pub triangles: u64,
    /// Number of meshes (one draw call each).
    pub meshes: u32,
    /// Uniform scale that brings the model to real-world size.
    pub scale: f64,
}

/// Source of agent models (network fetch, asset bundle, …).
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the representation for `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoLensError::LoadFailed`] when the model cannot be fetched
    /// or parsed.  The caller substitutes a primitive placeholder.
    async fn load(&self, agent: &AgentRecord) -> Result<ModelAsset, GeoLensError>;
}
