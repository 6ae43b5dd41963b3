//! Headless scene backend and catalog loader.
//!
//! [`SimBackend`] records every object it hosts instead of drawing it, and
//! [`SimLoader`] serves models from an in-memory catalog keyed by type tag.
//! Together they let the whole session stack run in tests, CI and the CLI
//! demo without a GPU or network.
//!
//! # Example
//!
//! ```rust
//! use geolens_scene::sim::{SimBackend, SimLoader};
//!
//! let backend = SimBackend::new();
//! let probe = backend.clone(); // shares state with the boxed original
//! let loader = SimLoader::with_default_catalog().failing_for("broken-agent");
//!
//! assert_eq!(probe.live_count(), 0);
//! # let _ = loader;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use geolens_perception::transform::{Quaternion, Transform3D};
use geolens_types::{AgentRecord, GeoLensError, RenderStats};
use tracing::warn;

use crate::backend::{Representation, SceneBackend, SceneHandle};
use crate::loader::{ModelAsset, ModelLoader};

// ────────────────────────────────────────────────────────────────────────────
// SimBackend
// ────────────────────────────────────────────────────────────────────────────

/// One object hosted by the [`SimBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimNode {
    pub agent_id: String,
    pub representation: Representation,
    pub transform: Transform3D,
}

#[derive(Debug, Default)]
struct SimScene {
    next_index: u64,
    nodes: HashMap<u64, SimNode>,
    released: Vec<u64>,
    instantiate_failures: HashSet<String>,
    camera_rotation: Option<Quaternion>,
    viewport: Option<(u32, u32)>,
    disposed: bool,
}

/// In-process backend that keeps objects in a map.  Clones share state, so
/// a test can keep one clone for inspection and hand the other to a manager.
#[derive(Debug, Clone, Default)]
pub struct SimBackend {
    scene: Arc<Mutex<SimScene>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `instantiate` for `agent_id` fail.
    pub fn refuse_instantiation_for(self, agent_id: impl Into<String>) -> Self {
        self.lock().instantiate_failures.insert(agent_id.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimScene> {
        self.scene.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// The live object hosting `agent_id`, if any.
    pub fn node_for(&self, agent_id: &str) -> Option<SimNode> {
        self.lock()
            .nodes
            .values()
            .find(|n| n.agent_id == agent_id)
            .cloned()
    }

    /// How many times the object with arena `index` was released.
    pub fn release_count(&self, index: u64) -> usize {
        self.lock().released.iter().filter(|i| **i == index).count()
    }

    /// Total number of releases so far.
    pub fn total_releases(&self) -> usize {
        self.lock().released.len()
    }

    /// Arena index of the live object for `agent_id`.
    pub fn index_for(&self, agent_id: &str) -> Option<u64> {
        self.lock()
            .nodes
            .iter()
            .find(|(_, n)| n.agent_id == agent_id)
            .map(|(i, _)| *i)
    }

    pub fn camera_rotation(&self) -> Option<Quaternion> {
        self.lock().camera_rotation
    }

    pub fn viewport(&self) -> Option<(u32, u32)> {
        self.lock().viewport
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }
}

impl SceneBackend for SimBackend {
    fn instantiate(
        &mut self,
        agent_id: &str,
        representation: Representation,
    ) -> Result<SceneHandle, GeoLensError> {
        let mut scene = self.lock();
        if scene.disposed {
            return Err(GeoLensError::Backend("renderer disposed".to_string()));
        }
        if scene.instantiate_failures.contains(agent_id) {
            return Err(GeoLensError::Backend(format!(
                "cannot instantiate object for '{agent_id}'"
            )));
        }
        let index = scene.next_index;
        scene.next_index += 1;
        scene.nodes.insert(
            index,
            SimNode {
                agent_id: agent_id.to_string(),
                representation,
                transform: Transform3D::identity(),
            },
        );
        Ok(SceneHandle::new(index))
    }

    fn set_transform(&mut self, handle: &SceneHandle, transform: Transform3D) {
        if let Some(node) = self.lock().nodes.get_mut(&handle.index()) {
            node.transform = transform;
        }
    }

    fn release(&mut self, handle: SceneHandle) {
        let mut scene = self.lock();
        if scene.nodes.remove(&handle.index()).is_none() {
            warn!(index = handle.index(), "released unknown scene object");
        }
        scene.released.push(handle.index());
    }

    fn set_camera_rotation(&mut self, rotation: Quaternion) {
        self.lock().camera_rotation = Some(rotation);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.lock().viewport = Some((width, height));
    }

    fn stats(&self) -> RenderStats {
        let scene = self.lock();
        let mut stats = RenderStats {
            live_objects: scene.nodes.len(),
            ..RenderStats::default()
        };
        for node in scene.nodes.values() {
            match &node.representation {
                Representation::Model(asset) => {
                    stats.triangles += asset.triangles;
                    stats.draw_calls += u64::from(asset.meshes);
                }
                Representation::Primitive(style) => {
                    stats.triangles += style.shape.triangles();
                    stats.draw_calls += 1;
                }
            }
        }
        stats
    }

    fn dispose(&mut self) {
        let mut scene = self.lock();
        if !scene.nodes.is_empty() {
            warn!(leaked = scene.nodes.len(), "renderer disposed with live objects");
            scene.nodes.clear();
        }
        scene.disposed = true;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimLoader
// ────────────────────────────────────────────────────────────────────────────

/// [`ModelLoader`] that answers from a catalog keyed by agent type tag.
///
/// Agents whose tag is not in the catalog, or whose id was marked with
/// [`SimLoader::failing_for`], fail to load.
#[derive(Debug, Clone, Default)]
pub struct SimLoader {
    catalog: HashMap<String, ModelAsset>,
    failing: HashSet<String>,
    latency: Option<Duration>,
}

impl SimLoader {
    /// Empty catalog: every load fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with a model for the common type tags.
    pub fn with_default_catalog() -> Self {
        Self::new()
            .with_model("finance", "models/teller.glb", 4_200, 3)
            .with_model("guide", "models/guide.glb", 2_800, 2)
            .with_model("game", "models/chest.glb", 1_500, 1)
    }

    pub fn with_model(mut self, type_tag: &str, uri: &str, triangles: u64, meshes: u32) -> Self {
        self.catalog.insert(
            type_tag.to_string(),
            ModelAsset {
                uri: uri.to_string(),
                triangles,
                meshes,
                scale: 1.0,
            },
        );
        self
    }

    /// Make loads for `agent_id` fail.
    pub fn failing_for(mut self, agent_id: impl Into<String>) -> Self {
        self.failing.insert(agent_id.into());
        self
    }

    /// Delay every load by `latency` (simulated network fetch).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl ModelLoader for SimLoader {
    async fn load(&self, agent: &AgentRecord) -> Result<ModelAsset, GeoLensError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.contains(&agent.id) {
            return Err(GeoLensError::LoadFailed {
                agent_id: agent.id.clone(),
                details: "simulated fetch failure".to_string(),
            });
        }
        self.catalog
            .get(&agent.type_tag)
            .cloned()
            .ok_or_else(|| GeoLensError::LoadFailed {
                agent_id: agent.id.clone(),
                details: format!("no model for type tag '{}'", agent.type_tag),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::VisualStyle;
    use geolens_types::GeoPoint;

    #[test]
    fn instantiate_and_release_tracks_objects() {
        let probe = SimBackend::new();
        let mut backend = probe.clone();

        let handle = backend
            .instantiate("a", Representation::Primitive(VisualStyle::for_type_tag("guide")))
            .unwrap();
        assert_eq!(probe.live_count(), 1);
        assert_eq!(probe.stats().triangles, 960);
        assert_eq!(probe.stats().draw_calls, 1);

        let index = handle.index();
        backend.release(handle);
        assert_eq!(probe.live_count(), 0);
        assert_eq!(probe.release_count(index), 1);
    }

    #[test]
    fn refused_instantiation_is_an_error() {
        let mut backend = SimBackend::new().refuse_instantiation_for("bad");
        let result =
            backend.instantiate("bad", Representation::Primitive(VisualStyle::for_type_tag("")));
        assert!(matches!(result, Err(GeoLensError::Backend(_))));
    }

    #[test]
    fn disposed_backend_refuses_new_objects() {
        let mut backend = SimBackend::new();
        backend.dispose();
        assert!(backend.is_disposed());
        assert!(
            backend
                .instantiate("a", Representation::Primitive(VisualStyle::for_type_tag("")))
                .is_err()
        );
    }

    #[tokio::test]
    async fn loader_serves_catalog_and_fails_unknown_tags() {
        let loader = SimLoader::with_default_catalog().failing_for("flaky");
        let here = GeoPoint::new(0.0, 0.0);

        let ok = loader
            .load(&AgentRecord::new("a", here).with_type_tag("finance"))
            .await
            .unwrap();
        assert_eq!(ok.uri, "models/teller.glb");

        let unknown = loader
            .load(&AgentRecord::new("b", here).with_type_tag("mystery"))
            .await;
        assert!(matches!(unknown, Err(GeoLensError::LoadFailed { .. })));

        let flaky = loader
            .load(&AgentRecord::new("flaky", here).with_type_tag("finance"))
            .await;
        assert!(matches!(flaky, Err(GeoLensError::LoadFailed { .. })));
    }
}
