//! [`SceneObjectManager`] – which agents have a 3-D representation, and
//! where.
//!
//! The manager exclusively owns the table from agent id to
//! [`PlacedObject`].  [`SceneObjectManager::sync`] reconciles that table with
//! a fresh agent snapshot:
//!
//! 1. keep agents within `render_distance_m` of the observer;
//! 2. order them by distance (ties by ascending id) and keep the first
//!    `max_objects`;
//! 3. evict placed agents that are no longer selected, releasing their
//!    scene handle;
//! 4. start a load for every newly selected agent;
//! 5. reposition every placed agent from the Geo Projector.
//!
//! # Loads
//!
//! Loads are futures driven on the caller's thread: [`sync`] starts them,
//! [`poll_loads`] applies whatever has finished (call it once per frame) and
//! [`settle`] awaits everything in flight.  The load timeout only applies
//! when a load is polled inside a Tokio runtime; elsewhere loads run
//! unbounded.
//!
//! Each load carries the ticket of the entry that requested it.  A load that
//! finishes after its agent was evicted (or evicted and re-selected, which
//! issues a new ticket), or after [`dispose`], is dropped without ever
//! reaching the backend.  A failed load is replaced by a primitive
//! placeholder; one agent's failure never affects another.
//!
//! [`sync`]: SceneObjectManager::sync
//! [`poll_loads`]: SceneObjectManager::poll_loads
//! [`settle`]: SceneObjectManager::settle
//! [`dispose`]: SceneObjectManager::dispose

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use geolens_perception::geo::{haversine_distance, project};
use geolens_perception::transform::{Transform3D, Vec3};
use geolens_types::{AgentRecord, GeoLensError, GeoPoint, LoadState, RenderStats};
use tracing::{debug, info, warn};

use crate::backend::{Representation, SceneBackend, SceneHandle};
use crate::jitter::{Jitter, NoJitter};
use crate::loader::{ModelAsset, ModelLoader};
use crate::style::VisualStyle;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Budget applied by [`SceneObjectManager::sync`].
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    /// Agents further than this (metres) are never materialised.
    pub render_distance_m: f64,
    /// Maximum number of concurrently placed agents.
    pub max_objects: usize,
    /// Loads slower than this fall back to a placeholder.  `None` waits
    /// forever.
    pub load_timeout: Option<Duration>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            render_distance_m: 100.0,
            max_objects: 10,
            load_timeout: Some(Duration::from_secs(15)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PlacedObject
// ────────────────────────────────────────────────────────────────────────────

/// An agent that currently has (or is getting) a representation.
#[derive(Debug)]
pub struct PlacedObject {
    agent: AgentRecord,
    distance_m: f64,
    local_position: Vec3,
    handle: Option<SceneHandle>,
    load_state: LoadState,
    scale: f64,
    ticket: u64,
}

impl PlacedObject {
    pub fn agent_id(&self) -> &str {
        &self.agent.id
    }

    pub fn agent(&self) -> &AgentRecord {
        &self.agent
    }

    /// Great-circle distance at the last sync.
    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    /// Position in the observer-relative frame (metres, jitter included).
    pub fn local_position(&self) -> Vec3 {
        self.local_position
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    /// Arena index of the owned scene object, once loaded.
    pub fn scene_index(&self) -> Option<u64> {
        self.handle.as_ref().map(SceneHandle::index)
    }

    fn transform(&self) -> Transform3D {
        Transform3D::facing_origin(self.local_position).with_scale(self.scale)
    }
}

/// Result of one finished load, tagged with the ticket that started it.
struct LoadCompletion {
    agent_id: String,
    ticket: u64,
    result: Result<ModelAsset, GeoLensError>,
}

// ────────────────────────────────────────────────────────────────────────────
// SceneObjectManager
// ────────────────────────────────────────────────────────────────────────────

/// Owns the placed-object table and the render backend.
pub struct SceneObjectManager {
    config: SceneConfig,
    backend: Box<dyn SceneBackend>,
    loader: Arc<dyn ModelLoader>,
    jitter: Box<dyn Jitter>,
    placed: HashMap<String, PlacedObject>,
    in_flight: FuturesUnordered<BoxFuture<'static, LoadCompletion>>,
    next_ticket: u64,
    disposed: bool,
}

impl SceneObjectManager {
    /// Create a manager with no jitter.
    pub fn new(
        config: SceneConfig,
        backend: Box<dyn SceneBackend>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        Self {
            config,
            backend,
            loader,
            jitter: Box::new(NoJitter),
            placed: HashMap::new(),
            in_flight: FuturesUnordered::new(),
            next_ticket: 0,
            disposed: false,
        }
    }

    /// Replace the visual jitter function.
    pub fn with_jitter(mut self, jitter: Box<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Reconcile the placed set with `agents` as seen from `observer`.
    pub fn sync(&mut self, agents: &[AgentRecord], observer: &GeoPoint) {
        if self.disposed {
            warn!("sync after dispose ignored");
            return;
        }

        let selected = self.select(agents, observer);
        let wanted: HashSet<&str> = selected.iter().map(|(_, a)| a.id.as_str()).collect();

        // Evict before repositioning anything that stays.
        let evicted: Vec<String> = self
            .placed
            .keys()
            .filter(|id| !wanted.contains(id.as_str()))
            .cloned()
            .collect();
        for id in evicted {
            self.evict(&id);
        }

        for (distance_m, agent) in &selected {
            let local_position = project(observer, &agent.location).add(self.jitter.offset(agent));
            match self.placed.get_mut(&agent.id) {
                Some(entry) => {
                    entry.agent = (*agent).clone();
                    entry.distance_m = *distance_m;
                    entry.local_position = local_position;
                    if let Some(handle) = &entry.handle {
                        self.backend.set_transform(handle, entry.transform());
                    }
                }
                None => {
                    let ticket = self.next_ticket;
                    self.next_ticket += 1;
                    self.placed.insert(
                        agent.id.clone(),
                        PlacedObject {
                            agent: (*agent).clone(),
                            distance_m: *distance_m,
                            local_position,
                            handle: None,
                            load_state: LoadState::Loading,
                            scale: 1.0,
                            ticket,
                        },
                    );
                    self.start_load((*agent).clone(), ticket);
                }
            }
        }

        debug!(
            candidates = agents.len(),
            placed = self.placed.len(),
            in_flight = self.in_flight.len(),
            "scene synced"
        );

        // Kick off the new loads; anything that is already done is applied.
        self.poll_loads();
    }

    /// Apply every load that has finished, without waiting.  Returns how
    /// many completions were processed.
    pub fn poll_loads(&mut self) -> usize {
        let mut processed = 0;
        while let Some(Some(done)) = self.in_flight.next().now_or_never() {
            self.complete(done);
            processed += 1;
        }
        processed
    }

    /// Wait for every in-flight load and apply it.
    pub async fn settle(&mut self) {
        while let Some(done) = self.in_flight.next().await {
            self.complete(done);
        }
    }

    /// Release every owned scene object and forget in-flight loads.
    /// Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        // Dropping the futures discards any load that would finish later.
        self.in_flight = FuturesUnordered::new();
        let released = self.placed.len();
        for (_, entry) in self.placed.drain() {
            if let Some(handle) = entry.handle {
                self.backend.release(handle);
            }
        }
        info!(released, "scene objects disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Ids of every placed agent (loading or not).
    pub fn placed_ids(&self) -> BTreeSet<String> {
        self.placed.keys().cloned().collect()
    }

    pub fn placed(&self, agent_id: &str) -> Option<&PlacedObject> {
        self.placed.get(agent_id)
    }

    pub fn placed_objects(&self) -> impl Iterator<Item = &PlacedObject> {
        self.placed.values()
    }

    /// Placed agents that are visible (model or placeholder).
    pub fn loaded_count(&self) -> usize {
        self.placed
            .values()
            .filter(|p| p.load_state.is_rendered())
            .count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> RenderStats {
        self.backend.stats()
    }

    /// Direct access to the render surface for camera, viewport and
    /// teardown.  Object lifecycle stays with the manager.
    pub fn backend_mut(&mut self) -> &mut dyn SceneBackend {
        self.backend.as_mut()
    }

    // ------------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------------

    /// Closest `max_objects` agents within render distance, nearest first.
    fn select<'a>(
        &self,
        agents: &'a [AgentRecord],
        observer: &GeoPoint,
    ) -> Vec<(f64, &'a AgentRecord)> {
        let mut candidates: Vec<(f64, &AgentRecord)> = agents
            .iter()
            .map(|agent| (haversine_distance(observer, &agent.location), agent))
            .filter(|(distance, _)| *distance <= self.config.render_distance_m)
            .collect();

        candidates.sort_by(|(da, a), (db, b)| {
            da.partial_cmp(db)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut seen: HashSet<String> = HashSet::new();
        candidates.retain(|(_, agent)| seen.insert(agent.id.clone()));
        candidates.truncate(self.config.max_objects);
        candidates
    }

    fn evict(&mut self, agent_id: &str) {
        if let Some(entry) = self.placed.remove(agent_id) {
            debug!(agent_id, state = ?entry.load_state, "evicting scene object");
            if let Some(handle) = entry.handle {
                self.backend.release(handle);
            }
        }
    }

    fn start_load(&mut self, agent: AgentRecord, ticket: u64) {
        let loader = Arc::clone(&self.loader);
        let timeout = self.config.load_timeout;
        let load = async move {
            // tokio's timer panics without a reactor; hosts may drive sync
            // from a plain thread.
            let timeout = match timeout {
                Some(_) if tokio::runtime::Handle::try_current().is_err() => {
                    debug!(agent_id = %agent.id, "no async runtime; loading without timeout");
                    None
                }
                other => other,
            };
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, loader.load(&agent)).await {
                    Ok(result) => result,
                    Err(_) => Err(GeoLensError::LoadFailed {
                        agent_id: agent.id.clone(),
                        details: format!("timed out after {} ms", limit.as_millis()),
                    }),
                },
                None => loader.load(&agent).await,
            };
            LoadCompletion {
                agent_id: agent.id,
                ticket,
                result,
            }
        };
        self.in_flight.push(load.boxed());
    }

    fn complete(&mut self, done: LoadCompletion) {
        let Some(entry) = self.placed.get_mut(&done.agent_id) else {
            debug!(agent_id = %done.agent_id, "discarding load for evicted agent");
            return;
        };
        if entry.ticket != done.ticket || entry.load_state != LoadState::Loading {
            debug!(agent_id = %done.agent_id, "discarding superseded load");
            return;
        }

        let fallback = Representation::Primitive(VisualStyle::for_type_tag(&entry.agent.type_tag));
        let (representation, state) = match done.result {
            Ok(asset) => (Representation::Model(asset), LoadState::Loaded),
            Err(e) => {
                warn!(agent_id = %done.agent_id, error = %e, "model load failed; using placeholder");
                (fallback.clone(), LoadState::FallbackLoaded)
            }
        };

        let scale = representation.base_scale();
        let created = match self.backend.instantiate(&done.agent_id, representation) {
            Ok(handle) => Ok((handle, state, scale)),
            Err(e) if state == LoadState::Loaded => {
                warn!(agent_id = %done.agent_id, error = %e, "model instantiation failed; using placeholder");
                let scale = fallback.base_scale();
                self.backend
                    .instantiate(&done.agent_id, fallback)
                    .map(|handle| (handle, LoadState::FallbackLoaded, scale))
            }
            Err(e) => Err(e),
        };

        match created {
            Ok((handle, state, scale)) => {
                entry.scale = scale;
                entry.load_state = state;
                self.backend.set_transform(&handle, entry.transform());
                entry.handle = Some(handle);
            }
            Err(e) => {
                warn!(agent_id = %done.agent_id, error = %e, "placeholder instantiation failed");
                entry.load_state = LoadState::Failed;
            }
        }
    }
}
