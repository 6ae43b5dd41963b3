//! [`SessionController`] – the externally facing entry point.
//!
//! One controller drives one session.  It owns the observer state and the
//! latest agent snapshot, and hands copies of them to the
//! [`ProximityEngine`] and the [`SceneObjectManager`] on every update.
//!
//! ```text
//!   location / agents ─▶ SessionController ─┬─▶ ProximityEngine ─▶ subscribers
//!                                           └─▶ SceneObjectManager ─▶ SceneBackend
//! ```
//!
//! Phase changes go through the kernel [`Lifecycle`] table.  Updates that
//! arrive before the session is `Active` are remembered (and classified by
//! the proximity engine) but only reach the scene once initialisation
//! succeeds.  After `end()` or a capability failure, updates are ignored.
//!
//! Updates are plain synchronous calls and may come from any thread; the
//! load timeout is only enforced when loads are polled inside a Tokio
//! runtime.  Call [`SessionController::frame`] once per rendered frame to
//! apply finished loads.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use geolens_kernel::StaticProbe;
//! use geolens_runtime::{SessionConfig, SessionController};
//! use geolens_scene::sim::{SimBackend, SimLoader};
//! use geolens_types::{AgentRecord, GeoPoint, SessionPhase};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut session = SessionController::new(
//!     SessionConfig::default(),
//!     Box::new(StaticProbe::headless()),
//!     Box::new(SimBackend::new()),
//!     Arc::new(SimLoader::with_default_catalog()),
//! );
//! session.initialize(1280, 720).unwrap();
//! session.update_location(GeoPoint::new(40.7128, -74.0060));
//! session.update_agents(vec![AgentRecord::new("a1", GeoPoint::new(40.71289, -74.0060))]);
//! session.settle().await;
//!
//! assert_eq!(session.state().phase, SessionPhase::Active);
//! assert_eq!(session.state().objects_loaded_count, 1);
//! session.end();
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use geolens_kernel::{
    CapabilityProbe, CapabilityRequirements, Lifecycle, NegotiatedCapabilities, SessionEvent,
};
use geolens_perception::transform::heading_rotation;
use geolens_perception::{ProximityEngine, Subscription};
use geolens_scene::{HashJitter, ModelLoader, SceneBackend, SceneObjectManager};
use geolens_types::{
    AgentRecord, GeoLensError, GeoPoint, ObserverState, Orientation, RenderStats, SessionPhase,
    SessionState,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;

/// Orchestrates capability probing, updates, rendering and teardown.
pub struct SessionController {
    state: SessionState,
    config: SessionConfig,
    lifecycle: Lifecycle,
    probe: Box<dyn CapabilityProbe>,
    requirements: CapabilityRequirements,
    negotiated: Option<NegotiatedCapabilities>,
    location: Option<GeoPoint>,
    orientation: Option<Orientation>,
    agents: Vec<AgentRecord>,
    proximity: ProximityEngine,
    scene: SceneObjectManager,
}

impl SessionController {
    /// Build an `Idle` session from injected collaborators.
    pub fn new(
        config: SessionConfig,
        probe: Box<dyn CapabilityProbe>,
        backend: Box<dyn SceneBackend>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        let config = config.validated();
        let mut scene = SceneObjectManager::new(config.scene_config(), backend, loader);
        if config.jitter_amplitude_m > 0.0 {
            scene = scene.with_jitter(Box::new(HashJitter {
                amplitude_m: config.jitter_amplitude_m,
            }));
        }
        let requirements = CapabilityRequirements::new().orientation(config.orientation_tracking);
        let session_id = Uuid::new_v4();
        debug!(%session_id, ?config, "session created");

        Self {
            state: SessionState::new(session_id),
            proximity: ProximityEngine::with_default_radius(config.default_visibility_radius_m),
            config,
            lifecycle: Lifecycle::new(),
            probe,
            requirements,
            negotiated: None,
            location: None,
            orientation: None,
            agents: Vec::new(),
            scene,
        }
    }

    /// Override the renderer requirements (orientation still follows the
    /// config).
    pub fn with_requirements(mut self, requirements: CapabilityRequirements) -> Self {
        self.requirements = requirements.orientation(self.config.orientation_tracking);
        self
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Probe the host and bring the session up on a `width`×`height`
    /// surface.
    ///
    /// # Errors
    ///
    /// - [`GeoLensError::Capability`] when the host has no acceptable
    ///   renderer; the session is left in `Error`.
    /// - [`GeoLensError::InvalidTransition`] when the session is not `Idle`.
    pub fn initialize(&mut self, width: u32, height: u32) -> Result<SessionPhase, GeoLensError> {
        self.transition(SessionEvent::Initialize)?;

        let capabilities = self.probe.probe();
        let negotiated = match self.requirements.check(&capabilities) {
            Ok(negotiated) => negotiated,
            Err(e) => {
                warn!(session_id = %self.state.session_id, error = %e, "capability probe failed");
                self.transition(SessionEvent::Fail(e.to_string()))?;
                return Err(e);
            }
        };
        info!(
            session_id = %self.state.session_id,
            renderer = ?negotiated.renderer,
            orientation = negotiated.orientation_tracking,
            "capabilities accepted"
        );
        self.negotiated = Some(negotiated);
        self.scene.backend_mut().resize(width, height);
        self.transition(SessionEvent::ProbeSucceeded)?;

        // Catch up on anything received while initialising.
        self.apply_camera();
        self.sync_scene();
        Ok(self.phase())
    }

    /// New location reading from the location service.
    pub fn update_location(&mut self, location: GeoPoint) {
        if self.ignores_updates("location") {
            return;
        }
        self.location = Some(location);
        self.proximity.set_observer(location);
        self.on_observer_or_agents_changed();
    }

    /// Positioning was lost.  Proximity membership empties; placed objects
    /// stay where they were until the next reading.
    pub fn clear_location(&mut self) {
        if self.ignores_updates("location") {
            return;
        }
        self.location = None;
        self.proximity.clear_observer();
        self.touch();
    }

    /// Replace the agent set (no merge).
    pub fn update_agents(&mut self, agents: Vec<AgentRecord>) {
        if self.ignores_updates("agents") {
            return;
        }
        self.proximity.set_agents(agents.clone());
        self.agents = agents;
        self.on_observer_or_agents_changed();
    }

    /// New device orientation reading.
    ///
    /// Recorded on the observer; the camera follows it only when tracking
    /// was negotiated.
    pub fn update_orientation(&mut self, orientation: Orientation) {
        if self.ignores_updates("orientation") {
            return;
        }
        self.orientation = Some(orientation);
        if self.phase() == SessionPhase::Active
            && self.transition(SessionEvent::OrientationReading).is_ok()
        {
            self.apply_camera();
        }
    }

    /// Viewport size changed.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.phase() != SessionPhase::Active {
            debug!(width, height, phase = %self.phase(), "resize ignored outside active session");
            return;
        }
        if self.transition(SessionEvent::Resize).is_ok() {
            self.scene.backend_mut().resize(width, height);
        }
    }

    /// Tear the session down.  Idempotent.
    ///
    /// From `Error` the resources are released but the phase (and its
    /// reason) is kept.
    pub fn end(&mut self) -> SessionPhase {
        if self.phase() == SessionPhase::Ended {
            return SessionPhase::Ended;
        }
        if let Err(e) = self.transition(SessionEvent::End) {
            warn!(error = %e, "end rejected");
        }
        if !self.scene.is_disposed() {
            self.scene.dispose();
            self.scene.backend_mut().dispose();
            info!(session_id = %self.state.session_id, "session resources released");
        }
        self.refresh_stats();
        self.phase()
    }

    // ------------------------------------------------------------------------
    // Frame pumping
    // ------------------------------------------------------------------------

    /// Apply model loads that finished since the last frame.  Returns how
    /// many were applied.
    pub fn frame(&mut self) -> usize {
        if self.phase() != SessionPhase::Active {
            return 0;
        }
        let applied = self.scene.poll_loads();
        if applied > 0 {
            self.refresh_stats();
        }
        applied
    }

    /// Wait until every in-flight load has been applied.
    pub async fn settle(&mut self) {
        self.scene.settle().await;
        self.refresh_stats();
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn phase(&self) -> SessionPhase {
        self.lifecycle.phase()
    }

    /// Snapshot for the UI.
    pub fn state(&self) -> SessionState {
        self.state.clone()
    }

    /// Backend counters as of the last update.
    pub fn render_stats(&self) -> RenderStats {
        self.state.render_stats
    }

    pub fn session_id(&self) -> Uuid {
        self.state.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// What the capability probe granted, once initialised.
    pub fn negotiated(&self) -> Option<&NegotiatedCapabilities> {
        self.negotiated.as_ref()
    }

    /// Latest observer reading, if positioning is available.
    pub fn observer(&self) -> Option<ObserverState> {
        self.location.map(|location| ObserverState {
            location,
            orientation: self.orientation,
        })
    }

    /// Agents within their visibility radius of the observer.
    pub fn in_range(&self) -> Vec<AgentRecord> {
        self.proximity.in_range().to_vec()
    }

    pub fn is_in_range(&self, agent_id: &str) -> bool {
        self.proximity.is_in_range(agent_id)
    }

    /// Metres from the observer, `None` without a location.
    pub fn distance_to(&self, agent: &AgentRecord) -> Option<f64> {
        self.proximity.distance_to(agent)
    }

    /// Agents that currently have a scene representation.
    pub fn placed_ids(&self) -> BTreeSet<String> {
        self.scene.placed_ids()
    }

    pub fn scene(&self) -> &SceneObjectManager {
        &self.scene
    }

    /// Register for in-range notifications.
    pub fn subscribe_in_range<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[AgentRecord]) + Send + Sync + 'static,
    {
        self.proximity.subscribe(callback)
    }

    // ------------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------------

    fn transition(&mut self, event: SessionEvent) -> Result<SessionPhase, GeoLensError> {
        let phase = self.lifecycle.apply(event)?;
        self.state.phase = phase;
        self.state.last_error = self.lifecycle.last_error().map(str::to_string);
        self.touch();
        Ok(phase)
    }

    fn ignores_updates(&self, what: &str) -> bool {
        if self.lifecycle.is_terminal() {
            debug!(update = what, phase = %self.phase(), "update ignored after session stopped");
            true
        } else {
            false
        }
    }

    fn on_observer_or_agents_changed(&mut self) {
        if self.phase() == SessionPhase::Active
            && self.transition(SessionEvent::ObserverOrAgentsChanged).is_ok()
        {
            self.sync_scene();
        } else {
            self.touch();
        }
    }

    fn sync_scene(&mut self) {
        let Some(observer) = self.location else {
            debug!("no observer location yet; scene left unchanged");
            return;
        };
        self.scene.sync(&self.agents, &observer);
        self.refresh_stats();
    }

    fn apply_camera(&mut self) {
        let tracking = self.negotiated.is_some_and(|n| n.orientation_tracking);
        if let (true, Some(orientation)) = (tracking, self.orientation) {
            self.scene
                .backend_mut()
                .set_camera_rotation(heading_rotation(orientation.alpha));
        }
    }

    fn refresh_stats(&mut self) {
        self.state.render_stats = self.scene.stats();
        self.state.objects_loaded_count = self.scene.loaded_count();
        self.touch();
    }

    fn touch(&mut self) {
        self.state.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolens_kernel::StaticProbe;
    use geolens_perception::geo::offset;
    use geolens_perception::transform::Quaternion;
    use geolens_scene::sim::{SimBackend, SimLoader};
    use geolens_types::{CapabilitySet, LoadState, RendererBackend};
    use std::sync::Mutex;
    use std::time::Duration;

    fn origin() -> GeoPoint {
        GeoPoint::new(0.0, 0.0)
    }

    fn agent_at(id: &str, north_m: f64) -> AgentRecord {
        AgentRecord::new(id, offset(&origin(), 0.0, north_m)).with_type_tag("guide")
    }

    fn config(render_distance_m: f64, max_objects: usize) -> SessionConfig {
        SessionConfig {
            render_distance_m,
            max_objects,
            load_timeout_ms: 0,
            ..SessionConfig::default()
        }
    }

    fn session_with(
        cfg: SessionConfig,
        probe: StaticProbe,
        loader: SimLoader,
    ) -> (SessionController, SimBackend) {
        let backend = SimBackend::new();
        let session = SessionController::new(
            cfg,
            Box::new(probe),
            Box::new(backend.clone()),
            Arc::new(loader),
        );
        (session, backend)
    }

    fn active_session(cfg: SessionConfig) -> (SessionController, SimBackend) {
        let (mut session, backend) =
            session_with(cfg, StaticProbe::headless(), SimLoader::with_default_catalog());
        session.initialize(800, 600).unwrap();
        (session, backend)
    }

    fn ids(set: BTreeSet<String>) -> Vec<String> {
        set.into_iter().collect()
    }

    #[test]
    fn default_config_updates_from_a_plain_thread() {
        let (mut session, backend) = session_with(
            SessionConfig::default(),
            StaticProbe::headless(),
            SimLoader::with_default_catalog(),
        );
        session.initialize(800, 600).unwrap();
        session.update_location(origin());
        session.update_agents(vec![AgentRecord::new("a", GeoPoint::new(0.0001, 0.0))]);

        assert_eq!(ids(session.placed_ids()), vec!["a"]);
        assert_eq!(backend.live_count(), 1);
        assert_eq!(session.state().objects_loaded_count, 1);
        assert_eq!(session.end(), SessionPhase::Ended);
    }

    #[tokio::test]
    async fn near_agent_is_in_range_and_placed_far_agent_is_not() {
        let (mut session, backend) = active_session(config(100.0, 5));
        let a = agent_at("A", 10.0).with_visibility_radius(50.0);
        let b = agent_at("B", 200.0).with_visibility_radius(50.0);
        session.update_location(origin());
        session.update_agents(vec![a.clone(), b.clone()]);
        session.settle().await;

        assert!(session.is_in_range("A"));
        assert!(!session.is_in_range("B"));
        assert!((session.distance_to(&a).unwrap() - 10.0).abs() < 0.01);
        assert_eq!(ids(session.placed_ids()), vec!["A"]);
        assert_eq!(backend.live_count(), 1);

        let state = session.state();
        assert_eq!(state.phase, SessionPhase::Active);
        assert_eq!(state.objects_loaded_count, 1);
        assert_eq!(state.render_stats.live_objects, 1);
        assert!(state.updated_at.is_some());
    }

    #[tokio::test]
    async fn equal_distance_selects_lowest_id() {
        for _ in 0..5 {
            let (mut session, _backend) = active_session(config(100.0, 1));
            session.update_location(origin());
            let b = agent_at("b", 30.0);
            let a = AgentRecord { id: "a".into(), ..b.clone() };
            session.update_agents(vec![b, a]);
            assert_eq!(ids(session.placed_ids()), vec!["a"]);
        }
    }

    #[tokio::test]
    async fn end_twice_is_a_noop() {
        let (mut session, backend) = active_session(config(100.0, 5));
        session.update_location(origin());
        session.update_agents(vec![agent_at("A", 10.0), agent_at("B", 20.0)]);
        session.settle().await;
        assert_eq!(backend.live_count(), 2);

        assert_eq!(session.end(), SessionPhase::Ended);
        assert_eq!(session.end(), SessionPhase::Ended);

        assert_eq!(backend.live_count(), 0);
        assert_eq!(backend.total_releases(), 2);
        assert!(backend.is_disposed());
        assert_eq!(session.state().objects_loaded_count, 0);
    }

    #[tokio::test]
    async fn missing_renderer_puts_session_in_error() {
        let (mut session, backend) = session_with(
            config(100.0, 5),
            StaticProbe::unsupported(),
            SimLoader::with_default_catalog(),
        );
        let err = session.initialize(800, 600).unwrap_err();
        assert!(matches!(err, GeoLensError::Capability(_)));

        let state = session.state();
        assert_eq!(state.phase, SessionPhase::Error);
        assert!(
            state
                .last_error
                .as_deref()
                .unwrap()
                .contains("no supported rendering backend")
        );

        // Error is terminal: updates are ignored and end keeps the reason.
        session.update_location(origin());
        session.update_agents(vec![agent_at("A", 10.0)]);
        assert!(session.placed_ids().is_empty());
        assert_eq!(session.end(), SessionPhase::Error);
        assert!(session.state().last_error.is_some());
        assert!(backend.is_disposed());
        assert!(session.initialize(800, 600).is_err());
    }

    #[tokio::test]
    async fn requirements_can_narrow_renderers() {
        let probe = StaticProbe::new(CapabilitySet {
            renderers: vec![RendererBackend::WebGl],
            orientation: true,
            camera: true,
        });
        let (session, _backend) =
            session_with(config(100.0, 5), probe, SimLoader::with_default_catalog());
        let mut session = session
            .with_requirements(CapabilityRequirements::new().renderers([RendererBackend::WebGpu]));
        assert!(session.initialize(1, 1).is_err());
        assert_eq!(session.phase(), SessionPhase::Error);
    }

    #[tokio::test]
    async fn updates_before_initialize_are_applied_on_activation() {
        let (mut session, backend) = session_with(
            config(100.0, 5),
            StaticProbe::headless(),
            SimLoader::with_default_catalog(),
        );
        session.update_location(origin());
        session.update_agents(vec![agent_at("A", 10.0)]);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.placed_ids().is_empty());
        // Proximity does not depend on rendering.
        assert!(session.is_in_range("A"));

        session.initialize(640, 480).unwrap();
        assert_eq!(ids(session.placed_ids()), vec!["A"]);
        assert_eq!(backend.viewport(), Some((640, 480)));
    }

    #[tokio::test]
    async fn walking_away_evicts_and_releases() {
        let (mut session, backend) = active_session(config(100.0, 5));
        session.update_agents(vec![agent_at("A", 50.0)]);
        session.update_location(origin());
        session.settle().await;
        let index = backend.index_for("A").unwrap();

        session.update_location(offset(&origin(), 0.0, -200.0));
        assert!(session.placed_ids().is_empty());
        assert_eq!(backend.release_count(index), 1);
        assert_eq!(session.state().objects_loaded_count, 0);
    }

    #[tokio::test]
    async fn load_failure_does_not_change_phase() {
        let loader = SimLoader::with_default_catalog().failing_for("broken");
        let (mut session, _backend) =
            session_with(config(100.0, 5), StaticProbe::headless(), loader);
        session.initialize(800, 600).unwrap();
        session.update_location(origin());
        session.update_agents(vec![agent_at("broken", 10.0), agent_at("ok", 20.0)]);
        session.settle().await;

        assert_eq!(session.phase(), SessionPhase::Active);
        assert!(session.state().last_error.is_none());
        assert_eq!(
            session.scene().placed("broken").unwrap().load_state(),
            LoadState::FallbackLoaded
        );
        assert_eq!(session.state().objects_loaded_count, 2);
    }

    #[tokio::test]
    async fn frame_applies_finished_loads() {
        let loader = SimLoader::with_default_catalog().with_latency(Duration::from_millis(5));
        let (mut session, _backend) =
            session_with(config(100.0, 5), StaticProbe::headless(), loader);
        session.initialize(800, 600).unwrap();
        session.update_location(origin());
        session.update_agents(vec![agent_at("A", 10.0)]);
        assert_eq!(session.state().objects_loaded_count, 0);

        let mut applied = 0;
        for _ in 0..200 {
            applied += session.frame();
            if applied > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(applied, 1);
        assert_eq!(session.state().objects_loaded_count, 1);
    }

    #[tokio::test]
    async fn orientation_drives_camera_when_tracking() {
        let (mut session, backend) = active_session(config(100.0, 5));
        session.update_location(origin());
        session.update_orientation(Orientation {
            alpha: 90.0,
            beta: 0.0,
            gamma: 0.0,
        });
        assert_eq!(backend.camera_rotation(), Some(heading_rotation(90.0)));
        assert_eq!(session.observer().unwrap().orientation.unwrap().alpha, 90.0);
    }

    #[tokio::test]
    async fn orientation_is_recorded_but_ignored_when_disabled() {
        let cfg = SessionConfig {
            orientation_tracking: false,
            ..config(100.0, 5)
        };
        let (mut session, backend) = active_session(cfg);
        session.update_location(origin());
        session.update_orientation(Orientation {
            alpha: 45.0,
            ..Orientation::default()
        });
        assert!(!session.negotiated().unwrap().orientation_tracking);
        assert_eq!(backend.camera_rotation(), None::<Quaternion>);
        assert!(session.observer().unwrap().orientation.is_some());
    }

    #[tokio::test]
    async fn resize_reaches_backend_only_while_active() {
        let (mut session, backend) = session_with(
            config(100.0, 5),
            StaticProbe::headless(),
            SimLoader::with_default_catalog(),
        );
        session.resize(10, 10);
        assert_eq!(backend.viewport(), None);

        session.initialize(800, 600).unwrap();
        session.resize(1024, 768);
        assert_eq!(backend.viewport(), Some((1024, 768)));
        assert_eq!(session.phase(), SessionPhase::Active);
    }

    #[tokio::test]
    async fn subscribers_follow_proximity_updates() {
        let (mut session, _backend) = active_session(config(100.0, 5));
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = session.subscribe_in_range(move |agents| sink.lock().unwrap().push(agents.len()));

        session.update_agents(vec![agent_at("A", 10.0)]);
        session.update_location(origin());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);

        assert!(sub.unsubscribe());
        session.update_location(offset(&origin(), 0.0, 5.0));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lost_positioning_empties_membership() {
        let (mut session, _backend) = active_session(config(100.0, 5));
        let a = agent_at("A", 10.0);
        session.update_location(origin());
        session.update_agents(vec![a.clone()]);
        session.clear_location();

        assert!(session.in_range().is_empty());
        assert_eq!(session.distance_to(&a), None);
        assert!(session.observer().is_none());
    }

    #[tokio::test]
    async fn updates_after_end_are_ignored() {
        let (mut session, backend) = active_session(config(100.0, 5));
        session.end();
        session.update_location(origin());
        session.update_agents(vec![agent_at("A", 10.0)]);
        assert!(session.placed_ids().is_empty());
        assert_eq!(backend.live_count(), 0);
        assert_eq!(session.phase(), SessionPhase::Ended);
    }

    #[tokio::test]
    async fn end_from_idle_is_allowed() {
        let (mut session, backend) = session_with(
            config(100.0, 5),
            StaticProbe::headless(),
            SimLoader::with_default_catalog(),
        );
        assert_eq!(session.end(), SessionPhase::Ended);
        assert!(backend.is_disposed());
        assert!(session.initialize(1, 1).is_err());
    }
}
