//! Proximity Engine.
//!
//! Tracks the observer position and the agent set, classifies each agent as
//! in range (`distance <= visibility radius`) and fans every recomputation
//! out to registered subscribers.
//!
//! Recomputation is eager and synchronous: each [`ProximityEngine::set_observer`]
//! or [`ProximityEngine::set_agents`] call walks the agent list once and then
//! notifies every subscriber, even when membership did not change.  There is
//! no debouncing; callers throttle upstream (location events, not frames).
//!
//! Without an observer the membership is always empty and
//! [`ProximityEngine::distance_to`] returns `None`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use geolens_perception::{geo, proximity::ProximityEngine};
//! use geolens_types::{AgentRecord, GeoPoint};
//!
//! let observer = GeoPoint::new(0.0, 0.0);
//! let mut engine = ProximityEngine::new();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let sub = engine.subscribe(move |agents| {
//!     sink.lock().unwrap().push(agents.len());
//! });
//!
//! engine.set_agents(vec![AgentRecord::new("near", geo::offset(&observer, 0.0, 10.0))]);
//! engine.set_observer(observer);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
//! sub.unsubscribe();
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use geolens_types::{AgentRecord, DEFAULT_VISIBILITY_RADIUS_M, GeoPoint};
use tracing::debug;

use crate::geo::haversine_distance;

/// Callback invoked with the in-range agents after every recomputation.
pub type RangeCallback = dyn Fn(&[AgentRecord]) + Send + Sync;

// ────────────────────────────────────────────────────────────────────────────
// Subscriber registry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: BTreeMap<u64, Arc<RangeCallback>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // A panicking subscriber must not take the registry down with it.
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle returned by [`ProximityEngine::subscribe`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to stop notifications.
#[must_use = "keep the handle to be able to unsubscribe"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Stable identifier of this subscription.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deregister the callback.
    ///
    /// Returns `false` when the engine is gone or the callback was already
    /// removed.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => lock(&registry).callbacks.remove(&self.id).is_some(),
            None => false,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("next_id", &self.next_id)
            .field("subscribers", &self.callbacks.len())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ProximityEngine
// ────────────────────────────────────────────────────────────────────────────

/// Classifies agents as in or out of range of the observer.
#[derive(Debug)]
pub struct ProximityEngine {
    observer: Option<GeoPoint>,
    agents: Vec<AgentRecord>,
    default_radius_m: f64,
    in_range: Vec<AgentRecord>,
    registry: Arc<Mutex<Registry>>,
}

impl Default for ProximityEngine {
    fn default() -> Self {
        Self::with_default_radius(DEFAULT_VISIBILITY_RADIUS_M)
    }
}

impl ProximityEngine {
    /// Engine using a 50 m radius for agents that carry none.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine using `radius_m` for agents without a `visibility_radius`.
    pub fn with_default_radius(radius_m: f64) -> Self {
        Self {
            observer: None,
            agents: Vec::new(),
            default_radius_m: radius_m,
            in_range: Vec::new(),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Replace the observer location and recompute.
    pub fn set_observer(&mut self, location: GeoPoint) {
        self.observer = Some(location);
        self.recompute();
    }

    /// Forget the observer (positioning lost) and recompute.
    pub fn clear_observer(&mut self) {
        self.observer = None;
        self.recompute();
    }

    /// Replace the tracked agent set (no merge) and recompute.
    pub fn set_agents(&mut self, agents: Vec<AgentRecord>) {
        self.agents = agents;
        self.recompute();
    }

    /// Register `callback`; it receives every subsequent recomputation.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&[AgentRecord]) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.insert(id, Arc::new(callback));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).callbacks.len()
    }

    /// Distance from the observer to `agent` in metres, `None` without an
    /// observer.
    pub fn distance_to(&self, agent: &AgentRecord) -> Option<f64> {
        self.observer
            .as_ref()
            .map(|observer| haversine_distance(observer, &agent.location))
    }

    /// Agents in range as of the last recomputation, in input order.
    pub fn in_range(&self) -> &[AgentRecord] {
        &self.in_range
    }

    pub fn is_in_range(&self, agent_id: &str) -> bool {
        self.in_range.iter().any(|a| a.id == agent_id)
    }

    pub fn observer(&self) -> Option<&GeoPoint> {
        self.observer.as_ref()
    }

    pub fn agents(&self) -> &[AgentRecord] {
        &self.agents
    }

    fn recompute(&mut self) {
        self.in_range = match &self.observer {
            None => Vec::new(),
            Some(observer) => self
                .agents
                .iter()
                .filter(|agent| {
                    let distance = haversine_distance(observer, &agent.location);
                    distance <= agent.visibility_radius_or(self.default_radius_m)
                })
                .cloned()
                .collect(),
        };

        debug!(
            agents = self.agents.len(),
            in_range = self.in_range.len(),
            has_observer = self.observer.is_some(),
            "proximity recomputed"
        );

        // Snapshot so callbacks may unsubscribe (or subscribe) re-entrantly.
        let callbacks: Vec<Arc<RangeCallback>> =
            lock(&self.registry).callbacks.values().cloned().collect();
        for callback in callbacks {
            callback(&self.in_range);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset;

    fn origin() -> GeoPoint {
        GeoPoint::new(0.0, 0.0)
    }

    fn agent_at(id: &str, north_m: f64) -> AgentRecord {
        AgentRecord::new(id, offset(&origin(), 0.0, north_m))
    }

    fn recorder(engine: &ProximityEngine) -> (Subscription, Arc<Mutex<Vec<Vec<String>>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let sub = engine.subscribe(move |agents| {
            let ids = agents.iter().map(|a| a.id.clone()).collect();
            sink.lock().unwrap().push(ids);
        });
        (sub, log)
    }

    #[test]
    fn near_agent_in_range_far_agent_out() {
        let mut engine = ProximityEngine::new();
        engine.set_agents(vec![
            agent_at("A", 10.0).with_visibility_radius(50.0),
            agent_at("B", 200.0).with_visibility_radius(50.0),
        ]);
        engine.set_observer(origin());

        assert!(engine.is_in_range("A"));
        assert!(!engine.is_in_range("B"));
        let d = engine.distance_to(&engine.agents()[0]).unwrap();
        assert!((d - 10.0).abs() < 0.01, "distance {d}");
    }

    #[test]
    fn no_observer_means_empty_membership_and_no_distance() {
        let mut engine = ProximityEngine::new();
        engine.set_agents(vec![agent_at("A", 1.0)]);
        assert!(engine.in_range().is_empty());
        assert!(engine.distance_to(&agent_at("A", 1.0)).is_none());

        engine.set_observer(origin());
        assert_eq!(engine.in_range().len(), 1);

        engine.clear_observer();
        assert!(engine.in_range().is_empty());
    }

    #[test]
    fn default_radius_applies_when_absent() {
        let mut engine = ProximityEngine::new();
        engine.set_observer(origin());
        engine.set_agents(vec![agent_at("inside", 49.0), agent_at("outside", 51.0)]);
        assert!(engine.is_in_range("inside"));
        assert!(!engine.is_in_range("outside"));

        let mut wide = ProximityEngine::with_default_radius(100.0);
        wide.set_observer(origin());
        wide.set_agents(vec![agent_at("outside", 51.0)]);
        assert!(wide.is_in_range("outside"));
    }

    #[test]
    fn set_agents_replaces_rather_than_merges() {
        let mut engine = ProximityEngine::new();
        engine.set_observer(origin());
        engine.set_agents(vec![agent_at("old", 5.0)]);
        engine.set_agents(vec![agent_at("new", 5.0)]);
        assert!(!engine.is_in_range("old"));
        assert!(engine.is_in_range("new"));
        assert_eq!(engine.agents().len(), 1);
    }

    #[test]
    fn moving_observer_drops_stale_membership() {
        let mut engine = ProximityEngine::new();
        engine.set_agents(vec![agent_at("A", 10.0)]);
        engine.set_observer(origin());
        assert!(engine.is_in_range("A"));

        engine.set_observer(offset(&origin(), 0.0, 500.0));
        assert!(engine.in_range().is_empty());
    }

    #[test]
    fn widening_radius_never_removes_membership() {
        let mut engine = ProximityEngine::new();
        engine.set_observer(origin());
        let mut was_in = false;
        for radius in [5.0, 20.0, 29.9, 30.1, 60.0, 1_000.0] {
            engine.set_agents(vec![agent_at("A", 30.0).with_visibility_radius(radius)]);
            let now_in = engine.is_in_range("A");
            assert!(!(was_in && !now_in), "membership flipped off at radius {radius}");
            was_in = now_in;
        }
        assert!(was_in);
    }

    #[test]
    fn every_subscriber_sees_identical_results() {
        let mut engine = ProximityEngine::new();
        let (_s1, log1) = recorder(&engine);
        let (_s2, log2) = recorder(&engine);

        engine.set_agents(vec![agent_at("A", 10.0), agent_at("B", 300.0)]);
        engine.set_observer(origin());

        let l1 = log1.lock().unwrap().clone();
        let l2 = log2.lock().unwrap().clone();
        assert_eq!(l1, l2);
        // Empty set (no observer yet) is still delivered.
        assert_eq!(l1, vec![Vec::<String>::new(), vec!["A".to_string()]]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let mut engine = ProximityEngine::new();
        let (sub, log) = recorder(&engine);
        let (_keep, other) = recorder(&engine);

        engine.set_observer(origin());
        assert!(sub.unsubscribe());
        engine.set_observer(origin());

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(other.lock().unwrap().len(), 2);
        assert_eq!(engine.subscriber_count(), 1);
    }

    #[test]
    fn unsubscribe_after_engine_dropped_is_harmless() {
        let engine = ProximityEngine::new();
        let sub = engine.subscribe(|_| {});
        drop(engine);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn callback_may_unsubscribe_itself_reentrantly() {
        let mut engine = ProximityEngine::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(Mutex::new(0));

        let slot_in = Arc::clone(&slot);
        let calls_in = Arc::clone(&calls);
        let sub = engine.subscribe(move |_| {
            *calls_in.lock().unwrap() += 1;
            if let Some(me) = slot_in.lock().unwrap().take() {
                me.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        engine.set_observer(origin());
        engine.set_observer(origin());
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
