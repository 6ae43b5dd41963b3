//! `geolens-types` – shared vocabulary of the geolens workspace.
//!
//! Value types flow from the location/directory collaborators into the core
//! by snapshot; nothing in here owns a scene resource.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Visibility radius applied to agents that do not carry their own (metres).
pub const DEFAULT_VISIBILITY_RADIUS_M: f64 = 50.0;

// ────────────────────────────────────────────────────────────────────────────
// Geography
// ────────────────────────────────────────────────────────────────────────────

/// A WGS84 position.  Altitude is metres and defaults to 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

impl GeoPoint {
    /// Create a point at ground level.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
        }
    }

    /// Same point with an explicit altitude.
    pub fn with_altitude(self, altitude: f64) -> Self {
        Self { altitude, ..self }
    }
}

/// Device orientation reading in degrees.
///
/// Follows the DeviceOrientation convention: `alpha` is the rotation about
/// the up axis, counter-clockwise from north (0..360); `beta` is front/back
/// tilt and `gamma` left/right tilt.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Orientation {
    /// Compass heading (clockwise from north, 0..360) the device is facing.
    pub fn compass_heading_deg(&self) -> f64 {
        (360.0 - self.alpha).rem_euclid(360.0)
    }
}

/// The user's latest position and optional orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverState {
    pub location: GeoPoint,
    pub orientation: Option<Orientation>,
}

impl ObserverState {
    pub fn at(location: GeoPoint) -> Self {
        Self {
            location,
            orientation: None,
        }
    }
}

/// A geo-anchored virtual object supplied by the object directory.
///
/// The JSON shape is camelCase with coordinates at the top level; any
/// extra fields are kept verbatim in `payload` for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: String,
    #[serde(flatten)]
    pub location: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_radius: Option<f64>,
    #[serde(default)]
    pub type_tag: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl AgentRecord {
    /// Minimal record, mostly useful for tests and demos.
    pub fn new(id: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            location,
            visibility_radius: None,
            type_tag: String::new(),
            payload: Map::new(),
        }
    }

    pub fn with_visibility_radius(mut self, radius_m: f64) -> Self {
        self.visibility_radius = Some(radius_m);
        self
    }

    pub fn with_type_tag(mut self, tag: impl Into<String>) -> Self {
        self.type_tag = tag.into();
        self
    }

    /// The agent's own radius, or [`DEFAULT_VISIBILITY_RADIUS_M`].
    pub fn visibility_radius_or_default(&self) -> f64 {
        self.visibility_radius_or(DEFAULT_VISIBILITY_RADIUS_M)
    }

    /// The agent's own radius, or `fallback` when absent or not a usable
    /// number.
    pub fn visibility_radius_or(&self, fallback: f64) -> f64 {
        match self.visibility_radius {
            Some(r) if r.is_finite() && r >= 0.0 => r,
            _ => fallback,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scene / session state
// ────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a placed object's 3-D representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadState {
    Loading,
    Loaded,
    /// The model failed to load and a primitive placeholder stands in.
    FallbackLoaded,
    /// Neither the model nor the placeholder could be instantiated.
    Failed,
}

impl LoadState {
    /// `true` once something is visible in the scene for this object.
    pub fn is_rendered(self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::FallbackLoaded)
    }
}

/// Phase of a session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Initializing,
    Active,
    Error,
    Ended,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Initializing => "initializing",
            SessionPhase::Active => "active",
            SessionPhase::Error => "error",
            SessionPhase::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Approximate counters reported by the rendering backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderStats {
    pub triangles: u64,
    pub draw_calls: u64,
    pub live_objects: usize,
}

/// Externally visible snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub last_error: Option<String>,
    pub objects_loaded_count: usize,
    pub render_stats: RenderStats,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            phase: SessionPhase::Idle,
            last_error: None,
            objects_loaded_count: 0,
            render_stats: RenderStats::default(),
            updated_at: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Capabilities
// ────────────────────────────────────────────────────────────────────────────

/// Rendering backends a host may offer, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RendererBackend {
    WebGpu,
    WebGl2,
    WebGl,
    /// Offscreen renderer used by tests and the CLI demo.
    Headless,
}

/// What the host reported during the capability probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Supported renderers, in the host's order of preference.
    pub renderers: Vec<RendererBackend>,
    pub orientation: bool,
    pub camera: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeoLensError {
    #[error("Capability Error: {0}")]
    Capability(String),

    #[error("Load Failed for {agent_id}: {details}")]
    LoadFailed { agent_id: String, details: String },

    #[error("Render Backend Error: {0}")]
    Backend(String),

    #[error("Invalid Transition: '{event}' is not allowed while {from}")]
    InvalidTransition { from: SessionPhase, event: String },

    #[error("Config Error: {0}")]
    Config(String),
}
