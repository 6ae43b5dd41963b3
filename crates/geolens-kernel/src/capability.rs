//! Capability probing.
//!
//! During `Initializing` the session asks a [`CapabilityProbe`] what the host
//! supports and checks the answer against its [`CapabilityRequirements`].
//! A host without an acceptable renderer fails with
//! [`GeoLensError::Capability`], which is fatal to the session.

use std::collections::HashSet;

use geolens_types::{CapabilitySet, GeoLensError, RendererBackend};
use tracing::debug;

/// Source of the host's capability flags.
pub trait CapabilityProbe: Send + Sync {
    fn probe(&self) -> CapabilitySet;
}

/// Probe that always reports the same set.
///
/// # Example
///
/// ```
/// use geolens_kernel::capability::{CapabilityProbe, StaticProbe};
///
/// let probe = StaticProbe::headless();
/// assert!(!probe.probe().renderers.is_empty());
/// assert!(StaticProbe::unsupported().probe().renderers.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    set: CapabilitySet,
}

impl StaticProbe {
    pub fn new(set: CapabilitySet) -> Self {
        Self { set }
    }

    /// Offscreen renderer with orientation and camera support.
    pub fn headless() -> Self {
        Self::new(CapabilitySet {
            renderers: vec![RendererBackend::Headless],
            orientation: true,
            camera: true,
        })
    }

    /// A host that supports nothing.
    pub fn unsupported() -> Self {
        Self::default()
    }
}

impl CapabilityProbe for StaticProbe {
    fn probe(&self) -> CapabilitySet {
        self.set.clone()
    }
}

/// Outcome of a successful check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedCapabilities {
    pub renderer: RendererBackend,
    /// `true` when orientation events should drive the camera.
    pub orientation_tracking: bool,
    pub camera: bool,
}

/// What a session needs from the host.
#[derive(Debug, Clone)]
pub struct CapabilityRequirements {
    accepted_renderers: HashSet<RendererBackend>,
    want_orientation: bool,
}

impl Default for CapabilityRequirements {
    /// Any renderer, orientation tracking when available.
    fn default() -> Self {
        Self {
            accepted_renderers: [
                RendererBackend::WebGpu,
                RendererBackend::WebGl2,
                RendererBackend::WebGl,
                RendererBackend::Headless,
            ]
            .into_iter()
            .collect(),
            want_orientation: true,
        }
    }
}

impl CapabilityRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only the listed renderers.
    pub fn renderers(mut self, accepted: impl IntoIterator<Item = RendererBackend>) -> Self {
        self.accepted_renderers = accepted.into_iter().collect();
        self
    }

    /// Whether orientation should be tracked when the host supports it.
    pub fn orientation(mut self, wanted: bool) -> Self {
        self.want_orientation = wanted;
        self
    }

    /// Pick the host's most preferred acceptable renderer.
    ///
    /// # Errors
    ///
    /// [`GeoLensError::Capability`] when no reported renderer is acceptable.
    pub fn check(&self, set: &CapabilitySet) -> Result<NegotiatedCapabilities, GeoLensError> {
        let renderer = set
            .renderers
            .iter()
            .copied()
            .find(|r| self.accepted_renderers.contains(r))
            .ok_or_else(|| {
                if set.renderers.is_empty() {
                    GeoLensError::Capability("no supported rendering backend".to_string())
                } else {
                    GeoLensError::Capability(format!(
                        "no acceptable rendering backend among {:?}",
                        set.renderers
                    ))
                }
            })?;

        let negotiated = NegotiatedCapabilities {
            renderer,
            orientation_tracking: self.want_orientation && set.orientation,
            camera: set.camera,
        };
        debug!(?negotiated, "capabilities negotiated");
        Ok(negotiated)
    }
}
