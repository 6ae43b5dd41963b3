//! `geolens-kernel` – session rules.
//!
//! Decides what a session may do; it never touches the scene itself.
//!
//! # Modules
//!
//! - [`capability`] – [`CapabilityProbe`][capability::CapabilityProbe] and
//!   [`CapabilityRequirements`][capability::CapabilityRequirements]: checks
//!   the host's renderer/orientation/camera support before a session goes
//!   active.
//! - [`lifecycle`] – [`Lifecycle`][lifecycle::Lifecycle]: the phase
//!   transition table (`Idle → Initializing → Active → Ended`, `Error`).

pub mod capability;
pub mod lifecycle;

pub use capability::{CapabilityProbe, CapabilityRequirements, NegotiatedCapabilities, StaticProbe};
pub use lifecycle::{Lifecycle, SessionEvent, next_phase};
