//! `geolens-perception` – where the observer is, and what is near it.
//!
//! # Modules
//!
//! - [`geo`] – the Geo Projector: equirectangular projection of WGS84 points
//!   into the observer's local tangent frame, its inverse, and haversine
//!   distance.
//! - [`transform`] – [`Vec3`][transform::Vec3], [`Quaternion`][transform::Quaternion]
//!   and [`Transform3D`][transform::Transform3D] plus the heading rotation
//!   used for camera-relative rendering.
//! - [`proximity`] – [`ProximityEngine`][proximity::ProximityEngine]:
//!   in-range classification with subscriber fan-out.

pub mod geo;
pub mod proximity;
pub mod transform;

pub use proximity::{ProximityEngine, Subscription};
pub use transform::{Quaternion, Transform3D, Vec3};
