//! Geo Projector.
//!
//! Converts WGS84 positions into an observer-centred local tangent frame and
//! back, and measures great-circle distance.
//!
//! The local frame is left-handed with **+x east**, **+y up** and
//! **+z north**, in metres.  Longitude differences are taken the short way
//! round, so points either side of the antimeridian stay neighbours.  Projection uses the equirectangular
//! approximation:
//!
//! ```text
//! x = R · Δλ · cos φ₀
//! z = R · Δφ
//! y = alt − alt₀
//! ```
//!
//! This is only accurate at short range (a few km at most; agents live within
//! ~100 m of the user).  There is no geodesic correction and no altitude datum
//! reconciliation.  Distances used for range decisions go through
//! [`haversine_distance`] instead, which is exact on the sphere at any range.
//!
//! # Example
//!
//! ```rust
//! use geolens_perception::geo::{haversine_distance, project, unproject};
//! use geolens_types::GeoPoint;
//!
//! let observer = GeoPoint::new(48.8584, 2.2945);
//! let target = GeoPoint::new(48.8585, 2.2946);
//!
//! let local = project(&observer, &target);
//! assert!(local.x > 0.0 && local.z > 0.0); // north-east of the observer
//!
//! let back = unproject(&observer, local);
//! assert!(haversine_distance(&back, &target) < 1e-3);
//! ```

use geolens_types::GeoPoint;

use crate::transform::Vec3;

/// Mean earth radius (metres).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Position of `target` in the local frame centred on `observer`.
pub fn project(observer: &GeoPoint, target: &GeoPoint) -> Vec3 {
    let d_lat = (target.latitude - observer.latitude).to_radians();
    let d_lon = wrap_degrees(target.longitude - observer.longitude).to_radians();
    let cos_lat = observer.latitude.to_radians().cos();

    Vec3::new(
        EARTH_RADIUS_M * d_lon * cos_lat,
        target.altitude - observer.altitude,
        EARTH_RADIUS_M * d_lat,
    )
}

/// Inverse of [`project`]: the geographic point at `local` metres from
/// `observer`.
///
/// At the poles the east offset is meaningless and is dropped.
pub fn unproject(observer: &GeoPoint, local: Vec3) -> GeoPoint {
    let cos_lat = observer.latitude.to_radians().cos();
    let d_lat = local.z / EARTH_RADIUS_M;
    let d_lon = if cos_lat.abs() < 1e-12 {
        0.0
    } else {
        local.x / (EARTH_RADIUS_M * cos_lat)
    };

    GeoPoint {
        latitude: observer.latitude + d_lat.to_degrees(),
        longitude: wrap_degrees(observer.longitude + d_lon.to_degrees()),
        altitude: observer.altitude + local.y,
    }
}

/// The point `east_m` / `north_m` metres away from `origin` at the same
/// altitude.
pub fn offset(origin: &GeoPoint, east_m: f64, north_m: f64) -> GeoPoint {
    unproject(origin, Vec3::new(east_m, 0.0, north_m))
}

/// `degrees` folded into [-180, 180].  In-range values pass through
/// untouched.
fn wrap_degrees(degrees: f64) -> f64 {
    if (-180.0..=180.0).contains(&degrees) {
        degrees
    } else {
        (degrees + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Great-circle distance between `a` and `b` in metres (altitude ignored).
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi_a = a.latitude.to_radians();
    let phi_b = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h marginally past 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
