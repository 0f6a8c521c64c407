//! # Geographic Utilities
//!
//! Core geographic computations shared by the clustering engine and the
//! polyline helpers.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two points |
//! | [`compute_bounds`] | Bounding box of a set of points |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//! | [`LocalFrame`] | Equirectangular meters frame around a reference point |
//! | [`closest_on_segment`] | Closest point on a planar segment |
//!
//! All functions expect WGS84 coordinates in degrees.

use geo::{Closest, ClosestPoint, Coord, Distance, Haversine, Line, Point};

use crate::{Bounds, GeoPoint};

/// Mean Earth radius in meters (IUGG), the radius the haversine formula uses.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Meters per degree of latitude on the mean sphere.
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface.
///
/// ```rust
/// use marker_cluster::{GeoPoint, geo_utils};
///
/// let london = GeoPoint::new(51.5074, -0.1278);
/// let paris = GeoPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Convert meters to approximate degrees of longitude at a given latitude.
///
/// Longitude degrees shrink with `cos(latitude)`, so the result is the larger
/// of the two axes and safe to use for square search boxes. Returns `None`
/// near the poles where the conversion blows up.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> Option<f64> {
    let cos_lat = latitude.to_radians().cos();
    if cos_lat < 0.01 {
        return None;
    }
    Some(meters / (METERS_PER_DEGREE * cos_lat))
}

/// Wrap a longitude difference into `[-180, 180)`.
#[inline]
pub fn wrap_longitude_delta(delta: f64) -> f64 {
    let wrapped = (delta + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped.is_finite() {
        wrapped
    } else {
        delta
    }
}

/// Bring a longitude back into `[-180, 180]`.
#[inline]
pub fn normalize_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        lng
    } else {
        (lng + 180.0).rem_euclid(360.0) - 180.0
    }
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a set of points.
///
/// For empty input, returns bounds with MIN/MAX values that contain nothing.
pub fn compute_bounds(points: &[GeoPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds {
        min_lat,
        max_lat,
        min_lng,
        max_lng,
    }
}

// =============================================================================
// Local Planar Frame
// =============================================================================

/// Equirectangular projection centred on a reference point.
///
/// Maps coordinates to `x`/`y` meters east/north of the origin. The mapping
/// is affine in (lat, lng), so interpolating in meters and interpolating in
/// degrees give the same point. Accurate to well under a meter at the scale
/// of a single map screen.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: GeoPoint,
    meters_per_lng_degree: f64,
}

impl LocalFrame {
    /// Create a frame around `origin`.
    pub fn new(origin: GeoPoint) -> Self {
        Self {
            origin,
            meters_per_lng_degree: METERS_PER_DEGREE * origin.latitude.to_radians().cos(),
        }
    }

    /// Create a frame whose x-scale uses the mean latitude of two points.
    pub fn spanning(a: &GeoPoint, b: &GeoPoint) -> Self {
        let mid_lat = (a.latitude + b.latitude) / 2.0;
        Self {
            origin: *a,
            meters_per_lng_degree: METERS_PER_DEGREE * mid_lat.to_radians().cos(),
        }
    }

    /// Project a coordinate to meters east/north of the origin.
    #[inline]
    pub fn to_local(&self, p: &GeoPoint) -> Coord<f64> {
        let dlng = wrap_longitude_delta(p.longitude - self.origin.longitude);
        let dlat = p.latitude - self.origin.latitude;
        Coord {
            x: dlng * self.meters_per_lng_degree,
            y: dlat * METERS_PER_DEGREE,
        }
    }

    /// Inverse of [`LocalFrame::to_local`].
    #[inline]
    pub fn to_geo(&self, c: Coord<f64>) -> GeoPoint {
        let lng = if self.meters_per_lng_degree.abs() > f64::EPSILON {
            self.origin.longitude + c.x / self.meters_per_lng_degree
        } else {
            self.origin.longitude
        };
        GeoPoint::new(self.origin.latitude + c.y / METERS_PER_DEGREE, normalize_longitude(lng))
    }
}

/// Closest point to `p` on `segment`, both in the same planar frame.
///
/// Projections past either end clamp to that endpoint. A zero-length segment
/// has no single closest point, so its start is used.
#[inline]
pub fn closest_on_segment(segment: &Line<f64>, p: Point<f64>) -> Point<f64> {
    match segment.closest_point(&p) {
        Closest::Intersection(c) | Closest::SinglePoint(c) => c,
        Closest::Indeterminate => segment.start_point(),
    }
}

// =============================================================================
// Tests
// =============================================================================
