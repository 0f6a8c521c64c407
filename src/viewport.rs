//! Pixel radius to ground distance conversion.
//!
//! Map SDKs report zoom as Web-Mercator "base units" per screen pixel. One
//! base unit covers fewer meters the further it is from the equator, so the
//! same on-screen radius spans less ground at high latitudes.

use serde::{Deserialize, Serialize};

use crate::geo_utils::EARTH_RADIUS_METERS;
use crate::Bounds;

/// Width of the whole Web-Mercator world in base units (2^28).
pub const MERCATOR_WORLD_SIZE: f64 = 268_435_456.0;

/// Tile edge in pixels for slippy-map zoom levels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude beyond which Web-Mercator is undefined.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_78;

const EARTH_CIRCUMFERENCE: f64 = 2.0 * std::f64::consts::PI * EARTH_RADIUS_METERS;

/// Meters covered by one base unit at `latitude`.
#[inline]
pub fn meters_per_base_unit(latitude: f64) -> f64 {
    let lat = latitude.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    EARTH_CIRCUMFERENCE * lat.to_radians().cos() / MERCATOR_WORLD_SIZE
}

/// Convert an on-screen radius to meters on the ground.
///
/// `zoom_scale` is base units per screen pixel. Non-positive or non-finite
/// inputs yield 0.0, which makes every valid point its own cluster.
///
/// ```rust
/// use marker_cluster::pixels_to_ground_radius;
///
/// let equator = pixels_to_ground_radius(40.0, 0.0, 16.0);
/// let oslo = pixels_to_ground_radius(40.0, 60.0, 16.0);
/// assert!(oslo < equator);
/// assert_eq!(pixels_to_ground_radius(0.0, 0.0, 16.0), 0.0);
/// ```
pub fn pixels_to_ground_radius(pixel_radius: f64, reference_latitude: f64, zoom_scale: f64) -> f64 {
    if !(pixel_radius > 0.0) || !(zoom_scale > 0.0) || !reference_latitude.is_finite() {
        return 0.0;
    }
    let meters = pixel_radius * zoom_scale * meters_per_base_unit(reference_latitude);
    if meters.is_finite() {
        meters
    } else {
        0.0
    }
}

/// Base units per pixel at a slippy-map zoom level (256-pixel tiles).
pub fn zoom_scale_for_zoom_level(zoom: f64) -> f64 {
    MERCATOR_WORLD_SIZE / (TILE_SIZE * 2f64.powf(zoom))
}

/// What the camera currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Viewport {
    pub bounds: Bounds,
    /// Base units per screen pixel
    pub zoom_scale: f64,
    pub reference_latitude: f64,
}

impl Viewport {
    /// Viewport whose reference latitude is the center of `bounds`.
    pub fn new(bounds: Bounds, zoom_scale: f64) -> Self {
        Self {
            bounds,
            zoom_scale,
            reference_latitude: bounds.center().latitude,
        }
    }

    /// Viewport from a slippy-map zoom level.
    pub fn from_zoom_level(bounds: Bounds, zoom: f64) -> Self {
        Self::new(bounds, zoom_scale_for_zoom_level(zoom))
    }

    /// Ground radius for an on-screen radius in this viewport.
    pub fn ground_radius(&self, pixel_radius: f64) -> f64 {
        pixels_to_ground_radius(pixel_radius, self.reference_latitude, self.zoom_scale)
    }

    /// Visible bounds grown by `ratio` of their height/width on every side.
    ///
    /// Latitudes are clamped to the valid range.
    pub fn padded_bounds(&self, ratio: f64) -> Bounds {
        let b = &self.bounds;
        let lat_pad = (b.max_lat - b.min_lat).abs() * ratio;
        let lng_span = if b.min_lng <= b.max_lng {
            b.max_lng - b.min_lng
        } else {
            b.max_lng + 360.0 - b.min_lng
        };
        let lng_pad = lng_span * ratio;
        if lng_span + 2.0 * lng_pad >= 360.0 {
            return Bounds {
                min_lat: (b.min_lat - lat_pad).max(-90.0),
                max_lat: (b.max_lat + lat_pad).min(90.0),
                min_lng: -180.0,
                max_lng: 180.0,
            };
        }
        Bounds {
            min_lat: (b.min_lat - lat_pad).max(-90.0),
            max_lat: (b.max_lat + lat_pad).min(90.0),
            min_lng: crate::geo_utils::normalize_longitude(b.min_lng - lng_pad),
            max_lng: crate::geo_utils::normalize_longitude(b.max_lng + lng_pad),
        }
    }
}
