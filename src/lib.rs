//! # Marker Cluster
//!
//! Viewport-adaptive clustering of map markers, plus the geometry helpers
//! that map renderers need alongside it.
//!
//! This library provides:
//! - Greedy radius clustering of large, frequently replaced point sets
//! - Pixel-radius to ground-radius conversion for Web-Mercator viewports
//! - Debounced, off-thread recomputation with identity-preserving diffs
//! - Nearest point on a polyline (for resuming marker animations)
//! - Ramer–Douglas–Peucker polyline simplification in meters
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel batch simplification with rayon
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use marker_cluster::{cluster, pixels_to_ground_radius, MapPoint};
//!
//! let points = vec![
//!     MapPoint::new("a", 51.5074, -0.1278),
//!     MapPoint::new("b", 51.5075, -0.1279),
//!     MapPoint::new("c", 48.8566, 2.3522),
//! ];
//!
//! // 40 screen pixels at a city-level zoom
//! let radius = pixels_to_ground_radius(40.0, 51.5, 16.0);
//! let clusters = cluster(&points, radius, 2);
//!
//! assert_eq!(clusters.len(), 2);
//! assert_eq!(clusters[0].count, 2);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{ClusterError, Result};

// Geographic utilities (distance, bounds, local projections)
pub mod geo_utils;

// Pixel radius to ground distance conversion
pub mod viewport;
pub use viewport::{
    pixels_to_ground_radius, zoom_scale_for_zoom_level, Viewport, MERCATOR_WORLD_SIZE,
};

// Greedy radius clustering
pub mod clustering;
pub use clustering::{
    cluster, cluster_flat, cluster_indices, cluster_with_stats, cluster_with_strategy,
    ClusterResult, ClusterStats, ClusterStrategy,
};

// Count-based style tiers
pub mod style;
pub use style::{resolve_style, StyleTier, StyleTiers};

// Debounced recompute scheduling
pub mod scheduler;
pub use scheduler::{Clock, ManualClock, SystemClock, UpdateScheduler, DEFAULT_DEBOUNCE};

// Identity-preserving diff between cluster passes
pub mod diff;
pub use diff::{reconcile, reconcile_with, ClusterDelta, ClusterIdentity, RenderedCluster};

// Nearest point on a polyline
pub mod path;
pub use path::{nearest_point_on_path, resume_path, PathProjection};

// Ramer–Douglas–Peucker simplification
pub mod simplify;
pub use simplify::{simplify, simplify_indices, simplify_many, simplify_map_points};

// Stateful cluster layer (worker thread + main-thread apply)
pub mod layer;
pub use layer::{ClusterLayer, ClusterPress, LayerStats};

// Algorithm toolbox - modular access to all pure algorithms
pub mod algorithms;

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("MarkerClusterRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A bare geographic coordinate in WGS84 degrees.
///
/// # Example
/// ```
/// use marker_cluster::GeoPoint;
/// let point = GeoPoint::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A marker submitted for clustering.
///
/// The payload is carried through untouched and handed back in
/// [`ClusterPress`] when a cluster marker is activated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl MapPoint {
    /// Create a point with an empty payload.
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// The coordinate of this point.
    pub fn coord(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.coord().is_valid()
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points. Returns `None` for an empty slice.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Check whether a point lies inside (inclusive).
    ///
    /// Bounds with `min_lng > max_lng` are treated as crossing the antimeridian.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if point.latitude < self.min_lat || point.latitude > self.max_lat {
            return false;
        }
        if self.min_lng <= self.max_lng {
            point.longitude >= self.min_lng && point.longitude <= self.max_lng
        } else {
            point.longitude >= self.min_lng || point.longitude <= self.max_lng
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`ClusterLayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct ClusterConfig {
    /// On-screen clustering radius in pixels.
    /// Default: 40.0
    pub pixel_radius: f64,

    /// Minimum member count for a group to render as a cluster marker.
    /// Smaller groups are still emitted, flagged as plain markers.
    /// Default: 2
    pub min_cluster_size: u32,

    /// Quiescence window before a recompute runs, in milliseconds.
    /// Default: 300
    pub debounce_ms: u64,

    /// Neighbour search strategy. Both produce identical groupings.
    /// Default: SpatialIndex
    pub strategy: ClusterStrategy,

    /// When > 0, only points inside the viewport grown by this fraction of
    /// its size are clustered. 0 clusters the whole dataset every pass.
    /// Default: 0.0
    pub viewport_padding_ratio: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            pixel_radius: 40.0,
            min_cluster_size: 2,
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            strategy: ClusterStrategy::SpatialIndex,
            viewport_padding_ratio: 0.0,
        }
    }
}

impl ClusterConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ClusterError::InvalidConfig {
            field: "<json>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if !self.pixel_radius.is_finite() {
            return Err(ClusterError::InvalidConfig {
                field: "pixel_radius".to_string(),
                message: format!("must be finite, got {}", self.pixel_radius),
            });
        }
        if !self.viewport_padding_ratio.is_finite() || self.viewport_padding_ratio < 0.0 {
            return Err(ClusterError::InvalidConfig {
                field: "viewport_padding_ratio".to_string(),
                message: format!(
                    "must be a non-negative number, got {}",
                    self.viewport_padding_ratio
                ),
            });
        }
        Ok(())
    }

    /// The debounce window as a `Duration`.
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(51.5074, -0.1278).is_valid());
        assert!(GeoPoint::new(-90.0, 180.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_map_point_payload_roundtrip() {
        let point = MapPoint::new("cafe", 51.5, -0.12)
            .with_payload(serde_json::json!({ "name": "Cafe", "rating": 4 }));
        let json = serde_json::to_string(&point).unwrap();
        let back: MapPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);

        // Payload is optional on input
        let bare: MapPoint =
            serde_json::from_str(r#"{"id":"x","latitude":1.0,"longitude":2.0}"#).unwrap();
        assert!(bare.payload.is_null());
    }

    #[test]
    fn test_bounds_contains() {
        let bounds = Bounds::from_points(&[
            GeoPoint::new(51.50, -0.13),
            GeoPoint::new(51.51, -0.12),
        ])
        .unwrap();
        assert!(bounds.contains(&GeoPoint::new(51.505, -0.125)));
        assert!(!bounds.contains(&GeoPoint::new(51.52, -0.125)));
        assert!(Bounds::from_points(&[]).is_none());

        let wrapping = Bounds {
            min_lat: -10.0,
            max_lat: 10.0,
            min_lng: 170.0,
            max_lng: -170.0,
        };
        assert!(wrapping.contains(&GeoPoint::new(0.0, 179.0)));
        assert!(wrapping.contains(&GeoPoint::new(0.0, -175.0)));
        assert!(!wrapping.contains(&GeoPoint::new(0.0, 0.0)));
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = ClusterConfig::default();
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.min_cluster_size, 2);

        let parsed = ClusterConfig::from_json(r#"{"pixel_radius": 60.0}"#).unwrap();
        assert_eq!(parsed.pixel_radius, 60.0);
        assert_eq!(parsed.debounce_ms, 300);

        assert!(matches!(
            ClusterConfig::from_json(r#"{"viewport_padding_ratio": -1.0}"#),
            Err(ClusterError::InvalidConfig { .. })
        ));
        assert!(ClusterConfig::from_json("not json").is_err());
    }
}
