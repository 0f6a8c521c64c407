//! FFI bindings for mobile platforms (iOS/Android).
//!
//! This module provides the UniFFI bindings that expose Rust functionality
//! to Kotlin and Swift. Free functions are prefixed with `ffi_` to avoid
//! naming conflicts with the internal API. Stateful clustering goes through
//! [`ClusterLayerHandle`], one per map layer.
//!
//! Marker payloads cross the boundary as JSON strings.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info};

use crate::clustering::cluster_with_strategy;
use crate::{
    init_logging, nearest_point_on_path, pixels_to_ground_radius, resume_path, simplify,
    zoom_scale_for_zoom_level, ClusterConfig, ClusterDelta, ClusterError, ClusterLayer,
    ClusterPress, ClusterResult, GeoPoint, MapPoint, PathProjection, RenderedCluster, Result,
    StyleTier, StyleTiers, Viewport,
};

// ============================================================================
// FFI Records
// ============================================================================

/// A marker as submitted from Kotlin/Swift.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMapPoint {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// JSON payload. Empty means no payload.
    pub payload_json: String,
}

impl FfiMapPoint {
    fn into_map_point(self) -> Result<MapPoint> {
        let payload = if self.payload_json.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&self.payload_json).map_err(|e| ClusterError::InvalidPayload {
                point_id: self.id.clone(),
                message: e.to_string(),
            })?
        };
        Ok(MapPoint::new(self.id, self.latitude, self.longitude).with_payload(payload))
    }
}

fn convert_points(points: Vec<FfiMapPoint>) -> Result<Vec<MapPoint>> {
    points.into_iter().map(FfiMapPoint::into_map_point).collect()
}

/// One clustering result, with member ids instead of indices.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCluster {
    pub representative_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub count: u32,
    pub is_cluster: bool,
    pub member_ids: Vec<String>,
}

impl FfiCluster {
    fn from_result(result: &ClusterResult, points: &[MapPoint]) -> Self {
        Self {
            representative_id: result.representative.id.clone(),
            latitude: result.representative.latitude,
            longitude: result.representative.longitude,
            count: result.count as u32,
            is_cluster: result.is_cluster,
            member_ids: result.members(points).map(|p| p.id.clone()).collect(),
        }
    }
}

/// A marker the host should place on the map.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMarker {
    pub marker_id: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub count: u32,
    pub is_cluster: bool,
    pub style: String,
}

impl From<&RenderedCluster<String>> for FfiMarker {
    fn from(rendered: &RenderedCluster<String>) -> Self {
        let coord = rendered.cluster.coord();
        Self {
            marker_id: rendered.marker_id,
            latitude: coord.latitude,
            longitude: coord.longitude,
            count: rendered.cluster.count as u32,
            is_cluster: rendered.cluster.is_cluster,
            style: rendered.style.clone(),
        }
    }
}

/// Marker changes for one applied pass.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMarkerDelta {
    pub added: Vec<FfiMarker>,
    pub removed_ids: Vec<u64>,
    pub kept_ids: Vec<u64>,
}

impl From<ClusterDelta<String>> for FfiMarkerDelta {
    fn from(delta: ClusterDelta<String>) -> Self {
        Self {
            added: delta.to_add.iter().map(|r| FfiMarker::from(r.as_ref())).collect(),
            removed_ids: delta.to_remove.iter().map(|r| r.marker_id).collect(),
            kept_ids: delta.to_keep.iter().map(|r| r.marker_id).collect(),
        }
    }
}

/// Style applied from `min_points` members upwards.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStyleTier {
    pub min_points: u32,
    pub style: String,
}

fn style_tiers(tiers: Vec<FfiStyleTier>, default_style: String) -> StyleTiers<String> {
    StyleTiers::new(
        tiers
            .into_iter()
            .map(|t| StyleTier::new(t.min_points as usize, t.style))
            .collect(),
        default_style,
    )
}

/// Press payload with member payloads as a JSON array.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiClusterPress {
    pub marker_id: u64,
    pub count: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub payloads_json: String,
}

impl From<ClusterPress> for FfiClusterPress {
    fn from(press: ClusterPress) -> Self {
        let payloads_json = serde_json::to_string(&press.payloads).unwrap_or_else(|e| {
            error!("[MarkerClusterRust] Failed to encode press payloads: {}", e);
            "[]".to_string()
        });
        Self {
            marker_id: press.marker_id,
            count: press.count as u32,
            latitude: press.latitude,
            longitude: press.longitude,
            payloads_json,
        }
    }
}

// ============================================================================
// Stateless Functions
// ============================================================================

/// Cluster points once, without a layer.
///
/// Returns an empty list if any payload fails to parse.
#[uniffi::export]
pub fn ffi_cluster_points(
    points: Vec<FfiMapPoint>,
    viewport: Viewport,
    config: ClusterConfig,
) -> Vec<FfiCluster> {
    init_logging();
    let points = match convert_points(points) {
        Ok(points) => points,
        Err(e) => {
            error!("[MarkerClusterRust] ffi_cluster_points: {}", e);
            return Vec::new();
        }
    };

    let radius = viewport.ground_radius(config.pixel_radius);
    let clusters = cluster_with_strategy(
        &points,
        radius,
        config.min_cluster_size as usize,
        config.strategy,
    );
    info!(
        "[MarkerClusterRust] Clustered {} points into {} at {:.0}m",
        points.len(),
        clusters.len(),
        radius
    );
    clusters
        .iter()
        .map(|c| FfiCluster::from_result(c, &points))
        .collect()
}

/// Convert an on-screen radius to meters.
#[uniffi::export]
pub fn ffi_pixels_to_ground_radius(pixel_radius: f64, reference_latitude: f64, zoom_scale: f64) -> f64 {
    pixels_to_ground_radius(pixel_radius, reference_latitude, zoom_scale)
}

/// Base units per pixel for a slippy-map zoom level.
#[uniffi::export]
pub fn ffi_zoom_scale_for_zoom_level(zoom: f64) -> f64 {
    zoom_scale_for_zoom_level(zoom)
}

/// Nearest point on a path, or `None` for paths shorter than two points.
#[uniffi::export]
pub fn ffi_nearest_point_on_path(path: Vec<GeoPoint>, target: GeoPoint) -> Option<PathProjection> {
    nearest_point_on_path(&path, &target)
}

/// The remainder of `path` starting from the point nearest `current`.
#[uniffi::export]
pub fn ffi_resume_path(path: Vec<GeoPoint>, current: GeoPoint) -> Vec<GeoPoint> {
    resume_path(&path, &current)
}

/// Ramer-Douglas-Peucker simplification with a tolerance in meters.
#[uniffi::export]
pub fn ffi_simplify_path(points: Vec<GeoPoint>, tolerance_meters: f64) -> Vec<GeoPoint> {
    init_logging();
    let simplified = simplify(&points, tolerance_meters);
    debug!(
        "[MarkerClusterRust] Simplified {} -> {} points",
        points.len(),
        simplified.len()
    );
    simplified
}

// ============================================================================
// Cluster Layer Handle
// ============================================================================

/// One clustered map layer, owned by the host view.
///
/// Commands return `false` once the layer is shut down or when the input is
/// rejected; the reason is logged.
#[derive(uniffi::Object)]
pub struct ClusterLayerHandle {
    layer: Mutex<ClusterLayer<String>>,
}

impl ClusterLayerHandle {
    fn lock(&self) -> MutexGuard<'_, ClusterLayer<String>> {
        self.layer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(&self, what: &str, command: impl FnOnce(&mut ClusterLayer<String>) -> Result<()>) -> bool {
        match command(&mut *self.lock()) {
            Ok(()) => true,
            Err(e) => {
                error!("[MarkerClusterRust] {} failed: {}", what, e);
                false
            }
        }
    }
}

/// Create a layer. Returns `None` if the config is invalid or the worker
/// thread cannot start.
#[uniffi::export]
pub fn ffi_create_cluster_layer(
    config: ClusterConfig,
    tiers: Vec<FfiStyleTier>,
    default_style: String,
) -> Option<Arc<ClusterLayerHandle>> {
    init_logging();
    match ClusterLayer::new(config, style_tiers(tiers, default_style)) {
        Ok(layer) => Some(Arc::new(ClusterLayerHandle {
            layer: Mutex::new(layer),
        })),
        Err(e) => {
            error!("[MarkerClusterRust] Failed to create layer: {}", e);
            None
        }
    }
}

#[uniffi::export]
impl ClusterLayerHandle {
    pub fn set_points(&self, points: Vec<FfiMapPoint>) -> bool {
        match convert_points(points) {
            Ok(points) => self.run("set_points", |layer| layer.set_points(points)),
            Err(e) => {
                error!("[MarkerClusterRust] set_points rejected: {}", e);
                false
            }
        }
    }

    pub fn set_viewport(&self, viewport: Viewport) -> bool {
        self.run("set_viewport", |layer| layer.set_viewport(viewport))
    }

    pub fn set_config(&self, config: ClusterConfig) -> bool {
        self.run("set_config", |layer| layer.set_config(config))
    }

    pub fn set_style_tiers(&self, tiers: Vec<FfiStyleTier>, default_style: String) -> bool {
        self.run("set_style_tiers", |layer| {
            layer.set_style_tiers(style_tiers(tiers, default_style))
        })
    }

    /// Apply the newest finished pass without blocking.
    pub fn poll_update(&self) -> Option<FfiMarkerDelta> {
        self.lock().poll_update().map(FfiMarkerDelta::from)
    }

    /// Wait up to `timeout_ms` for a finished pass.
    pub fn wait_update(&self, timeout_ms: u64) -> Option<FfiMarkerDelta> {
        self.lock()
            .wait_update(Duration::from_millis(timeout_ms))
            .map(FfiMarkerDelta::from)
    }

    /// Every marker currently live.
    pub fn live_markers(&self) -> Vec<FfiMarker> {
        self.lock()
            .live()
            .iter()
            .map(|r| FfiMarker::from(r.as_ref()))
            .collect()
    }

    pub fn press(&self, marker_id: u64) -> Option<FfiClusterPress> {
        self.lock().press(marker_id).map(FfiClusterPress::from)
    }

    pub fn shutdown(&self) {
        self.lock().shutdown();
    }
}
