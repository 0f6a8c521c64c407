//! # Algorithm Toolbox
//!
//! Direct access to the pure algorithms in this crate, for callers that want
//! to cluster or simplify without running a [`ClusterLayer`](crate::ClusterLayer).
//!
//! ## Core Algorithms
//!
//! - **Radius Clustering**: Greedy first-come grouping within a ground radius
//! - **Identity Diff**: Reconcile consecutive passes against live markers
//! - **Path Projection**: Nearest point on a polyline
//! - **Douglas-Peucker**: Line simplification with a tolerance in meters
//!
//! ## Geographic Utilities
//!
//! - **Haversine Distance**: Great-circle distance between points
//! - **Ground Radius**: On-screen pixels to meters for a Web-Mercator zoom
//! - **Bounds Computation**: Bounding box for a set of points
//!
//! # Example
//!
//! ```rust
//! use marker_cluster::algorithms::{
//!     cluster_indices, haversine_distance, pixels_to_ground_radius, GeoPoint,
//! };
//!
//! let london = GeoPoint::new(51.5074, -0.1278);
//! let nearby = GeoPoint::new(51.5076, -0.1279);
//! let paris = GeoPoint::new(48.8566, 2.3522);
//!
//! let radius = pixels_to_ground_radius(40.0, 51.5, 16.0);
//! assert!(haversine_distance(&london, &nearby) < radius);
//!
//! let groups = cluster_indices(&[london, nearby, paris], radius);
//! assert_eq!(groups, vec![vec![0, 1], vec![2]]);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{Bounds, ClusterConfig, GeoPoint, MapPoint};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    closest_on_segment, compute_bounds, haversine_distance, meters_to_degrees, normalize_longitude,
    LocalFrame,
};

/// Convert an on-screen radius to meters at a reference latitude.
///
/// One Web-Mercator base unit spans `circumference * cos(lat) / 2^28` meters,
/// so the result shrinks toward the poles for the same pixel radius.
pub use crate::viewport::{meters_per_base_unit, pixels_to_ground_radius, zoom_scale_for_zoom_level};

// =============================================================================
// Clustering
// =============================================================================

/// Greedy radius clustering.
///
/// Algorithm:
/// 1. Visit points in input order
/// 2. The first unassigned point becomes a representative
/// 3. Every unassigned point within the ground radius joins it
///
/// Both strategies produce the same partition; the spatial index only
/// narrows the candidate set.
pub use crate::clustering::{
    cluster, cluster_flat, cluster_indices, cluster_with_stats, cluster_with_strategy,
    ClusterResult, ClusterStats, ClusterStrategy,
};

/// Style tier lookup by member count.
pub use crate::style::{resolve_style, StyleTier, StyleTiers};

/// Identity-preserving diff between passes.
pub use crate::diff::{reconcile, reconcile_with, ClusterDelta, ClusterIdentity, RenderedCluster};

// =============================================================================
// Polylines
// =============================================================================

/// Nearest point on a polyline, and the remainder of the path from there.
pub use crate::path::{nearest_point_on_path, resume_path, PathProjection};

/// Ramer-Douglas-Peucker simplification.
///
/// Uses an explicit stack, so arbitrarily long tracks are safe.
/// Perpendicular distances are measured in meters.
pub use crate::simplify::{simplify, simplify_indices, simplify_many, simplify_map_points};
