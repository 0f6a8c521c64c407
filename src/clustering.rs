//! Greedy radius clustering.
//!
//! Points are visited in input order. Each unvisited point starts a new
//! cluster and absorbs every still-unvisited point within the ground radius
//! of it. The result is deterministic for a fixed input order: the
//! representative is always the lowest-index member, and members are listed
//! in ascending index order.
//!
//! Two neighbour search strategies are provided. [`ClusterStrategy::BruteForce`]
//! scans every remaining point. [`ClusterStrategy::SpatialIndex`] fetches
//! candidates from an R-tree and then applies the exact same distance test,
//! so both produce identical partitions.

use std::time::{Duration, Instant};

use log::debug;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_distance, meters_to_degrees, METERS_PER_DEGREE};
use crate::{GeoPoint, MapPoint};

/// Extra slack on R-tree search boxes so haversine/degree rounding never
/// excludes a point that is exactly on the radius.
const SEARCH_BOX_SLACK: f64 = 1.001;

/// Neighbour search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum ClusterStrategy {
    /// O(n²) scan of every remaining point.
    BruteForce,
    /// R-tree candidate lookup, exact distance test.
    #[default]
    SpatialIndex,
}

/// One group produced by a clustering pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    /// The point that started the cluster (always a member).
    pub representative: MapPoint,
    /// Indices into the input slice, ascending.
    pub member_indices: Vec<usize>,
    pub count: usize,
    /// `count >= min_cluster_size`; a rendering hint only.
    pub is_cluster: bool,
}

impl ClusterResult {
    /// Coordinate of the representative point.
    pub fn coord(&self) -> GeoPoint {
        self.representative.coord()
    }

    /// Members resolved against the input slice the cluster was built from.
    pub fn members<'a>(&'a self, points: &'a [MapPoint]) -> impl Iterator<Item = &'a MapPoint> {
        self.member_indices.iter().filter_map(move |&i| points.get(i))
    }
}

/// Summary of one clustering pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterStats {
    pub input_count: usize,
    pub valid_count: usize,
    pub cluster_count: usize,
    pub elapsed: Duration,
}

// ============================================================================
// Public API
// ============================================================================

/// Cluster `points` with the default strategy.
///
/// Invalid coordinates are excluded entirely. Groups smaller than
/// `min_cluster_size` are still returned, with `is_cluster == false`.
///
/// ```rust
/// use marker_cluster::{cluster, MapPoint};
///
/// let points = vec![
///     MapPoint::new("a", 0.0, 0.0),
///     MapPoint::new("b", 0.0, 0.0001),
///     MapPoint::new("c", 1.0, 1.0),
/// ];
/// let clusters = cluster(&points, 50.0, 2);
/// assert_eq!(clusters[0].member_indices, vec![0, 1]);
/// assert_eq!(clusters[1].member_indices, vec![2]);
/// assert!(!clusters[1].is_cluster);
/// ```
pub fn cluster(points: &[MapPoint], ground_radius: f64, min_cluster_size: usize) -> Vec<ClusterResult> {
    cluster_with_strategy(points, ground_radius, min_cluster_size, ClusterStrategy::default())
}

/// Cluster `points` with an explicit neighbour search strategy.
pub fn cluster_with_strategy(
    points: &[MapPoint],
    ground_radius: f64,
    min_cluster_size: usize,
    strategy: ClusterStrategy,
) -> Vec<ClusterResult> {
    cluster_with_stats(points, ground_radius, min_cluster_size, strategy).0
}

/// Like [`cluster_with_strategy`], also returning pass statistics.
pub fn cluster_with_stats(
    points: &[MapPoint],
    ground_radius: f64,
    min_cluster_size: usize,
    strategy: ClusterStrategy,
) -> (Vec<ClusterResult>, ClusterStats) {
    let start = Instant::now();
    let coords: Vec<GeoPoint> = points.iter().map(MapPoint::coord).collect();
    let groups = group_coords(&coords, ground_radius, strategy);

    let clusters: Vec<ClusterResult> = groups
        .into_iter()
        .map(|member_indices| {
            let count = member_indices.len();
            ClusterResult {
                representative: points[member_indices[0]].clone(),
                member_indices,
                count,
                is_cluster: count >= min_cluster_size,
            }
        })
        .collect();

    let stats = ClusterStats {
        input_count: points.len(),
        valid_count: coords.iter().filter(|c| c.is_valid()).count(),
        cluster_count: clusters.len(),
        elapsed: start.elapsed(),
    };
    debug!(
        "[Clustering] {} points ({} valid) -> {} clusters at {:.0}m in {:?}",
        stats.input_count, stats.valid_count, stats.cluster_count, ground_radius, stats.elapsed
    );

    (clusters, stats)
}

/// Index-only clustering over bare coordinates.
///
/// Returns one `Vec` of member indices per cluster, first element being the
/// representative.
pub fn cluster_indices(coords: &[GeoPoint], ground_radius: f64) -> Vec<Vec<usize>> {
    group_coords(coords, ground_radius, ClusterStrategy::default())
}

/// Clustering over parallel latitude/longitude arrays.
///
/// Entries beyond the shorter of the two slices are ignored.
pub fn cluster_flat(latitudes: &[f64], longitudes: &[f64], ground_radius: f64) -> Vec<Vec<usize>> {
    let coords: Vec<GeoPoint> = latitudes
        .iter()
        .zip(longitudes)
        .map(|(&lat, &lng)| GeoPoint::new(lat, lng))
        .collect();
    cluster_indices(&coords, ground_radius)
}

// ============================================================================
// Core
// ============================================================================

fn group_coords(coords: &[GeoPoint], ground_radius: f64, strategy: ClusterStrategy) -> Vec<Vec<usize>> {
    // NaN and negative radii degrade to singletons
    let radius = if ground_radius > 0.0 { ground_radius } else { 0.0 };

    match strategy {
        ClusterStrategy::BruteForce => group_brute_force(coords, radius),
        ClusterStrategy::SpatialIndex => group_indexed(coords, radius),
    }
}

fn group_brute_force(coords: &[GeoPoint], radius: f64) -> Vec<Vec<usize>> {
    // Invalid points start out visited so they are never absorbed or emitted
    let mut visited: Vec<bool> = coords.iter().map(|c| !c.is_valid()).collect();
    let mut groups = Vec::new();

    for i in 0..coords.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let mut members = vec![i];

        for j in (i + 1)..coords.len() {
            if !visited[j] && haversine_distance(&coords[i], &coords[j]) <= radius {
                visited[j] = true;
                members.push(j);
            }
        }
        groups.push(members);
    }

    groups
}

/// A coordinate with its input index, for R-tree queries.
#[derive(Debug, Clone, Copy)]
struct IndexedCoord {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedCoord {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

impl PointDistance for IndexedCoord {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlng = self.lng - point[1];
        dlat * dlat + dlng * dlng
    }
}

/// Degree-space search box around `center`, or `None` when the box would
/// reach a pole or wrap the antimeridian (the caller then scans everything).
fn search_box(center: &GeoPoint, radius: f64) -> Option<AABB<[f64; 2]>> {
    let lat_deg = radius * SEARCH_BOX_SLACK / METERS_PER_DEGREE;
    let min_lat = center.latitude - lat_deg;
    let max_lat = center.latitude + lat_deg;
    if min_lat <= -90.0 || max_lat >= 90.0 {
        return None;
    }
    // Widest longitude span occurs at the latitude closest to a pole
    let extreme_lat = min_lat.abs().max(max_lat.abs());
    let lng_deg = meters_to_degrees(radius * SEARCH_BOX_SLACK, extreme_lat)?;
    let min_lng = center.longitude - lng_deg;
    let max_lng = center.longitude + lng_deg;
    if min_lng < -180.0 || max_lng > 180.0 {
        return None;
    }
    Some(AABB::from_corners([min_lat, min_lng], [max_lat, max_lng]))
}

fn group_indexed(coords: &[GeoPoint], radius: f64) -> Vec<Vec<usize>> {
    let indexed: Vec<IndexedCoord> = coords
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_valid())
        .map(|(idx, c)| IndexedCoord {
            idx,
            lat: c.latitude,
            lng: c.longitude,
        })
        .collect();
    let tree = RTree::bulk_load(indexed);

    let mut visited: Vec<bool> = coords.iter().map(|c| !c.is_valid()).collect();
    let mut groups = Vec::new();

    for i in 0..coords.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let center = coords[i];

        let mut absorbed: Vec<usize> = match search_box(&center, radius) {
            Some(envelope) => tree
                .locate_in_envelope(&envelope)
                .map(|c| c.idx)
                .filter(|&j| !visited[j] && haversine_distance(&center, &coords[j]) <= radius)
                .collect(),
            None => ((i + 1)..coords.len())
                .filter(|&j| !visited[j] && haversine_distance(&center, &coords[j]) <= radius)
                .collect(),
        };
        // Tree order is arbitrary; membership order is scan order
        absorbed.sort_unstable();

        let mut members = Vec::with_capacity(absorbed.len() + 1);
        members.push(i);
        for j in absorbed {
            visited[j] = true;
            members.push(j);
        }
        groups.push(members);
    }

    groups
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// `n` points within a few meters of `(lat, lng)`.
    fn tight_group(prefix: &str, lat: f64, lng: f64, n: usize) -> Vec<MapPoint> {
        (0..n)
            .map(|i| MapPoint::new(format!("{}-{}", prefix, i), lat + i as f64 * 0.00001, lng))
            .collect()
    }

    fn both_strategies(points: &[MapPoint], radius: f64) -> Vec<ClusterResult> {
        let brute = cluster_with_strategy(points, radius, 2, ClusterStrategy::BruteForce);
        let indexed = cluster_with_strategy(points, radius, 2, ClusterStrategy::SpatialIndex);
        assert_eq!(brute, indexed, "strategies disagree");
        indexed
    }

    #[test]
    fn test_five_close_points_form_one_cluster() {
        let points = tight_group("p", 51.5074, -0.1278, 5);
        let clusters = both_strategies(&points, 300.0);

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 5);
        assert_eq!(clusters[0].member_indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(clusters[0].representative.id, "p-0");
        assert!(clusters[0].is_cluster);
    }

    #[test]
    fn test_far_points_stay_apart() {
        let points = vec![
            MapPoint::new("a", 51.5074, -0.1278),
            // ~10km north
            MapPoint::new("b", 51.5974, -0.1278),
        ];
        let clusters = both_strategies(&points, 300.0);

        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.count == 1 && !c.is_cluster));
    }

    #[test]
    fn test_representative_is_first_unvisited() {
        // b is within range of both a and c, a and c are out of range of each other
        let points = vec![
            MapPoint::new("a", 0.0, 0.0),
            MapPoint::new("b", 0.0, 0.0008),
            MapPoint::new("c", 0.0, 0.0016),
        ];
        let clusters = both_strategies(&points, 100.0);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].representative.id, "a");
        assert_eq!(clusters[0].member_indices, vec![0, 1]);
        assert_eq!(clusters[1].representative.id, "c");
        assert_eq!(clusters[1].member_indices, vec![2]);
    }

    #[test]
    fn test_invalid_points_excluded() {
        let points = vec![
            MapPoint::new("bad-lat", 95.0, 0.0),
            MapPoint::new("ok-1", 10.0, 10.0),
            MapPoint::new("nan", f64::NAN, 10.0),
            MapPoint::new("ok-2", 10.0, 10.00001),
            MapPoint::new("bad-lng", 10.0, 190.0),
        ];
        let clusters = both_strategies(&points, 50.0);

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_indices, vec![1, 3]);
        assert_eq!(clusters[0].representative.id, "ok-1");
    }

    #[test]
    fn test_zero_and_negative_radius_give_singletons() {
        let points = tight_group("p", 40.0, -74.0, 4);
        for radius in [0.0, -10.0, f64::NAN] {
            let clusters = both_strategies(&points, radius);
            assert_eq!(clusters.len(), 4);
            assert!(clusters.iter().all(|c| c.count == 1));
        }
    }

    #[test]
    fn test_zero_radius_still_merges_duplicates() {
        let points = vec![
            MapPoint::new("a", 1.0, 1.0),
            MapPoint::new("b", 1.0, 1.0),
        ];
        let clusters = both_strategies(&points, 0.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster(&[], 100.0, 2).is_empty());
        assert!(cluster_flat(&[], &[], 100.0).is_empty());
    }

    #[test]
    fn test_min_cluster_size_is_a_rendering_flag() {
        let points = tight_group("p", 0.0, 0.0, 3);
        let clusters = cluster(&points, 100.0, 5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 3);
        assert!(!clusters[0].is_cluster);
    }

    #[test]
    fn test_antimeridian_neighbours_are_found() {
        let points = vec![
            MapPoint::new("east", 0.0, 179.9999),
            MapPoint::new("west", 0.0, -179.9999),
        ];
        let clusters = both_strategies(&points, 100.0);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 2);
    }

    #[test]
    fn test_near_pole_falls_back_to_scan() {
        let points = vec![
            MapPoint::new("a", 89.9999, 0.0),
            MapPoint::new("b", 89.9999, 120.0),
        ];
        // Both ~11m from the pole, ~19m apart
        let clusters = both_strategies(&points, 50.0);
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn test_cluster_flat_matches_point_api() {
        let points = tight_group("p", 48.85, 2.35, 3);
        let lats: Vec<f64> = points.iter().map(|p| p.latitude).collect();
        let mut lngs: Vec<f64> = points.iter().map(|p| p.longitude).collect();
        lngs.push(99.0); // ignored extra

        let flat = cluster_flat(&lats, &lngs, 100.0);
        let full = cluster(&points, 100.0, 2);
        assert_eq!(flat.len(), full.len());
        assert_eq!(flat[0], full[0].member_indices);
    }

    #[test]
    fn test_members_resolve_against_input() {
        let points = tight_group("p", 0.0, 0.0, 2);
        let clusters = cluster(&points, 100.0, 2);
        let ids: Vec<&str> = clusters[0].members(&points).map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p-0", "p-1"]);
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let points: Vec<MapPoint> = (0..200)
            .map(|i| {
                let f = i as f64;
                MapPoint::new(i.to_string(), 51.5 + (f * 0.37).sin() * 0.01, -0.12 + (f * 0.91).cos() * 0.01)
            })
            .collect();
        let first = cluster(&points, 250.0, 2);
        let second = cluster(&points, 250.0, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_larger_radius_can_split_groups() {
        // Greedy grouping is order dependent: growing the radius lets the
        // first representative steal a point that anchored a second group.
        // Grid in 100m units near the equator.
        let grid = [(8.0, 5.0), (2.0, 4.0), (8.0, 2.0), (3.0, 0.0), (2.0, 8.0), (8.0, 0.0)];
        let points: Vec<MapPoint> = grid
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                MapPoint::new(i.to_string(), y * 100.0 / METERS_PER_DEGREE, x * 100.0 / METERS_PER_DEGREE)
            })
            .collect();

        let tight: Vec<Vec<usize>> = both_strategies(&points, 560.0)
            .into_iter()
            .map(|c| c.member_indices)
            .collect();
        assert_eq!(tight, vec![vec![0, 2, 5], vec![1, 3, 4]]);

        let loose: Vec<Vec<usize>> = both_strategies(&points, 620.0)
            .into_iter()
            .map(|c| c.member_indices)
            .collect();
        assert_eq!(loose, vec![vec![0, 1, 2, 5], vec![3], vec![4]]);
    }
}
