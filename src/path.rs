//! Nearest point on a polyline.
//!
//! When a moving marker receives a new path, it should continue from the
//! point of the new path closest to where it currently is rather than
//! jumping back to the first vertex.

use geo::{Distance, Euclidean, Line, Point};
use serde::Serialize;

use crate::geo_utils::{closest_on_segment, LocalFrame};
use crate::GeoPoint;

/// Where a target projects onto a path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PathProjection {
    /// Index of the segment start vertex (`path[i]`-`path[i + 1]`).
    pub segment_index: u32,
    /// Closest point, on that segment.
    pub projected: GeoPoint,
    /// Distance from the target to `projected` in meters.
    pub distance: f64,
}

/// Project `target` onto every segment of `path` and return the closest hit.
///
/// Projections are clamped to segment endpoints. On ties the earliest segment
/// wins. Returns `None` for paths with fewer than two points.
///
/// ```rust
/// use marker_cluster::{nearest_point_on_path, GeoPoint};
///
/// let path = vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)];
/// let hit = nearest_point_on_path(&path, &GeoPoint::new(0.0001, 0.005)).unwrap();
/// assert_eq!(hit.segment_index, 0);
/// assert!((hit.projected.longitude - 0.005).abs() < 1e-9);
/// ```
pub fn nearest_point_on_path(path: &[GeoPoint], target: &GeoPoint) -> Option<PathProjection> {
    if path.len() < 2 {
        return None;
    }

    // The target sits at the frame origin
    let frame = LocalFrame::new(*target);
    let origin = Point::new(0.0, 0.0);
    let mut best: Option<(usize, Line<f64>, Point<f64>, f64)> = None;

    for (i, pair) in path.windows(2).enumerate() {
        let segment = Line::new(frame.to_local(&pair[0]), frame.to_local(&pair[1]));
        let closest = closest_on_segment(&segment, origin);
        let distance = Euclidean::distance(origin, closest);
        if !distance.is_finite() {
            continue;
        }
        if best.map_or(true, |(_, _, _, best_distance)| distance < best_distance) {
            best = Some((i, segment, closest, distance));
        }
    }

    best.map(|(i, segment, closest, distance)| {
        // Clamped projections are the vertex itself, not a round trip of it
        let projected = if closest.0 == segment.start {
            path[i]
        } else if closest.0 == segment.end {
            path[i + 1]
        } else {
            frame.to_geo(closest.0)
        };
        PathProjection {
            segment_index: i as u32,
            projected,
            distance,
        }
    })
}

/// The path a marker at `current` should follow: the projected point, then
/// every vertex after the projected segment.
///
/// Falls back to the unmodified path when no projection exists.
pub fn resume_path(path: &[GeoPoint], current: &GeoPoint) -> Vec<GeoPoint> {
    let Some(hit) = nearest_point_on_path(path, current) else {
        return path.to_vec();
    };
    let rest = &path[hit.segment_index as usize + 1..];

    let mut resumed = Vec::with_capacity(rest.len() + 1);
    resumed.push(hit.projected);
    // Skip the next vertex when the projection landed on it
    let skip = usize::from(rest.first() == Some(&hit.projected));
    resumed.extend_from_slice(&rest[skip..]);
    resumed
}
