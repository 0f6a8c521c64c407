//! Ramer–Douglas–Peucker polyline simplification with a tolerance in meters.
//!
//! Perpendicular distances are measured in a local equirectangular frame
//! anchored at each span's first point, so the tolerance means the same thing
//! at any latitude. The first and last input points are always kept.

use geo::{Distance, Euclidean, Line, Point};
use log::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::geo_utils::{closest_on_segment, LocalFrame};
use crate::{GeoPoint, MapPoint};

/// Simplify a polyline, keeping every point that deviates more than
/// `tolerance_meters` from the simplified shape.
///
/// A tolerance of zero (or negative, or NaN) returns the input unchanged,
/// including any repeated points.
///
/// ```rust
/// use marker_cluster::{simplify, GeoPoint};
///
/// let line: Vec<GeoPoint> = (0..100)
///     .map(|i| GeoPoint::new(0.0, i as f64 * 0.0001))
///     .collect();
/// let simplified = simplify(&line, 1.0);
/// assert_eq!(simplified, vec![line[0], line[99]]);
/// ```
pub fn simplify(points: &[GeoPoint], tolerance_meters: f64) -> Vec<GeoPoint> {
    simplify_indices(points, tolerance_meters)
        .into_iter()
        .map(|i| points[i])
        .collect()
}

/// Simplify [`MapPoint`]s, carrying ids and payloads of the kept points.
pub fn simplify_map_points(points: &[MapPoint], tolerance_meters: f64) -> Vec<MapPoint> {
    let coords: Vec<GeoPoint> = points.iter().map(MapPoint::coord).collect();
    simplify_indices(&coords, tolerance_meters)
        .into_iter()
        .map(|i| points[i].clone())
        .collect()
}

/// Indices of the points [`simplify`] keeps, ascending.
pub fn simplify_indices(points: &[GeoPoint], tolerance_meters: f64) -> Vec<usize> {
    let n = points.len();
    if n <= 2 || !(tolerance_meters > 0.0) {
        return (0..n).collect();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    // Explicit stack instead of recursion: long tracks can be very deep
    let mut spans = vec![(0usize, n - 1)];
    while let Some((start, end)) = spans.pop() {
        if end <= start + 1 {
            continue;
        }
        let (max_index, max_distance) = farthest_from_chord(points, start, end);
        if max_distance > tolerance_meters {
            keep[max_index] = true;
            spans.push((max_index, end));
            spans.push((start, max_index));
        }
    }

    let kept: Vec<usize> = (0..n).filter(|&i| keep[i]).collect();
    debug!(
        "[Simplify] {} -> {} points at {:.1}m tolerance",
        n,
        kept.len(),
        tolerance_meters
    );
    kept
}

/// Simplify many polylines at once, in parallel when the `parallel` feature
/// is enabled.
#[cfg(feature = "parallel")]
pub fn simplify_many(tracks: &[Vec<GeoPoint>], tolerance_meters: f64) -> Vec<Vec<GeoPoint>> {
    tracks
        .par_iter()
        .map(|track| simplify(track, tolerance_meters))
        .collect()
}

/// Simplify many polylines at once, in parallel when the `parallel` feature
/// is enabled.
#[cfg(not(feature = "parallel"))]
pub fn simplify_many(tracks: &[Vec<GeoPoint>], tolerance_meters: f64) -> Vec<Vec<GeoPoint>> {
    tracks
        .iter()
        .map(|track| simplify(track, tolerance_meters))
        .collect()
}

/// Interior point farthest from the chord `start`-`end`, with its distance
/// in meters. First maximum wins.
fn farthest_from_chord(points: &[GeoPoint], start: usize, end: usize) -> (usize, f64) {
    let frame = LocalFrame::spanning(&points[start], &points[end]);
    let chord = Line::new(frame.to_local(&points[start]), frame.to_local(&points[end]));

    let mut max_index = start;
    let mut max_distance = 0.0;
    for (offset, p) in points[start + 1..end].iter().enumerate() {
        let local = Point::from(frame.to_local(p));
        let d = Euclidean::distance(local, closest_on_segment(&chord, local));
        if d > max_distance {
            max_distance = d;
            max_index = start + 1 + offset;
        }
    }
    (max_index, max_distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::METERS_PER_DEGREE;

    /// Eastward line with a straight-sided tent peaking `bump_m` meters north
    /// at index `at`, flat again from `2 * at` onwards.
    fn line_with_bump(n: usize, at: usize, bump_m: f64) -> Vec<GeoPoint> {
        (0..n)
            .map(|i| {
                let rise = (1.0 - (i as f64 - at as f64).abs() / at as f64).max(0.0);
                GeoPoint::new(bump_m * rise / METERS_PER_DEGREE, i as f64 * 0.0001)
            })
            .collect()
    }

    #[test]
    fn test_small_inputs_unchanged() {
        assert!(simplify(&[], 5.0).is_empty());
        let one = vec![GeoPoint::new(1.0, 1.0)];
        assert_eq!(simplify(&one, 5.0), one);
        let two = vec![GeoPoint::new(1.0, 1.0), GeoPoint::new(1.0, 1.0)];
        assert_eq!(simplify(&two, 5.0), two);
    }

    #[test]
    fn test_zero_tolerance_returns_input() {
        let mut line = line_with_bump(10, 4, 0.0);
        line.insert(3, line[3]); // exact duplicate survives
        assert_eq!(simplify(&line, 0.0), line);
        assert_eq!(simplify(&line, -1.0), line);
        assert_eq!(simplify(&line, f64::NAN), line);
    }

    #[test]
    fn test_bump_kept_above_tolerance() {
        let line = line_with_bump(21, 10, 25.0);
        let simplified = simplify_indices(&line, 10.0);
        assert_eq!(simplified, vec![0, 10, 20]);

        let flattened = simplify_indices(&line, 30.0);
        assert_eq!(flattened, vec![0, 20]);
    }

    #[test]
    fn test_endpoints_always_present() {
        let line = line_with_bump(50, 25, 3.0);
        for tolerance in [0.5, 2.0, 10.0, 1e9, f64::INFINITY] {
            let out = simplify(&line, tolerance);
            assert_eq!(out.first(), line.first());
            assert_eq!(out.last(), line.last());
            assert!(out.len() <= line.len());
        }
    }

    #[test]
    fn test_closed_loop_keeps_shape() {
        // Square loop ~111m a side, ending where it started
        let square = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.001),
            GeoPoint::new(0.001, 0.001),
            GeoPoint::new(0.001, 0.0),
            GeoPoint::new(0.0, 0.0),
        ];
        let out = simplify(&square, 10.0);
        assert!(out.len() >= 4, "loop collapsed to {:?}", out);
    }

    #[test]
    fn test_map_points_keep_payloads() {
        let points: Vec<MapPoint> = line_with_bump(5, 2, 50.0)
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                MapPoint::new(i.to_string(), p.latitude, p.longitude)
                    .with_payload(serde_json::json!(i))
            })
            .collect();
        let out = simplify_map_points(&points, 10.0);
        let ids: Vec<&str> = out.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "2", "4"]);
        assert_eq!(out[1].payload, serde_json::json!(2));
    }

    #[test]
    fn test_simplify_many() {
        let tracks = vec![line_with_bump(21, 10, 25.0), line_with_bump(5, 2, 1.0)];
        let out = simplify_many(&tracks, 10.0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 3);
        assert_eq!(out[1].len(), 2);
    }
}
