//! Cluster layer integration tests.
//!
//! Drives a layer the way a map view does: camera moves, data reloads,
//! restyles and teardown, applying each pass on the test thread.
//!
//! Run with: `cargo test --test layer_lifecycle -- --nocapture`
//! (set `RUST_LOG=debug` to see the layer's log output)

use std::sync::Arc;
use std::time::{Duration, Instant};

use marker_cluster::{
    Bounds, ClusterConfig, ClusterDelta, ClusterError, ClusterLayer, MapPoint, StyleTier,
    StyleTiers, Viewport,
};

const WAIT: Duration = Duration::from_secs(10);

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tiers() -> StyleTiers<String> {
    StyleTiers::new(
        vec![
            StyleTier::new(2, "small".to_string()),
            StyleTier::new(20, "large".to_string()),
        ],
        "pin".to_string(),
    )
}

fn viewport_at_zoom(zoom: f64) -> Viewport {
    Viewport::from_zoom_level(
        Bounds {
            min_lat: 51.40,
            max_lat: 51.60,
            min_lng: -0.30,
            max_lng: 0.05,
        },
        zoom,
    )
}

/// `groups` tight groups of `per_group` points, ~1km apart on a diagonal.
fn grid(groups: usize, per_group: usize) -> Vec<MapPoint> {
    (0..groups)
        .flat_map(|g| {
            (0..per_group).map(move |i| {
                MapPoint::new(
                    format!("g{}-{}", g, i),
                    51.45 + g as f64 * 0.01 + i as f64 * 0.00001,
                    -0.25 + g as f64 * 0.01,
                )
                .with_payload(serde_json::json!({ "group": g, "index": i }))
            })
        })
        .collect()
}

fn layer(debounce_ms: u64) -> ClusterLayer<String> {
    init_logging();
    let config = ClusterConfig {
        debounce_ms,
        ..ClusterConfig::default()
    };
    ClusterLayer::new(config, tiers()).expect("layer should start")
}

/// Block until a pass has been applied, returning its delta.
fn next_delta(layer: &mut ClusterLayer<String>) -> ClusterDelta<String> {
    layer.wait_update(WAIT).expect("pass should complete in time")
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn camera_move_keeps_unchanged_markers() {
    let mut layer = layer(0);
    layer.set_points(grid(5, 3)).unwrap();
    layer.set_viewport(viewport_at_zoom(15.0)).unwrap();

    let first = next_delta(&mut layer);
    assert_eq!(first.to_add.len(), 5);
    assert!(first.to_add.iter().all(|r| r.style == "small"));
    let before: Vec<_> = layer.live().to_vec();

    // Small zoom change: groups still well separated, still intact
    layer.set_viewport(viewport_at_zoom(14.5)).unwrap();
    let second = next_delta(&mut layer);
    assert!(second.is_noop());
    assert_eq!(second.to_keep.len(), 5);
    for kept in &second.to_keep {
        assert!(before.iter().any(|b| Arc::ptr_eq(b, kept)));
    }
}

#[test]
fn zooming_out_merges_groups() {
    let mut layer = layer(0);
    layer.set_points(grid(5, 3)).unwrap();
    layer.set_viewport(viewport_at_zoom(15.0)).unwrap();
    next_delta(&mut layer);

    // At zoom 8, 40px is several kilometers
    layer.set_viewport(viewport_at_zoom(8.0)).unwrap();
    let delta = next_delta(&mut layer);

    assert_eq!(delta.to_remove.len(), 5);
    assert_eq!(layer.live().len(), 1);
    let merged = &layer.live()[0];
    assert_eq!(merged.cluster.count, 15);
    assert_eq!(merged.style, "small");

    let press = layer.press(merged.marker_id).unwrap();
    assert_eq!(press.payloads.len(), 15);
    assert_eq!(press.payloads[0], serde_json::json!({ "group": 0, "index": 0 }));
}

#[test]
fn burst_of_updates_is_coalesced() {
    let mut layer = layer(150);
    layer.set_points(grid(3, 2)).unwrap();
    for step in 0..20 {
        layer
            .set_viewport(viewport_at_zoom(10.0 + step as f64 * 0.25))
            .unwrap();
    }

    let started = Instant::now();
    let delta = next_delta(&mut layer);
    assert!(started.elapsed() >= Duration::from_millis(100));
    // Only the last camera position was clustered (zoom 14.75: groups apart)
    assert_eq!(delta.to_add.len(), 3);
    assert_eq!(layer.stats().passes_applied, 1);

    assert!(layer.wait_update(Duration::from_millis(400)).is_none());
}

#[test]
fn data_reload_replaces_markers() {
    let mut layer = layer(0);
    layer.set_viewport(viewport_at_zoom(15.0)).unwrap();
    layer.set_points(grid(2, 25)).unwrap();

    // Viewport and points may land in one pass or two
    while layer.live().len() != 2 {
        next_delta(&mut layer);
    }
    assert!(layer.live().iter().all(|r| r.style == "large"));

    layer.set_points(Vec::new()).unwrap();
    let delta = next_delta(&mut layer);
    assert_eq!(delta.to_remove.len(), 2);
    assert!(layer.live().is_empty());
}

#[test]
fn shutdown_is_prompt_and_final() {
    let mut layer = layer(60_000);
    layer.set_points(grid(3, 2)).unwrap();
    layer.set_viewport(viewport_at_zoom(15.0)).unwrap();

    let started = Instant::now();
    layer.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(layer.poll_update().is_none());
    assert_eq!(layer.refresh(), Err(ClusterError::LayerShutDown));
}

#[test]
fn independent_layers_do_not_interfere() {
    let mut fast = layer(0);
    let mut slow = layer(60_000);

    for target in [&mut fast, &mut slow] {
        target.set_points(grid(2, 2)).unwrap();
        target.set_viewport(viewport_at_zoom(15.0)).unwrap();
    }

    while fast.live().len() != 2 {
        next_delta(&mut fast);
    }
    assert!(slow.poll_update().is_none());
    assert!(slow.live().is_empty());
}

#[test]
fn restyle_replaces_every_marker() {
    let mut layer = layer(0);
    layer.set_points(grid(3, 2)).unwrap();
    layer.set_viewport(viewport_at_zoom(15.0)).unwrap();
    next_delta(&mut layer);
    let old_ids: Vec<u64> = layer.live().iter().map(|r| r.marker_id).collect();

    layer
        .set_style_tiers(StyleTiers::single("dot".to_string()))
        .unwrap();
    let delta = next_delta(&mut layer);

    assert_eq!(delta.to_remove.len(), 3);
    assert_eq!(delta.to_add.len(), 3);
    assert!(delta.to_keep.is_empty());
    assert!(layer
        .live()
        .iter()
        .all(|r| r.style == "dot" && !old_ids.contains(&r.marker_id)));
}
