//! # Cluster Layer
//!
//! Stateful clustering instance that a map view owns for one marker layer.
//!
//! ## Architecture
//!
//! The layer owns its inputs (points, viewport, config, style tiers) and
//! replaces them wholesale on every update. Each update is sent as an
//! immutable snapshot to a dedicated worker thread, which debounces them and
//! runs one clustering pass at a time. Results come back over a channel and
//! are applied on the caller's thread by [`ClusterLayer::poll_update`]: that
//! is where styles are resolved and the live marker set is reconciled.
//!
//! Tearing the layer down flips an invalidated flag before the worker is
//! stopped, so a pass that finishes late is dropped instead of applied.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::clustering::{cluster_with_stats, ClusterResult, ClusterStats};
use crate::diff::{reconcile_with, ClusterDelta, RenderedCluster};
use crate::scheduler::UpdateScheduler;
use crate::style::StyleTiers;
use crate::{ClusterConfig, ClusterError, MapPoint, Result, Viewport};

// ============================================================================
// Core Types
// ============================================================================

/// Payload handed to the host when a cluster marker is activated.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ClusterPress {
    pub marker_id: u64,
    pub count: usize,
    pub latitude: f64,
    pub longitude: f64,
    pub payloads: Vec<serde_json::Value>,
}

/// Layer statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerStats {
    pub passes_applied: u64,
    pub stale_results_dropped: u64,
    pub live_markers: usize,
    pub last_input_count: usize,
    pub last_valid_count: usize,
    pub last_ground_radius: f64,
    pub last_pass_duration: Duration,
}

/// Everything one clustering pass needs, frozen at submission time.
struct Snapshot {
    generation: u64,
    points: Arc<Vec<MapPoint>>,
    viewport: Viewport,
    config: ClusterConfig,
}

enum Command {
    Recompute(Snapshot),
    SetWindow(Duration),
    Shutdown,
}

struct ClusterOutput {
    generation: u64,
    points: Arc<Vec<MapPoint>>,
    clusters: Vec<ClusterResult>,
    ground_radius: f64,
    stats: ClusterStats,
}

type PressListener = Box<dyn Fn(&ClusterPress) + Send>;

// ============================================================================
// Cluster Layer
// ============================================================================

/// One clustered marker layer.
///
/// `S` is the renderer's style type, resolved per cluster from
/// [`StyleTiers`] when a marker is first added.
pub struct ClusterLayer<S> {
    // Inputs, replaced wholesale
    points: Arc<Vec<MapPoint>>,
    viewport: Option<Viewport>,
    config: ClusterConfig,
    styles: StyleTiers<S>,
    // Bumped when every marker must be re-added on the next pass
    style_epoch: u64,

    // Worker
    commands: Sender<Command>,
    results: Receiver<ClusterOutput>,
    worker: Option<JoinHandle<()>>,
    invalidated: Arc<AtomicBool>,
    submitted_generation: u64,

    // Live renderer state
    live: Vec<Arc<RenderedCluster<S>>>,
    // Newest members of each live marker, indexing into `applied_points`
    live_members: HashMap<u64, ClusterResult>,
    applied_points: Arc<Vec<MapPoint>>,
    live_style_epoch: u64,
    applied_generation: u64,
    next_marker_id: u64,
    press_listener: Option<PressListener>,
    stats: LayerStats,
}

impl<S: Clone> ClusterLayer<S> {
    /// Create a layer and start its worker thread.
    pub fn new(config: ClusterConfig, styles: StyleTiers<S>) -> Result<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();
        let invalidated = Arc::new(AtomicBool::new(false));

        let worker_flag = Arc::clone(&invalidated);
        let window = config.debounce();
        let worker = thread::Builder::new()
            .name("marker-cluster-worker".to_string())
            .spawn(move || run_worker(command_rx, result_tx, worker_flag, window))
            .map_err(|e| ClusterError::WorkerUnavailable {
                message: e.to_string(),
            })?;

        info!(
            "[ClusterLayer] Created (radius {}px, debounce {}ms)",
            config.pixel_radius, config.debounce_ms
        );

        Ok(Self {
            points: Arc::new(Vec::new()),
            viewport: None,
            config,
            styles,
            style_epoch: 0,
            commands: command_tx,
            results: result_rx,
            worker: Some(worker),
            invalidated,
            submitted_generation: 0,
            live: Vec::new(),
            live_members: HashMap::new(),
            applied_points: Arc::new(Vec::new()),
            live_style_epoch: 0,
            applied_generation: 0,
            next_marker_id: 0,
            press_listener: None,
            stats: LayerStats::default(),
        })
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Replace the point set.
    pub fn set_points(&mut self, points: Vec<MapPoint>) -> Result<()> {
        self.ensure_alive()?;
        debug!("[ClusterLayer] Replacing {} points", points.len());
        self.points = Arc::new(points);
        self.refresh()
    }

    /// Record a camera change.
    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.ensure_alive()?;
        self.viewport = Some(viewport);
        self.refresh()
    }

    /// Replace the configuration.
    ///
    /// Changing `min_cluster_size` re-adds every marker on the next pass,
    /// since kept markers would carry stale `is_cluster` flags.
    pub fn set_config(&mut self, config: ClusterConfig) -> Result<()> {
        self.ensure_alive()?;
        config.validate()?;
        if config.debounce_ms != self.config.debounce_ms {
            self.send(Command::SetWindow(config.debounce()))?;
        }
        if config.min_cluster_size != self.config.min_cluster_size {
            self.style_epoch += 1;
        }
        self.config = config;
        self.refresh()
    }

    /// Replace the style tiers. The next applied pass re-adds every marker so
    /// existing ones pick up the new styles.
    pub fn set_style_tiers(&mut self, styles: StyleTiers<S>) -> Result<()> {
        self.ensure_alive()?;
        self.styles = styles;
        self.style_epoch += 1;
        self.refresh()
    }

    /// Schedule a pass with the current inputs.
    ///
    /// Does nothing until a viewport is known, since the ground radius
    /// depends on it.
    pub fn refresh(&mut self) -> Result<()> {
        self.ensure_alive()?;
        let Some(viewport) = self.viewport else {
            debug!("[ClusterLayer] No viewport yet, deferring recompute");
            return Ok(());
        };
        self.submitted_generation += 1;
        let snapshot = Snapshot {
            generation: self.submitted_generation,
            points: Arc::clone(&self.points),
            viewport,
            config: self.config.clone(),
        };
        self.send(Command::Recompute(snapshot))
    }

    // ========================================================================
    // Applying Results (caller's thread)
    // ========================================================================

    /// Apply the newest finished pass, if any, without blocking.
    pub fn poll_update(&mut self) -> Option<ClusterDelta<S>> {
        let latest = self.drain_results(None);
        latest.and_then(|output| self.apply(output))
    }

    /// Block up to `timeout` for a finished pass, then apply the newest one.
    pub fn wait_update(&mut self, timeout: Duration) -> Option<ClusterDelta<S>> {
        if self.is_shut_down() {
            return None;
        }
        let first = match self.results.recv_timeout(timeout) {
            Ok(output) => output,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("[ClusterLayer] Worker exited");
                return None;
            }
        };
        let latest = self.drain_results(Some(first));
        latest.and_then(|output| self.apply(output))
    }

    fn drain_results(&mut self, mut latest: Option<ClusterOutput>) -> Option<ClusterOutput> {
        while let Ok(output) = self.results.try_recv() {
            if latest.is_some() {
                self.stats.stale_results_dropped += 1;
            }
            latest = Some(output);
        }
        latest
    }

    fn apply(&mut self, output: ClusterOutput) -> Option<ClusterDelta<S>> {
        if self.invalidated.load(Ordering::Acquire) {
            debug!("[ClusterLayer] Dropping pass {} after teardown", output.generation);
            return None;
        }
        if output.generation <= self.applied_generation {
            self.stats.stale_results_dropped += 1;
            return None;
        }

        let restyle = self.live_style_epoch != self.style_epoch;
        let previous: &[Arc<RenderedCluster<S>>] = if restyle { &[] } else { &self.live };
        let styles = &self.styles;
        let next_marker_id = &mut self.next_marker_id;
        let source = &output.points;
        let mut members = HashMap::with_capacity(output.clusters.len());

        let mut delta = reconcile_with(
            previous,
            output.clusters,
            |identity, cluster| {
                *next_marker_id += 1;
                RenderedCluster {
                    marker_id: *next_marker_id,
                    identity,
                    style: styles.resolve(cluster.count).clone(),
                    cluster,
                    source: Arc::clone(source),
                }
            },
            |kept, cluster| {
                members.insert(kept.marker_id, cluster);
            },
        );
        if restyle {
            delta.to_remove = std::mem::take(&mut self.live);
        }
        for added in &delta.to_add {
            members.insert(added.marker_id, added.cluster.clone());
        }

        self.live = delta.live();
        self.live_members = members;
        self.applied_points = output.points;
        self.live_style_epoch = self.style_epoch;
        self.applied_generation = output.generation;

        self.stats.passes_applied += 1;
        self.stats.live_markers = self.live.len();
        self.stats.last_input_count = output.stats.input_count;
        self.stats.last_valid_count = output.stats.valid_count;
        self.stats.last_ground_radius = output.ground_radius;
        self.stats.last_pass_duration = output.stats.elapsed;

        debug!(
            "[ClusterLayer] Pass {}: +{} -{} ={}",
            output.generation,
            delta.to_add.len(),
            delta.to_remove.len(),
            delta.to_keep.len()
        );
        Some(delta)
    }

    // ========================================================================
    // Marker Interaction
    // ========================================================================

    /// Register a callback invoked on every [`ClusterLayer::press`].
    pub fn set_press_listener<F>(&mut self, listener: F)
    where
        F: Fn(&ClusterPress) + Send + 'static,
    {
        self.press_listener = Some(Box::new(listener));
    }

    /// Handle activation of a live marker. Returns `None` for unknown ids.
    ///
    /// Payloads come from the point set of the last applied pass, so a kept
    /// marker reports its members' current payloads.
    pub fn press(&self, marker_id: u64) -> Option<ClusterPress> {
        let cluster = self.live_members.get(&marker_id)?;
        let coord = cluster.coord();
        let press = ClusterPress {
            marker_id,
            count: cluster.count,
            latitude: coord.latitude,
            longitude: coord.longitude,
            payloads: cluster
                .members(&self.applied_points)
                .map(|p| p.payload.clone())
                .collect(),
        };
        if let Some(listener) = &self.press_listener {
            listener(&press);
        }
        Some(press)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Markers currently on screen, as of the last applied pass.
    pub fn live(&self) -> &[Arc<RenderedCluster<S>>] {
        &self.live
    }

    pub fn points(&self) -> &Arc<Vec<MapPoint>> {
        &self.points
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn stats(&self) -> LayerStats {
        self.stats
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Whether [`ClusterLayer::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    /// Invalidate pending and in-flight passes and stop the worker.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.invalidated.swap(true, Ordering::AcqRel) {
            return;
        }
        // The worker may already be gone; nothing to report either way
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("[ClusterLayer] Worker panicked during shutdown");
            }
        }
        info!("[ClusterLayer] Shut down with {} live markers", self.live.len());
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(ClusterError::LayerShutDown)
        } else {
            Ok(())
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ClusterError::WorkerUnavailable {
                message: "worker channel closed".to_string(),
            })
    }
}

impl<S> Drop for ClusterLayer<S> {
    fn drop(&mut self) {
        if self.invalidated.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl<S> fmt::Debug for ClusterLayer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterLayer")
            .field("points", &self.points.len())
            .field("viewport", &self.viewport)
            .field("config", &self.config)
            .field("live", &self.live.len())
            .field("shut_down", &self.invalidated.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// Worker
// ============================================================================

fn run_worker(
    commands: Receiver<Command>,
    results: Sender<ClusterOutput>,
    invalidated: Arc<AtomicBool>,
    window: Duration,
) {
    let mut scheduler: UpdateScheduler<Snapshot> = UpdateScheduler::new(window);

    loop {
        let received = match scheduler.time_until_due() {
            Some(wait) => match commands.recv_timeout(wait) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        // Coalesce everything already queued before deciding to compute
        let mut shutdown = false;
        for command in received.into_iter().chain(std::iter::from_fn(|| commands.try_recv().ok())) {
            match command {
                Command::Recompute(snapshot) => {
                    scheduler.schedule(snapshot);
                }
                Command::SetWindow(window) => scheduler.set_window(window),
                Command::Shutdown => {
                    shutdown = true;
                    break;
                }
            }
        }
        if shutdown || invalidated.load(Ordering::Acquire) {
            scheduler.cancel();
            break;
        }

        if let Some(snapshot) = scheduler.poll() {
            let output = compute(snapshot);
            if invalidated.load(Ordering::Acquire) {
                break;
            }
            if results.send(output).is_err() {
                break;
            }
        }
    }

    debug!(
        "[ClusterLayer] Worker stopped ({} triggers coalesced)",
        scheduler.coalesced_count()
    );
}

/// One clustering pass over a snapshot.
fn compute(snapshot: Snapshot) -> ClusterOutput {
    let config = &snapshot.config;
    let ground_radius = snapshot.viewport.ground_radius(config.pixel_radius);
    let min_cluster_size = config.min_cluster_size as usize;

    let (clusters, stats) = if config.viewport_padding_ratio > 0.0 {
        let bounds = snapshot.viewport.padded_bounds(config.viewport_padding_ratio);
        let visible: Vec<usize> = snapshot
            .points
            .iter()
            .enumerate()
            .filter(|(_, p)| bounds.contains(&p.coord()))
            .map(|(i, _)| i)
            .collect();
        let subset: Vec<MapPoint> = visible.iter().map(|&i| snapshot.points[i].clone()).collect();

        let (mut clusters, mut stats) =
            cluster_with_stats(&subset, ground_radius, min_cluster_size, config.strategy);
        // Member indices refer to the full point set, not the visible subset
        for cluster in &mut clusters {
            for idx in &mut cluster.member_indices {
                *idx = visible[*idx];
            }
        }
        stats.input_count = snapshot.points.len();
        (clusters, stats)
    } else {
        cluster_with_stats(&snapshot.points, ground_radius, min_cluster_size, config.strategy)
    };

    ClusterOutput {
        generation: snapshot.generation,
        points: snapshot.points,
        clusters,
        ground_radius,
        stats,
    }
}

// ============================================================================
// Tests
// ============================================================================
