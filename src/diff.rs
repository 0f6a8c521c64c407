//! Identity-preserving diff between consecutive cluster passes.
//!
//! Every pass produces fresh [`ClusterResult`] values. Host map toolkits need
//! on-screen marker objects to stay the same object when nothing about them
//! changed, so clusters are keyed by a value identity (rounded position plus
//! count) and matched against the live set. Matches keep the *previous*
//! `Arc`; only genuinely new clusters are materialized.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use crate::{ClusterResult, MapPoint};

/// Decimal places kept when keying cluster positions.
const IDENTITY_SCALE: f64 = 1e6;

/// Value identity of a cluster: `(round(lat, 6), round(lng, 6), count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClusterIdentity {
    pub lat_e6: i64,
    pub lng_e6: i64,
    pub count: usize,
}

impl ClusterIdentity {
    pub fn new(latitude: f64, longitude: f64, count: usize) -> Self {
        Self {
            lat_e6: (latitude * IDENTITY_SCALE).round() as i64,
            lng_e6: (longitude * IDENTITY_SCALE).round() as i64,
            count,
        }
    }

    /// Identity of a cluster, keyed on its representative point.
    pub fn of(cluster: &ClusterResult) -> Self {
        Self::new(
            cluster.representative.latitude,
            cluster.representative.longitude,
            cluster.count,
        )
    }
}

/// A cluster as it lives on screen.
#[derive(Debug, Clone)]
pub struct RenderedCluster<S> {
    /// Stable handle the renderer keys its native marker on.
    pub marker_id: u64,
    pub identity: ClusterIdentity,
    pub cluster: ClusterResult,
    pub style: S,
    /// Point set that `cluster.member_indices` index into, as of the pass
    /// that created this marker.
    pub source: Arc<Vec<MapPoint>>,
}

impl<S> RenderedCluster<S> {
    /// Member points of this cluster.
    pub fn members(&self) -> impl Iterator<Item = &MapPoint> {
        self.cluster.members(&self.source)
    }
}

/// What the renderer must do to move from the previous set to the next one.
#[derive(Debug)]
pub struct ClusterDelta<S> {
    pub to_add: Vec<Arc<RenderedCluster<S>>>,
    pub to_remove: Vec<Arc<RenderedCluster<S>>>,
    /// Previous live objects that survive unchanged.
    pub to_keep: Vec<Arc<RenderedCluster<S>>>,
}

impl<S> ClusterDelta<S> {
    /// True when the renderer has nothing to add or remove.
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// The live set after applying this delta: kept markers then added ones.
    pub fn live(&self) -> Vec<Arc<RenderedCluster<S>>> {
        self.to_keep
            .iter()
            .chain(self.to_add.iter())
            .cloned()
            .collect()
    }
}

impl<S> Default for ClusterDelta<S> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_remove: Vec::new(),
            to_keep: Vec::new(),
        }
    }
}

/// Diff `next` against the `previous` live set.
///
/// Identities are matched as a multiset: if two previous clusters share an
/// identity, up to two next clusters with that identity are kept. Unmatched
/// next clusters go through `materialize` and land in `to_add`; unmatched
/// previous ones land in `to_remove`. `to_keep` holds clones of the previous
/// `Arc`s, never new allocations.
pub fn reconcile<S, F>(
    previous: &[Arc<RenderedCluster<S>>],
    next: Vec<ClusterResult>,
    materialize: F,
) -> ClusterDelta<S>
where
    F: FnMut(ClusterIdentity, ClusterResult) -> RenderedCluster<S>,
{
    reconcile_with(previous, next, materialize, |_, _| {})
}

/// [`reconcile`], also handing each kept marker the next-pass cluster it was
/// matched with.
///
/// Kept markers hold the result of the pass that first created them. Callers
/// that need current member lists (the point set may have been replaced with
/// the same positions) record them from `on_keep`.
pub fn reconcile_with<S, F, K>(
    previous: &[Arc<RenderedCluster<S>>],
    next: Vec<ClusterResult>,
    mut materialize: F,
    mut on_keep: K,
) -> ClusterDelta<S>
where
    F: FnMut(ClusterIdentity, ClusterResult) -> RenderedCluster<S>,
    K: FnMut(&Arc<RenderedCluster<S>>, ClusterResult),
{
    let mut available: HashMap<ClusterIdentity, VecDeque<usize>> = HashMap::new();
    for (i, rendered) in previous.iter().enumerate() {
        available.entry(rendered.identity).or_default().push_back(i);
    }

    let mut matched = vec![false; previous.len()];
    let mut delta = ClusterDelta::default();

    for cluster in next {
        let identity = ClusterIdentity::of(&cluster);
        let hit = available.get_mut(&identity).and_then(VecDeque::pop_front);
        match hit {
            Some(i) => {
                matched[i] = true;
                on_keep(&previous[i], cluster);
                delta.to_keep.push(Arc::clone(&previous[i]));
            }
            None => delta.to_add.push(Arc::new(materialize(identity, cluster))),
        }
    }

    delta.to_remove = previous
        .iter()
        .zip(&matched)
        .filter(|(_, &m)| !m)
        .map(|(rendered, _)| Arc::clone(rendered))
        .collect();

    delta
}
