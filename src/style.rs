//! Count-based style tiers.
//!
//! A cluster's marker style is picked from an ordered list of tiers: the tier
//! with the largest `min_points` not exceeding the cluster's count wins.

use serde::{Deserialize, Serialize};

/// A style that applies from `min_points` members upwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleTier<S> {
    pub min_points: usize,
    pub style: S,
}

impl<S> StyleTier<S> {
    pub fn new(min_points: usize, style: S) -> Self {
        Self { min_points, style }
    }
}

/// Pick the style for a cluster of `count` points.
///
/// Tiers do not need to be sorted. When two tiers share the winning
/// `min_points`, the first listed wins. Falls back to `default` when no tier
/// qualifies.
///
/// ```rust
/// use marker_cluster::{resolve_style, StyleTier};
///
/// let tiers = vec![
///     StyleTier::new(2, "small"),
///     StyleTier::new(10, "medium"),
///     StyleTier::new(100, "large"),
/// ];
/// assert_eq!(*resolve_style(1, &tiers, &"single"), "single");
/// assert_eq!(*resolve_style(42, &tiers, &"single"), "medium");
/// ```
pub fn resolve_style<'a, S>(count: usize, tiers: &'a [StyleTier<S>], default: &'a S) -> &'a S {
    let mut best: Option<&StyleTier<S>> = None;
    for tier in tiers.iter().filter(|t| t.min_points <= count) {
        match best {
            Some(b) if b.min_points >= tier.min_points => {}
            _ => best = Some(tier),
        }
    }
    best.map(|t| &t.style).unwrap_or(default)
}

/// Owned tier list plus the fallback style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleTiers<S> {
    pub tiers: Vec<StyleTier<S>>,
    pub default: S,
}

impl<S> StyleTiers<S> {
    pub fn new(tiers: Vec<StyleTier<S>>, default: S) -> Self {
        Self { tiers, default }
    }

    /// Tiers that always resolve to `default`.
    pub fn single(default: S) -> Self {
        Self {
            tiers: Vec::new(),
            default,
        }
    }

    pub fn resolve(&self, count: usize) -> &S {
        resolve_style(count, &self.tiers, &self.default)
    }
}
