//! Brute-force Hamming matching with cross-check into a fixed-capacity buffer.

use super::brief::{hamming_distance, Descriptor};

/// Upper bound on retained correspondences per frame.
pub const MATCH_CAPACITY: usize = 64;

/// One correspondence between a query (reference) and a train (current) feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureMatch {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

/// The best matches sorted by ascending distance, without heap allocation.
#[derive(Debug, Clone)]
pub struct MatchSet {
    entries: [FeatureMatch; MATCH_CAPACITY],
    len: usize,
    keep: usize,
}

impl MatchSet {
    /// Empty set retaining at most `keep` matches (clamped to capacity).
    pub fn with_limit(keep: usize) -> Self {
        Self {
            entries: [FeatureMatch::default(); MATCH_CAPACITY],
            len: 0,
            keep: keep.min(MATCH_CAPACITY),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[FeatureMatch] {
        &self.entries[..self.len]
    }

    /// Insert keeping ascending distance; equal distances keep insertion order.
    pub fn insert(&mut self, m: FeatureMatch) {
        if self.keep == 0 {
            return;
        }
        if self.len == self.keep && m.distance >= self.entries[self.len - 1].distance {
            return;
        }
        let pos = self.as_slice().partition_point(|e| e.distance <= m.distance);
        let end = if self.len < self.keep {
            self.len += 1;
            self.len - 1
        } else {
            self.len - 1
        };
        let mut i = end;
        while i > pos {
            self.entries[i] = self.entries[i - 1];
            i -= 1;
        }
        self.entries[pos] = m;
    }
}

fn nearest(desc: &Descriptor, candidates: &[Descriptor]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, c) in candidates.iter().enumerate() {
        let d = hamming_distance(desc, c);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best
}

/// Mutual nearest neighbours between `query` and `train`, best `keep` retained.
pub fn match_cross_checked(query: &[Descriptor], train: &[Descriptor], keep: usize) -> MatchSet {
    let mut set = MatchSet::with_limit(keep);
    if query.is_empty() || train.is_empty() {
        return set;
    }
    let reverse: Vec<Option<usize>> = train
        .iter()
        .map(|t| nearest(t, query).map(|(qi, _)| qi))
        .collect();
    for (qi, q) in query.iter().enumerate() {
        let Some((ti, distance)) = nearest(q, train) else {
            continue;
        };
        if reverse[ti] == Some(qi) {
            set.insert(FeatureMatch {
                query: qi,
                train: ti,
                distance,
            });
        }
    }
    set
}
