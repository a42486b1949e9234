//! Node ranking kernel
//!
//! Scoring policies produce a [`ScoredNodeSet`] per scheduling cycle; the
//! kernel picks one node from the highest-scoring bucket, breaking ties
//! uniformly at random so equally good nodes share load over many cycles.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::node::NodeHandle;

/// Candidates grouped by score, higher is better.
///
/// Buckets keep insertion order. NaN scores are rejected on insert, and
/// `-0.0` shares a bucket with `0.0`.
#[derive(Clone, Debug)]
pub struct ScoredNodeSet<N = NodeHandle> {
    buckets: Vec<(f64, Vec<N>)>,
}

impl<N> Default for ScoredNodeSet<N> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }
}

impl<N> ScoredNodeSet<N> {
    /// An empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate under `score`. Returns false if the score is NaN.
    pub fn insert(&mut self, score: f64, node: N) -> bool {
        if score.is_nan() {
            return false;
        }
        let score = if score == 0.0 { 0.0 } else { score };
        match self.buckets.iter_mut().find(|(s, _)| *s == score) {
            Some((_, nodes)) => nodes.push(node),
            None => self.buckets.push((score, vec![node])),
        }
        true
    }

    /// Number of distinct scores
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True if no candidate was inserted
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// The highest score and the candidates tied at it
    pub fn best_bucket(&self) -> Option<(f64, &[N])> {
        self.buckets
            .iter()
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(score, nodes)| (*score, nodes.as_slice()))
    }
}

impl<N> FromIterator<(f64, N)> for ScoredNodeSet<N> {
    fn from_iter<I: IntoIterator<Item = (f64, N)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (score, node) in iter {
            set.insert(score, node);
        }
        set
    }
}

/// Pick one node from the top-scoring bucket using `rng`.
///
/// Returns `None` for an empty set; callers treat that as "no eligible node".
pub fn select_best_node_with<N: Clone, R: Rng + ?Sized>(
    set: &ScoredNodeSet<N>,
    rng: &mut R,
) -> Option<N> {
    let (_, tied) = set.best_bucket()?;
    tied.choose(rng).cloned()
}

/// Pick one node from the top-scoring bucket using the thread-local RNG
pub fn select_best_node<N: Clone>(set: &ScoredNodeSet<N>) -> Option<N> {
    select_best_node_with(set, &mut rand::thread_rng())
}

/// Ranking kernel that owns its random source
#[derive(Debug)]
pub struct NodeRanker<R = StdRng> {
    rng: R,
}

impl NodeRanker<StdRng> {
    /// Deterministic ranker for reproducible placement
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Ranker seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl<R: Rng> NodeRanker<R> {
    /// Use an existing random source
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// See [`select_best_node_with`]
    pub fn select<N: Clone>(&mut self, set: &ScoredNodeSet<N>) -> Option<N> {
        select_best_node_with(set, &mut self.rng)
    }
}
