//! Isolation-Forest Outlier Scoring
//!
//! A compact isolation forest over the numeric columns of a batch. The
//! intuition: anomalous points are easier to isolate with random axis-aligned
//! splits, so they end up with shorter average path lengths across a forest
//! of random trees.
//!
//! ## Algorithm
//!
//! 1. Build `trees` isolation trees, each on a random subsample of rows.
//! 2. A tree splits on a random feature at a random cut between the
//!    feature's min and max, recursing until a node is a single point or the
//!    depth limit `ceil(log2(sample_size))` is hit.
//! 3. Score each point: `s = 2^(-E[h(x)] / c(n))` where `c(n)` is the
//!    average path length of an unsuccessful BST search - the standard
//!    normalization.
//! 4. Flag the top `contamination` fraction by score.
//!
//! The RNG is seeded, so scoring is deterministic for a given batch and
//! configuration - the detect_outliers transformation stays a pure function.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Forest sizing parameters.
#[derive(Debug, Clone)]
pub struct IsolationForestConfig {
    /// Number of trees in the forest
    pub trees: usize,
    /// Rows sampled per tree
    pub sample_size: usize,
    /// Fraction of points flagged as outliers (0.0 to 1.0)
    pub contamination: f64,
    /// RNG seed; fixed so repeated runs agree
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            trees: 100,
            sample_size: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Average path length of an unsuccessful BST search over `n` points.
fn c_factor(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + 0.5772156649) - 2.0 * (n - 1.0) / n
}

fn build_tree(points: &[Vec<f64>], indices: &[usize], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
    if indices.len() <= 1 || depth >= limit {
        return Node::Leaf { size: indices.len() };
    }
    let features = points[indices[0]].len();
    let feature = rng.gen_range(0..features);

    let (min, max) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
        let v = points[i][feature];
        (lo.min(v), hi.max(v))
    });
    if !(max > min) {
        // Constant feature for this sample; cannot split further.
        return Node::Leaf { size: indices.len() };
    }

    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| points[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(points, &left, depth + 1, limit, rng)),
        right: Box::new(build_tree(points, &right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, point: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + c_factor(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] < *threshold {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}

/// Anomaly score per point, in `(0, 1)`; higher is more anomalous.
pub fn anomaly_scores(points: &[Vec<f64>], config: &IsolationForestConfig) -> Vec<f64> {
    let n = points.len();
    if n == 0 || points[0].is_empty() {
        return vec![0.0; n];
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let sample_size = config.sample_size.min(n);
    let depth_limit = (sample_size as f64).log2().ceil().max(1.0) as usize;

    let mut trees = Vec::with_capacity(config.trees);
    for _ in 0..config.trees {
        let mut sample: Vec<usize> = (0..n).collect();
        // Partial Fisher-Yates: the first sample_size entries are the sample.
        for i in 0..sample_size {
            let j = rng.gen_range(i..n);
            sample.swap(i, j);
        }
        sample.truncate(sample_size);
        trees.push(build_tree(points, &sample, 0, depth_limit, &mut rng));
    }

    let norm = c_factor(sample_size);
    points
        .iter()
        .map(|point| {
            let mean_path: f64 = trees
                .iter()
                .map(|tree| path_length(tree, point, 0))
                .sum::<f64>()
                / trees.len() as f64;
            if norm > 0.0 {
                2.0_f64.powf(-mean_path / norm)
            } else {
                0.0
            }
        })
        .collect()
}

/// Flag the top `contamination` fraction of points by anomaly score.
pub fn outlier_flags(points: &[Vec<f64>], config: &IsolationForestConfig) -> Vec<bool> {
    let scores = anomaly_scores(points, config);
    let n = scores.len();
    let flagged = ((n as f64) * config.contamination).floor() as usize;
    if flagged == 0 {
        return vec![false; n];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut flags = vec![false; n];
    for &idx in order.iter().take(flagged) {
        flags[idx] = true;
    }
    flags
}
