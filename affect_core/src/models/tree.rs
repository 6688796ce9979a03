//! CART trees grown on weighted samples.
//!
//! One builder serves both uses: Gini impurity on 0/1 targets for the forest,
//! squared error on residuals for boosting. A node's value is the weighted
//! mean target, which for 0/1 targets is the positive-class probability.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Consecutive sorted values closer than this are not split between.
const FEATURE_THRESHOLD: f64 = 1e-7;
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    Gini,
    SquaredError,
}

/// Features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    All,
    /// `max(1, floor(sqrt(d)))`, drawn afresh at every node.
    Sqrt,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => ((n_features as f64).sqrt() as usize).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            criterion: Criterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Running weighted sums of a node's targets.
#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    w: f64,
    wy: f64,
    wy2: f64,
}

impl Stats {
    fn push(&mut self, y: f64, w: f64) {
        self.w += w;
        self.wy += w * y;
        self.wy2 += w * y * y;
    }

    fn minus(&self, other: &Stats) -> Stats {
        Stats {
            w: self.w - other.w,
            wy: self.wy - other.wy,
            wy2: self.wy2 - other.wy2,
        }
    }

    fn mean(&self) -> f64 {
        if self.w > 0.0 {
            self.wy / self.w
        } else {
            0.0
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.w <= 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        match criterion {
            Criterion::Gini => 2.0 * mean * (1.0 - mean),
            Criterion::SquaredError => (self.wy2 / self.w - mean * mean).max(0.0),
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    /// Samples going left come first in the reordered slice.
    n_left: usize,
    decrease: f64,
}

struct Frame {
    node: usize,
    samples: Vec<usize>,
    depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    /// Total weighted impurity decrease per feature.
    impurity_decrease: Vec<f64>,
}

impl DecisionTree {
    /// Grow a tree on the rows with positive weight.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        targets: &[f64],
        weights: &[f64],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.ncols();
        let mut tree = Self {
            nodes: vec![Node::Leaf { value: 0.0 }],
            impurity_decrease: vec![0.0; n_features],
        };
        let samples: Vec<usize> = (0..x.nrows()).filter(|&i| weights[i] > 0.0).collect();
        let mut features: Vec<usize> = (0..n_features).collect();
        let n_candidates = params.max_features.resolve(n_features);

        let mut stack = vec![Frame {
            node: 0,
            samples,
            depth: 0,
        }];
        while let Some(Frame {
            node,
            mut samples,
            depth,
        }) = stack.pop()
        {
            let mut stats = Stats::default();
            for &i in &samples {
                stats.push(targets[i], weights[i]);
            }
            let impurity = stats.impurity(params.criterion);
            tree.nodes[node] = Node::Leaf {
                value: stats.mean(),
            };

            let depth_exhausted = params.max_depth.map_or(false, |max| depth >= max);
            if depth_exhausted
                || samples.len() < params.min_samples_split
                || samples.len() < 2 * params.min_samples_leaf
                || impurity <= MIN_IMPURITY_DECREASE
            {
                continue;
            }

            if params.max_features == MaxFeatures::Sqrt {
                features.shuffle(rng);
            }
            let Some(split) = best_split(
                x,
                targets,
                weights,
                &mut samples,
                &features,
                n_candidates,
                &stats,
                impurity,
                params,
            ) else {
                continue;
            };

            tree.impurity_decrease[split.feature] += split.decrease;
            let right_samples = samples.split_off(split.n_left);
            let left = tree.nodes.len();
            let right = left + 1;
            tree.nodes.push(Node::Leaf { value: 0.0 });
            tree.nodes.push(Node::Leaf { value: 0.0 });
            tree.nodes[node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            stack.push(Frame {
                node: right,
                samples: right_samples,
                depth: depth + 1,
            });
            stack.push(Frame {
                node: left,
                samples,
                depth: depth + 1,
            });
        }
        tree
    }

    /// Index of the leaf `row` falls into.
    pub fn apply(&self, row: ArrayView1<'_, f64>) -> usize {
        let mut idx = 0;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
        } = self.nodes[idx]
        {
            idx = if row[feature] <= threshold { left } else { right };
        }
        idx
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self.nodes[self.apply(row)] {
            Node::Leaf { value } => value,
            Node::Split { .. } => 0.0,
        }
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        Array1::from_iter(x.outer_iter().map(|row| self.predict_row(row)))
    }

    /// Overwrite a leaf's output. Ignored for split nodes.
    pub fn set_leaf_value(&mut self, leaf: usize, new_value: f64) {
        if let Some(Node::Leaf { value }) = self.nodes.get_mut(leaf) {
            *value = new_value;
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Impurity decrease per feature normalised to sum to one; zeros for a stump.
    pub fn feature_importances(&self) -> Array1<f64> {
        let total: f64 = self.impurity_decrease.iter().sum();
        if total > 0.0 {
            Array1::from_iter(self.impurity_decrease.iter().map(|v| v / total))
        } else {
            Array1::zeros(self.impurity_decrease.len())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn best_split(
    x: ArrayView2<'_, f64>,
    targets: &[f64],
    weights: &[f64],
    samples: &mut [usize],
    features: &[usize],
    n_candidates: usize,
    parent: &Stats,
    parent_impurity: f64,
    params: &TreeParams,
) -> Option<BestSplit> {
    let min_leaf = params.min_samples_leaf.max(1);
    let mut best: Option<BestSplit> = None;
    let mut visited = 0;

    for &feature in features {
        if visited >= n_candidates && best.is_some() {
            break;
        }
        samples.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let first = x[[samples[0], feature]];
        let last = x[[samples[samples.len() - 1], feature]];
        if last - first <= FEATURE_THRESHOLD {
            // Constant here; does not count against the candidate budget.
            continue;
        }
        visited += 1;

        let mut left = Stats::default();
        for pos in 0..samples.len() - 1 {
            let i = samples[pos];
            left.push(targets[i], weights[i]);
            let n_left = pos + 1;
            if n_left < min_leaf || samples.len() - n_left < min_leaf {
                continue;
            }
            let here = x[[i, feature]];
            let next = x[[samples[pos + 1], feature]];
            if next - here <= FEATURE_THRESHOLD {
                continue;
            }
            let right = parent.minus(&left);
            let decrease = parent.w * parent_impurity
                - left.w * left.impurity(params.criterion)
                - right.w * right.impurity(params.criterion);
            if decrease > MIN_IMPURITY_DECREASE
                && best.as_ref().map_or(true, |b| decrease > b.decrease)
            {
                let mut threshold = (here + next) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    n_left,
                    decrease,
                });
            }
        }
    }

    // Leave the samples ordered by the winning feature so the caller can split the slice.
    if let Some(split) = &best {
        let feature = split.feature;
        samples.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn separates_a_threshold_on_one_feature() {
        let x = array![[0.0, 5.0], [1.0, 3.0], [2.0, 4.0], [10.0, 5.0], [11.0, 3.0], [12.0, 4.0]];
        let y = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let w = [1.0; 6];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(x.view(), &y, &w, &TreeParams::default(), &mut rng);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict(x.view()).to_vec(), y.to_vec());
        let importances = tree.feature_importances();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn depth_limit_yields_stump() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = [0.0, 1.0, 0.0, 1.0];
        let params = TreeParams {
            max_depth: Some(0),
            ..TreeParams::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(x.view(), &y, &[1.0; 4], &params, &mut rng);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_row(x.row(0)), 0.5);
    }

    #[test]
    fn weights_shift_leaf_values() {
        let x = array![[0.0], [0.0], [0.0]];
        let y = [0.0, 1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(x.view(), &y, &[2.0, 1.0, 1.0], &TreeParams::default(), &mut rng);
        assert_eq!(tree.predict_row(x.row(0)), 0.5);
    }

    #[test]
    fn regression_leaves_are_means() {
        let x = array![[0.0], [1.0], [5.0], [6.0]];
        let y = [1.0, 1.0, -2.0, -2.0];
        let params = TreeParams {
            criterion: Criterion::SquaredError,
            ..TreeParams::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let mut tree = DecisionTree::fit(x.view(), &y, &[1.0; 4], &params, &mut rng);
        assert_eq!(tree.predict_row(x.row(3)), -2.0);
        let leaf = tree.apply(x.row(0));
        tree.set_leaf_value(leaf, 7.0);
        assert_eq!(tree.predict_row(x.row(1)), 7.0);
    }
}
