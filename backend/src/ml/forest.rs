//! Random forest classifier
//!
//! Bagged CART trees with Gini splits, per-split feature subsampling and
//! balanced class weights. Training is fully determined by the seed, so
//! the same data always yields the same forest.
//!
//! Trees are stored as flat node arrays, which keeps the serialized
//! artifact compact and inference allocation-free.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const LEAF: i32 = -1;

/// Minimum impurity decrease a split must achieve
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("row {row} has {found} features, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("{rows} rows but {labels} labels")]
    LabelMismatch { rows: usize, labels: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}

/// Hyper-parameters of the ensemble
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 12,
            min_samples_split: 5,
            min_samples_leaf: 2,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn validate(&self) -> Result<(), ForestError> {
        if self.n_estimators == 0 {
            return Err(ForestError::InvalidParameter("n_estimators must be positive"));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForestError::InvalidParameter("min_samples_leaf must be positive"));
        }
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidParameter("min_samples_split must be at least 2"));
        }
        Ok(())
    }
}

/// A node in a flattened tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeNode {
    /// Feature index to split on (`-1` for leaves)
    pub feature: i32,
    /// Rows with `x[feature] <= threshold` go left
    pub threshold: f64,
    pub left: i32,
    pub right: i32,
    /// Weighted share of rain among training rows at this node
    pub rain_fraction: f64,
}

impl TreeNode {
    fn leaf(rain_fraction: f64) -> Self {
        Self {
            feature: LEAF,
            threshold: 0.0,
            left: LEAF,
            right: LEAF,
            rain_fraction,
        }
    }

    pub const fn is_leaf(&self) -> bool {
        self.feature < 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Rain probability of the leaf `features` falls into
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;
        while let Some(node) = self.nodes.get(idx) {
            if node.is_leaf() {
                return node.rain_fraction;
            }
            let value = features.get(node.feature as usize).copied().unwrap_or(0.0);
            let next = if value <= node.threshold { node.left } else { node.right };
            if next < 0 {
                return node.rain_fraction;
            }
            idx = next as usize;
        }
        0.0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(n) if !n.is_leaf() => {
                    1 + walk(nodes, n.left as usize).max(walk(nodes, n.right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Training context for one tree
struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [bool],
    class_weight: [f64; 2],
    params: &'a ForestParams,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

struct Split {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

/// Weighted (total, rain) mass of a set of rows
fn mass(y: &[bool], class_weight: [f64; 2], indices: &[usize]) -> (f64, f64) {
    indices.iter().fold((0.0, 0.0), |(total, rain), &i| {
        let w = class_weight[y[i] as usize];
        (total + w, if y[i] { rain + w } else { rain })
    })
}

fn gini(total: f64, rain: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = rain / total;
    2.0 * p * (1.0 - p)
}

impl<'a> TreeBuilder<'a> {
    fn build(&mut self, indices: Vec<usize>, depth: usize) -> i32 {
        let (total, rain) = mass(self.y, self.class_weight, &indices);
        let fraction = if total > 0.0 { rain / total } else { 0.0 };
        let impurity = gini(total, rain);

        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::leaf(fraction));

        if depth >= self.params.max_depth
            || indices.len() < self.params.min_samples_split
            || indices.len() < 2 * self.params.min_samples_leaf
            || impurity <= 0.0
        {
            return node_idx as i32;
        }

        let Some(split) = self.best_split(&indices, total, impurity) else {
            return node_idx as i32;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);

        self.importances[split.feature] += split.decrease;

        let left_idx = self.build(left, depth + 1);
        let right_idx = self.build(right, depth + 1);

        let node = &mut self.nodes[node_idx];
        node.feature = split.feature as i32;
        node.threshold = split.threshold;
        node.left = left_idx;
        node.right = right_idx;

        node_idx as i32
    }

    /// Best Gini split among a random subset of features
    fn best_split(&mut self, indices: &[usize], total: f64, impurity: f64) -> Option<Split> {
        let n_features = self.importances.len();
        let candidates = rand::seq::index::sample(&mut self.rng, n_features, self.max_features);
        let min_leaf = self.params.min_samples_leaf;

        let mut best: Option<Split> = None;
        let mut order: Vec<usize> = indices.to_vec();

        for feature in candidates.iter() {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let (mut left_total, mut left_rain) = (0.0, 0.0);
            let (_, node_rain) = mass(self.y, self.class_weight, &order);

            for pos in 0..order.len() - 1 {
                let i = order[pos];
                let w = self.class_weight[self.y[i] as usize];
                left_total += w;
                if self.y[i] {
                    left_rain += w;
                }

                let here = self.x[i][feature];
                let next = self.x[order[pos + 1]][feature];
                if here >= next {
                    continue;
                }
                let left_count = pos + 1;
                if left_count < min_leaf || order.len() - left_count < min_leaf {
                    continue;
                }

                let right_total = total - left_total;
                let right_rain = node_rain - left_rain;
                let decrease = total * impurity
                    - left_total * gini(left_total, left_rain)
                    - right_total * gini(right_total, right_rain);

                if decrease > MIN_IMPURITY_DECREASE
                    && best.as_ref().map_or(true, |b| decrease > b.decrease)
                {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(Split {
                        feature,
                        threshold,
                        decrease,
                    });
                }
            }
        }

        best
    }
}

/// Bagged ensemble of decision trees for the binary "rain observed" target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    /// Mean decrease in impurity per feature, normalized to sum to 1
    feature_importances: Vec<f64>,
    params: ForestParams,
}

impl RandomForest {
    /// Fit a forest on rows `x` with labels `y`
    pub fn fit(x: &[Vec<f64>], y: &[bool], params: &ForestParams) -> Result<Self, ForestError> {
        params.validate()?;
        if x.is_empty() {
            return Err(ForestError::EmptyTrainingSet);
        }
        if x.len() != y.len() {
            return Err(ForestError::LabelMismatch {
                rows: x.len(),
                labels: y.len(),
            });
        }
        let n_features = x[0].len();
        if n_features == 0 {
            return Err(ForestError::InvalidParameter("rows must have at least one feature"));
        }
        if let Some((row, r)) = x.iter().enumerate().find(|(_, r)| r.len() != n_features) {
            return Err(ForestError::DimensionMismatch {
                row,
                expected: n_features,
                found: r.len(),
            });
        }

        // Balanced class weights: n / (2 * n_class)
        let n = y.len() as f64;
        let n_rain = y.iter().filter(|&&v| v).count() as f64;
        let n_dry = n - n_rain;
        let weight = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
        let class_weight = [weight(n_dry), weight(n_rain)];

        let max_features = ((n_features as f64).sqrt().floor() as usize).clamp(1, n_features);

        let mut master = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0; n_features];

        for _ in 0..params.n_estimators {
            let mut rng = StdRng::seed_from_u64(master.gen());

            // Bootstrap sample
            let bootstrap: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();

            let mut builder = TreeBuilder {
                x,
                y,
                class_weight,
                params,
                max_features,
                rng,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
            };
            builder.build(bootstrap, 0);

            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, imp) in importances.iter_mut().zip(&builder.importances) {
                    *acc += imp / tree_total;
                }
            }

            trees.push(DecisionTree {
                nodes: builder.nodes,
            });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        Ok(Self {
            trees,
            n_features,
            feature_importances: importances,
            params: params.clone(),
        })
    }

    /// Mean rain probability across trees, in `[0, 1]`
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba(features)).sum();
        sum / self.trees.len() as f64
    }

    /// Predicted class; ties go to "no rain"
    pub fn predict(&self, features: &[f64]) -> bool {
        self.predict_proba(features) > 0.5
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}
