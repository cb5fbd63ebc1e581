//! Random forest classifier for the model-based drift detector.
//!
//! Binary CART trees with weighted Gini impurity, bootstrap samples,
//! `ceil(sqrt(d))` candidate features per split and balanced class weights.
//! Trees are grown in parallel with rayon; each tree draws from its own
//! seeded ChaCha8 stream, so a fit is deterministic for a given seed.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use ndarray::{Array1, Array2, ArrayView1};
use rand::{seq::index::sample, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::error::{Error, Result};

/// Minimum impurity decrease for a split to be kept.
const MIN_GAIN: f64 = 1e-12;

/// Forest hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    /// Number of trees.
    pub n_estimators: usize,
    /// Maximum depth of each tree.
    pub max_depth: usize,
    /// Minimum rows in each leaf.
    pub min_samples_leaf: usize,
    /// Base seed; tree `i` uses `seed + i`.
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_leaf: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Weighted share of class 1.
        probability: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { probability } => return *probability,
                Self::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        &**left
                    } else {
                        &**right
                    };
                }
            }
        }
    }
}

/// Per-node class weight totals.
#[derive(Debug, Clone, Copy, Default)]
struct ClassWeights {
    negative: f64,
    positive: f64,
}

impl ClassWeights {
    fn add(&mut self, label: bool, weight: f64) {
        if label {
            self.positive += weight;
        } else {
            self.negative += weight;
        }
    }

    fn total(&self) -> f64 {
        self.negative + self.positive
    }

    fn gini(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        let p = self.positive / total;
        let q = self.negative / total;
        1.0 - p * p - q * q
    }

    fn probability(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            0.5
        } else {
            self.positive / total
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    labels: &'a [bool],
    weights: [f64; 2],
    params: ForestParams,
    max_features: usize,
    importances: Vec<f64>,
    rng: ChaCha8Rng,
}

impl TreeBuilder<'_> {
    fn weight(&self, i: usize) -> f64 {
        self.weights[usize::from(self.labels[i])]
    }

    fn class_weights(&self, indices: &[usize]) -> ClassWeights {
        let mut cw = ClassWeights::default();
        for &i in indices {
            cw.add(self.labels[i], self.weight(i));
        }
        cw
    }

    fn build(&mut self, indices: &mut [usize], depth: usize) -> Node {
        let totals = self.class_weights(indices);
        let leaf = Node::Leaf {
            probability: totals.probability(),
        };

        if depth >= self.params.max_depth
            || indices.len() < 2 * self.params.min_samples_leaf
            || totals.negative <= 0.0
            || totals.positive <= 0.0
        {
            return leaf;
        }

        let Some((feature, threshold, gain)) = self.best_split(indices, totals) else {
            return leaf;
        };

        self.importances[feature] += totals.total() * gain;

        let mut left: Vec<usize> = Vec::with_capacity(indices.len());
        let mut right: Vec<usize> = Vec::with_capacity(indices.len());
        for &i in indices.iter() {
            if self.x[[i, feature]] <= threshold {
                left.push(i);
            } else {
                right.push(i);
            }
        }

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(&mut left, depth + 1)),
            right: Box::new(self.build(&mut right, depth + 1)),
        }
    }

    /// Best `(feature, threshold, impurity decrease)` over a random feature subset.
    fn best_split(&mut self, indices: &mut [usize], totals: ClassWeights) -> Option<(usize, f64, f64)> {
        let n_features = self.x.ncols();
        let candidates = sample(&mut self.rng, n_features, self.max_features.min(n_features));
        let parent = totals.gini();
        let total_weight = totals.total();
        let min_leaf = self.params.min_samples_leaf;

        let mut best: Option<(usize, f64, f64)> = None;

        for feature in candidates.iter() {
            indices.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left = ClassWeights::default();
            for pos in 0..indices.len() - 1 {
                let i = indices[pos];
                left.add(self.labels[i], self.weight(i));

                let value = self.x[[i, feature]];
                let next = self.x[[indices[pos + 1], feature]];
                if value >= next {
                    continue;
                }
                let left_count = pos + 1;
                if left_count < min_leaf || indices.len() - left_count < min_leaf {
                    continue;
                }

                let right = ClassWeights {
                    negative: totals.negative - left.negative,
                    positive: totals.positive - left.positive,
                };
                let child = (left.total() * left.gini() + right.total() * right.gini()) / total_weight;
                let gain = parent - child;

                if gain > MIN_GAIN && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, value + (next - value) / 2.0, gain));
                }
            }
        }

        best
    }
}

/// Fitted random forest.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Node>,
    importances: Vec<f64>,
    n_features: usize,
}

impl RandomForest {
    /// Fit a forest on rows `x` with binary labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelTraining`] if the data is empty, the shapes
    /// disagree, or only one class is present.
    pub fn fit(x: &Array2<f64>, labels: &[bool], params: ForestParams) -> Result<Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err(Error::model_training(format!(
                "cannot fit on a {}x{} matrix",
                n_samples, n_features
            )));
        }
        if labels.len() != n_samples {
            return Err(Error::model_training(format!(
                "{} labels for {} rows",
                labels.len(),
                n_samples
            )));
        }
        if params.n_estimators == 0 {
            return Err(Error::model_training("n_estimators must be positive"));
        }

        let positives = labels.iter().filter(|l| **l).count();
        let negatives = n_samples - positives;
        if positives == 0 || negatives == 0 {
            return Err(Error::model_training("training data contains a single class"));
        }

        // Balanced weights: n / (classes * class_count)
        let weights = [
            n_samples as f64 / (2.0 * negatives as f64),
            n_samples as f64 / (2.0 * positives as f64),
        ];
        let max_features = ((n_features as f64).sqrt().ceil() as usize).max(1);

        let fitted: Vec<(Node, Vec<f64>)> = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(tree_idx as u64));
                let mut indices: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

                let mut builder = TreeBuilder {
                    x,
                    labels,
                    weights,
                    params,
                    max_features,
                    importances: vec![0.0; n_features],
                    rng,
                };
                let root = builder.build(&mut indices, 0);

                let mut importances = builder.importances;
                let total: f64 = importances.iter().sum();
                if total > 0.0 {
                    for imp in &mut importances {
                        *imp /= total;
                    }
                }
                (root, importances)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        for (_, tree_imp) in &fitted {
            for (acc, v) in importances.iter_mut().zip(tree_imp) {
                *acc += v;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        Ok(Self {
            trees: fitted.into_iter().map(|(root, _)| root).collect(),
            importances,
            n_features,
        })
    }

    /// Probability of class 1 for each row, averaged over trees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelTraining`] if `x` has the wrong number of columns.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(Error::model_training(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        let n_trees = self.trees.len() as f64;
        let probabilities: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / n_trees
            })
            .collect();

        Ok(Array1::from_vec(probabilities))
    }

    /// Mean decrease in impurity per feature, summing to 1 when any split was made.
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    /// Number of trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> (Array2<f64>, Vec<bool>) {
        let mut data = Vec::with_capacity(n * 2);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let positive = i % 2 == 0;
            let signal = if positive { 10.0 } else { 0.0 } + (i % 7) as f64 * 0.1;
            data.push(signal);
            data.push((i % 5) as f64);
            labels.push(positive);
        }
        (Array2::from_shape_vec((n, 2), data).unwrap(), labels)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 10,
            max_depth: 5,
            min_samples_leaf: 1,
            seed: 7,
        }
    }

    #[test]
    fn test_fit_separable() {
        let (x, y) = separable(200);
        let forest = RandomForest::fit(&x, &y, small_params()).unwrap();
        assert_eq!(forest.n_trees(), 10);
        let proba = forest.predict_proba(&x).unwrap();
        for (p, label) in proba.iter().zip(&y) {
            if *label {
                assert!(*p > 0.5);
            } else {
                assert!(*p < 0.5);
            }
        }
    }

    #[test]
    fn test_importances_favour_signal() {
        let (x, y) = separable(200);
        let forest = RandomForest::fit(&x, &y, small_params()).unwrap();
        let imp = forest.feature_importances();
        assert_eq!(imp.len(), 2);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = separable(100);
        let a = RandomForest::fit(&x, &y, small_params()).unwrap();
        let b = RandomForest::fit(&x, &y, small_params()).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_single_class_rejected() {
        let x = Array2::zeros((10, 2));
        let y = vec![true; 10];
        let err = RandomForest::fit(&x, &y, small_params()).unwrap_err();
        assert!(matches!(err, Error::ModelTraining { .. }));
    }

    #[test]
    fn test_constant_features_do_not_crash() {
        let x = Array2::from_elem((40, 3), 1.0);
        let y: Vec<bool> = (0..40).map(|i| i < 10).collect();
        let forest = RandomForest::fit(&x, &y, small_params()).unwrap();
        let proba = forest.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| p.is_finite()));
        assert!(forest.feature_importances().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_shape_mismatch() {
        let (x, y) = separable(20);
        assert!(RandomForest::fit(&x, &y[..10], small_params()).is_err());
        let forest = RandomForest::fit(&x, &y, small_params()).unwrap();
        assert!(forest.predict_proba(&Array2::zeros((2, 3))).is_err());
    }
}
