//! Model-based (classifier distinguishability) drift detection.
//!
//! Baseline rows are labelled 0 and current rows 1. A random forest is
//! trained on a stratified split and scored on the held-out rows; a score
//! well above chance means the two windows are distinguishable.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::collections::BTreeMap;

use ndarray::Array2;
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::{ModelDriftConfig, ModelMetric},
    error::{Error, Result},
    forest::{ForestParams, RandomForest},
    schema::{FeatureKind, FeatureSchema},
    window::{FeatureColumn, Window},
};

/// Outcome of the model-based detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDriftResult {
    /// Held-out score of the classifier.
    pub drift_score: f64,
    /// Configured cutoff.
    pub alert_threshold: f64,
    /// `drift_score > alert_threshold`.
    pub alert_triggered: bool,
    /// Metric `drift_score` was measured with.
    pub metric: ModelMetric,
    /// Baseline rows used.
    pub baseline_samples: usize,
    /// Current rows used.
    pub current_samples: usize,
    /// Mean decrease in impurity per feature.
    pub feature_importances: BTreeMap<String, f64>,
}

/// Train and score a baseline-vs-current classifier.
///
/// Only numeric schema features present in both windows form the feature
/// matrix; nulls become 0.0.
///
/// # Errors
///
/// Returns [`Error::ModelTraining`] if there are no usable features, a
/// window has fewer than `min_rows_per_class` rows, or the split leaves a
/// class empty.
pub fn detect(
    baseline: &Window,
    current: &Window,
    schema: &FeatureSchema,
    config: &ModelDriftConfig,
) -> Result<ModelDriftResult> {
    let n_base = baseline.len();
    let n_cur = current.len();
    if n_base < config.min_rows_per_class || n_cur < config.min_rows_per_class {
        return Err(Error::model_training(format!(
            "need at least {} rows per window, got baseline={} current={}",
            config.min_rows_per_class, n_base, n_cur
        )));
    }

    let mut names = Vec::new();
    let mut columns = Vec::new();
    for feature in schema.features() {
        if feature.kind != FeatureKind::Numeric {
            continue;
        }
        let (Ok(FeatureColumn::Numeric(b)), Ok(FeatureColumn::Numeric(c))) = (
            baseline.column(&feature.name, FeatureKind::Numeric),
            current.column(&feature.name, FeatureKind::Numeric),
        ) else {
            tracing::debug!(feature = %feature.name, "Excluded from classifier");
            continue;
        };
        names.push(feature.name.clone());
        columns.push(b.into_iter().chain(c).map(|v| v.unwrap_or(0.0)).collect::<Vec<_>>());
    }

    if names.is_empty() {
        return Err(Error::model_training("no numeric features available"));
    }

    let n_rows = n_base + n_cur;
    let x = Array2::from_shape_fn((n_rows, names.len()), |(r, f)| columns[f][r]);
    let labels: Vec<bool> = (0..n_rows).map(|r| r >= n_base).collect();

    let (train, test) = stratified_split(n_base, n_cur, config.test_size, config.seed)?;

    let x_train = x.select(ndarray::Axis(0), &train);
    let y_train: Vec<bool> = train.iter().map(|&i| labels[i]).collect();
    let x_test = x.select(ndarray::Axis(0), &test);
    let y_test: Vec<bool> = test.iter().map(|&i| labels[i]).collect();

    let forest = RandomForest::fit(
        &x_train,
        &y_train,
        ForestParams {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf,
            seed: config.seed,
        },
    )?;
    let scores = forest.predict_proba(&x_test)?;
    let scores = scores.to_vec();

    let drift_score = match config.metric {
        ModelMetric::RocAuc => roc_auc(&y_test, &scores)?,
        ModelMetric::Accuracy => accuracy(&y_test, &scores),
    };

    let feature_importances = names
        .into_iter()
        .zip(forest.feature_importances().iter().copied())
        .collect();

    let result = ModelDriftResult {
        drift_score,
        alert_threshold: config.alert_threshold,
        alert_triggered: drift_score > config.alert_threshold,
        metric: config.metric,
        baseline_samples: n_base,
        current_samples: n_cur,
        feature_importances,
    };

    tracing::info!(
        metric = config.metric.as_str(),
        score = result.drift_score,
        triggered = result.alert_triggered,
        "Model-based drift scored"
    );

    Ok(result)
}

/// Split each class into train/test indices by `test_size`.
///
/// Baseline rows are `0..n_base`, current rows follow.
fn stratified_split(
    n_base: usize,
    n_cur: usize,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_base + n_cur);
    let mut test = Vec::new();

    for range in [0..n_base, n_base..n_base + n_cur] {
        let mut idx: Vec<usize> = range.collect();
        let n = idx.len();
        let n_test = (n as f64 * test_size).round() as usize;
        if n_test == 0 || n_test >= n {
            return Err(Error::model_training(format!(
                "test_size {} leaves an empty split for a class of {} rows",
                test_size, n
            )));
        }
        idx.shuffle(&mut rng);
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }

    Ok((train, test))
}

/// Area under the ROC curve via the Mann-Whitney U statistic.
///
/// Tied scores receive their average rank.
///
/// # Errors
///
/// Returns [`Error::ModelTraining`] if either class is absent.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Result<f64> {
    let n_pos = labels.iter().filter(|l| **l).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(Error::model_training("ROC-AUC needs both classes in the test split"));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; ties share the mean of their positions
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(l, _)| **l)
        .map(|(_, r)| r)
        .sum();
    let n_pos = n_pos as f64;
    let u = pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0;

    Ok(u / (n_pos * n_neg as f64))
}

/// Fraction of rows classified correctly at a 0.5 cutoff.
pub fn accuracy(labels: &[bool], scores: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels
        .iter()
        .zip(scores)
        .filter(|(l, s)| **l == (**s >= 0.5))
        .count();
    correct as f64 / labels.len() as f64
}
