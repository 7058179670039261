use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Boosting hyperparameters. The defaults are the fixed production settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Fraction of rows sampled for each tree.
    pub subsample: f64,
    /// Fraction of columns sampled for each tree.
    pub colsample_bytree: f64,
    /// L2 regularisation on leaf weights.
    pub reg_lambda: f64,
    pub min_child_weight: f64,
    /// Minimum loss reduction required to split.
    pub gamma: f64,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 600,
            learning_rate: 0.03,
            max_depth: 6,
            subsample: 0.8,
            colsample_bytree: 0.8,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            gamma: 0.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        /// Rows with `x < threshold` go left.
        threshold: f64,
        /// Direction taken by missing (NaN) values.
        default_left: bool,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                } => {
                    let x = row[*feature];
                    let go_left = if x.is_nan() { *default_left } else { x < *threshold };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }
}

/// Squared-error gradient boosting over regression trees.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostedRegressor {
    params: BoosterParams,
    n_features: usize,
    base_score: f64,
    trees: Vec<RegressionTree>,
}

#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    g: f64,
    h: f64,
}

impl GradStats {
    fn add(&mut self, g: f64, h: f64) {
        self.g += g;
        self.h += h;
    }

    fn sub(self, other: GradStats) -> GradStats {
        GradStats {
            g: self.g - other.g,
            h: self.h - other.h,
        }
    }

    fn plus(self, other: GradStats) -> GradStats {
        GradStats {
            g: self.g + other.g,
            h: self.h + other.h,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    default_left: bool,
    gain: f64,
}

/// Running state of the left partition while scanning one feature for one node.
#[derive(Debug, Clone, Copy, Default)]
struct ScanState {
    left: GradStats,
    last_value: Option<f64>,
}

/// Feature columns presorted once per fit.
struct SortedColumns {
    /// Row indices with a present value, ascending by value.
    present: Vec<Vec<usize>>,
    /// Row indices whose value is missing.
    missing: Vec<Vec<usize>>,
}

impl SortedColumns {
    fn build(features: &[Vec<f64>], n_features: usize) -> Self {
        let mut present = Vec::with_capacity(n_features);
        let mut missing = Vec::with_capacity(n_features);
        for j in 0..n_features {
            let (mut here, gone): (Vec<usize>, Vec<usize>) =
                (0..features.len()).partition(|&i| !features[i][j].is_nan());
            here.sort_by(|&a, &b| features[a][j].total_cmp(&features[b][j]));
            present.push(here);
            missing.push(gone);
        }
        Self { present, missing }
    }
}

impl GradientBoostedRegressor {
    /// Fit on a dense design matrix. Missing feature values are NaN.
    pub fn fit(params: BoosterParams, features: &[Vec<f64>], labels: &[f64]) -> ModelResult<Self> {
        if features.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if features.len() != labels.len() {
            return Err(ModelError::LengthMismatch(labels.len(), features.len()));
        }
        let n_features = features[0].len();
        if let Some(bad) = features.iter().find(|row| row.len() != n_features) {
            return Err(ModelError::DimensionMismatch {
                expected: n_features,
                got: bad.len(),
            });
        }
        if let Some(i) = labels.iter().position(|y| !y.is_finite()) {
            return Err(ModelError::NonFiniteLabel(i));
        }

        let n = features.len();
        let base_score = labels.iter().sum::<f64>() / n as f64;
        let mut model = Self {
            params,
            n_features,
            base_score,
            trees: Vec::with_capacity(params.n_estimators),
        };

        tracing::debug!(
            "Fitting booster: rows={}, features={}, trees={}, depth={}",
            n,
            n_features,
            params.n_estimators,
            params.max_depth
        );

        let columns = SortedColumns::build(features, n_features);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut predictions = vec![base_score; n];
        let col_count = ((n_features as f64 * params.colsample_bytree).round() as usize)
            .clamp(1, n_features.max(1));

        for _ in 0..params.n_estimators {
            // Squared error: g = pred - y, h = 1
            let grads: Vec<GradStats> = predictions
                .iter()
                .zip(labels)
                .map(|(p, y)| GradStats { g: p - y, h: 1.0 })
                .collect();

            let mut in_sample: Vec<bool> = (0..n).map(|_| rng.gen::<f64>() < params.subsample).collect();
            if !in_sample.iter().any(|&s| s) {
                in_sample.iter_mut().for_each(|s| *s = true);
            }

            let mut cols: Vec<usize> = (0..n_features).collect();
            cols.shuffle(&mut rng);
            cols.truncate(col_count);
            cols.sort_unstable();

            let tree = model.grow_tree(features, &columns, &grads, &in_sample, &cols);
            for (i, row) in features.iter().enumerate() {
                predictions[i] += tree.predict(row);
            }
            model.trees.push(tree);
        }

        Ok(model)
    }

    /// Level-wise exact greedy tree growth.
    fn grow_tree(
        &self,
        features: &[Vec<f64>],
        columns: &SortedColumns,
        grads: &[GradStats],
        in_sample: &[bool],
        cols: &[usize],
    ) -> RegressionTree {
        let p = &self.params;
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut node_of: Vec<Option<usize>> = in_sample
            .iter()
            .map(|&s| if s { Some(0) } else { None })
            .collect();

        let mut root = GradStats::default();
        for (i, s) in grads.iter().enumerate() {
            if in_sample[i] {
                root.add(s.g, s.h);
            }
        }

        // (node id, node stats)
        let mut frontier: Vec<(usize, GradStats)> = vec![(0, root)];

        for _depth in 0..p.max_depth {
            if frontier.is_empty() {
                break;
            }

            let mut slot_of: Vec<Option<usize>> = vec![None; nodes.len()];
            for (slot, (id, _)) in frontier.iter().enumerate() {
                slot_of[*id] = Some(slot);
            }

            let mut best: Vec<Option<SplitCandidate>> = vec![None; frontier.len()];

            for &j in cols {
                let mut missing = vec![GradStats::default(); frontier.len()];
                for &i in &columns.missing[j] {
                    if let Some(slot) = node_of[i].and_then(|id| slot_of[id]) {
                        missing[slot].add(grads[i].g, grads[i].h);
                    }
                }

                let mut scan = vec![ScanState::default(); frontier.len()];
                for &i in &columns.present[j] {
                    let Some(slot) = node_of[i].and_then(|id| slot_of[id]) else {
                        continue;
                    };
                    let x = features[i][j];
                    let state = &mut scan[slot];
                    if let Some(prev) = state.last_value {
                        if x > prev {
                            let total = frontier[slot].1;
                            if let Some(candidate) =
                                self.evaluate(j, x, state.left, missing[slot], total)
                            {
                                if best[slot].map_or(true, |b| candidate.gain > b.gain) {
                                    best[slot] = Some(candidate);
                                }
                            }
                        }
                    }
                    state.left.add(grads[i].g, grads[i].h);
                    state.last_value = Some(x);
                }

                // Missing-only partition: all present values left, missing right
                for (slot, state) in scan.iter().enumerate() {
                    if state.last_value.is_none() || missing[slot].h <= 0.0 {
                        continue;
                    }
                    let total = frontier[slot].1;
                    let candidate = SplitCandidate {
                        feature: j,
                        threshold: f64::INFINITY,
                        default_left: false,
                        gain: self.gain(state.left, missing[slot], total),
                    };
                    if self.admissible(state.left, missing[slot], candidate.gain)
                        && best[slot].map_or(true, |b| candidate.gain > b.gain)
                    {
                        best[slot] = Some(candidate);
                    }
                }
            }

            let mut next_frontier = Vec::new();
            let mut child_of: Vec<Option<(usize, usize, SplitCandidate)>> = vec![None; nodes.len()];
            for (slot, (id, stats)) in frontier.iter().enumerate() {
                match best[slot] {
                    Some(split) => {
                        let left = nodes.len();
                        let right = left + 1;
                        nodes.push(Node::Leaf { value: 0.0 });
                        nodes.push(Node::Leaf { value: 0.0 });
                        nodes[*id] = Node::Split {
                            feature: split.feature,
                            threshold: split.threshold,
                            default_left: split.default_left,
                            left,
                            right,
                        };
                        child_of[*id] = Some((left, right, split));
                    }
                    None => {
                        nodes[*id] = Node::Leaf {
                            value: self.leaf_value(*stats),
                        };
                    }
                }
            }

            let mut child_stats: Vec<GradStats> = vec![GradStats::default(); nodes.len()];
            for (i, assigned) in node_of.iter_mut().enumerate() {
                let Some(id) = *assigned else {
                    continue;
                };
                let Some((left, right, split)) = child_of.get(id).copied().flatten() else {
                    *assigned = None;
                    continue;
                };
                let x = features[i][split.feature];
                let go_left = if x.is_nan() {
                    split.default_left
                } else {
                    x < split.threshold
                };
                let child = if go_left { left } else { right };
                child_stats[child].add(grads[i].g, grads[i].h);
                *assigned = Some(child);
            }

            for (left, right, _) in child_of.iter().flatten() {
                next_frontier.push((*left, child_stats[*left]));
                next_frontier.push((*right, child_stats[*right]));
            }
            frontier = next_frontier;
        }

        for (id, stats) in frontier {
            nodes[id] = Node::Leaf {
                value: self.leaf_value(stats),
            };
        }

        RegressionTree { nodes }
    }

    /// Best missing-value direction for a split at `threshold`.
    fn evaluate(
        &self,
        feature: usize,
        threshold: f64,
        left_present: GradStats,
        missing: GradStats,
        total: GradStats,
    ) -> Option<SplitCandidate> {
        let mut best: Option<SplitCandidate> = None;

        let options: &[bool] = if missing.h > 0.0 { &[false, true] } else { &[false] };
        for &default_left in options {
            let left = if default_left {
                left_present.plus(missing)
            } else {
                left_present
            };
            let right = total.sub(left);
            let gain = self.gain(left, right, total);
            if self.admissible(left, right, gain) && best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    default_left,
                    gain,
                });
            }
        }
        best
    }

    fn score(&self, s: GradStats) -> f64 {
        s.g * s.g / (s.h + self.params.reg_lambda)
    }

    fn gain(&self, left: GradStats, right: GradStats, total: GradStats) -> f64 {
        0.5 * (self.score(left) + self.score(right) - self.score(total)) - self.params.gamma
    }

    fn admissible(&self, left: GradStats, right: GradStats, gain: f64) -> bool {
        left.h >= self.params.min_child_weight
            && right.h >= self.params.min_child_weight
            && gain > 1e-12
    }

    fn leaf_value(&self, s: GradStats) -> f64 {
        -s.g / (s.h + self.params.reg_lambda) * self.params.learning_rate
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_row(&self, row: &[f64]) -> ModelResult<f64> {
        if row.len() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        Ok(self.base_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>())
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let t = i as f64 / n as f64;
                vec![t, ((i * 7) % 13) as f64]
            })
            .collect();
        let y = x.iter().map(|r| if r[0] < 0.5 { 1.0 } else { -1.0 }).collect();
        (x, y)
    }

    fn small() -> BoosterParams {
        BoosterParams {
            n_estimators: 200,
            learning_rate: 0.1,
            ..BoosterParams::default()
        }
    }

    #[test]
    fn test_default_params() {
        let p = BoosterParams::default();
        assert_eq!(p.n_estimators, 600);
        assert_eq!(p.learning_rate, 0.03);
        assert_eq!(p.max_depth, 6);
        assert_eq!(p.subsample, 0.8);
        assert_eq!(p.colsample_bytree, 0.8);
        assert_eq!(p.seed, 42);
    }

    #[test]
    fn test_learns_step_function() {
        let (x, y) = step_data(200);
        let model = GradientBoostedRegressor::fit(small(), &x, &y).unwrap();

        assert_eq!(model.n_trees(), 200);
        let low = model.predict_row(&[0.1, 3.0]).unwrap();
        let high = model.predict_row(&[0.9, 3.0]).unwrap();
        assert!((low - 1.0).abs() < 0.05, "low = {}", low);
        assert!((high + 1.0).abs() < 0.05, "high = {}", high);
    }

    #[test]
    fn test_without_trees_predicts_label_mean() {
        let (x, y) = step_data(10);
        let params = BoosterParams {
            n_estimators: 0,
            ..BoosterParams::default()
        };
        let model = GradientBoostedRegressor::fit(params, &x, &y).unwrap();
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert!((model.base_score() - mean).abs() < 1e-12);
        assert!((model.predict_row(&x[0]).unwrap() - mean).abs() < 1e-12);
    }

    #[test]
    fn test_constant_labels() {
        let (x, _) = step_data(50);
        let y = vec![0.25; 50];
        let model = GradientBoostedRegressor::fit(small(), &x, &y).unwrap();
        for row in &x {
            assert!((model.predict_row(row).unwrap() - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_same_seed_same_model() {
        let (x, y) = step_data(120);
        let a = GradientBoostedRegressor::fit(small(), &x, &y).unwrap();
        let b = GradientBoostedRegressor::fit(small(), &x, &y).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_missing_values_learn_a_direction() {
        // Feature 0 is missing exactly where the label is high
        let n = 100;
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    vec![f64::NAN, i as f64]
                } else {
                    vec![1.0 + (i % 5) as f64, i as f64]
                }
            })
            .collect();
        let y: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 2.0 } else { 0.0 }).collect();
        let params = BoosterParams {
            colsample_bytree: 1.0,
            ..small()
        };

        let model = GradientBoostedRegressor::fit(params, &x, &y).unwrap();
        let missing = model.predict_row(&[f64::NAN, 50.0]).unwrap();
        let present = model.predict_row(&[3.0, 51.0]).unwrap();
        assert!(missing.is_finite());
        assert!(missing > 1.5, "missing = {}", missing);
        assert!(present < 0.5, "present = {}", present);
    }

    #[test]
    fn test_rejects_bad_input() {
        let params = BoosterParams::default();
        assert_eq!(
            GradientBoostedRegressor::fit(params, &[], &[]),
            Err(ModelError::EmptyTrainingSet)
        );
        assert!(matches!(
            GradientBoostedRegressor::fit(params, &[vec![1.0], vec![1.0, 2.0]], &[0.0, 1.0]),
            Err(ModelError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            GradientBoostedRegressor::fit(params, &[vec![1.0]], &[f64::NAN]),
            Err(ModelError::NonFiniteLabel(0))
        ));
    }

    #[test]
    fn test_predict_row_checks_width() {
        let (x, y) = step_data(20);
        let model = GradientBoostedRegressor::fit(small(), &x, &y).unwrap();
        assert!(matches!(
            model.predict_row(&[0.1]),
            Err(ModelError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
