//! Regression decision tree used as the boosting base learner

use crate::error::{PipelineError, Result};
use crate::training::Model;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A fitted tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Depth-limited regression tree with squared-error splits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    max_depth: usize,
    min_samples_leaf: usize,
    root: Option<Node>,
    n_features: usize,
    importances: Vec<f64>,
}

/// Candidate split found for one feature
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl DecisionTree {
    pub fn new(max_depth: usize, min_samples_leaf: usize) -> Self {
        Self {
            max_depth,
            min_samples_leaf: min_samples_leaf.max(1),
            root: None,
            n_features: 0,
            importances: Vec::new(),
        }
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
    ) -> Node {
        let mean = leaf_value(y, indices);

        if depth >= self.max_depth || indices.len() < 2 * self.min_samples_leaf {
            return Node::Leaf { value: mean };
        }

        let Some(best) = self.find_best_split(x, y, indices) else {
            return Node::Leaf { value: mean };
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature]] <= best.threshold);

        if left_idx.len() < self.min_samples_leaf || right_idx.len() < self.min_samples_leaf {
            return Node::Leaf { value: mean };
        }

        importances[best.feature] += best.gain;

        let left = self.build(x, y, &left_idx, depth + 1, importances);
        let right = self.build(x, y, &right_idx, depth + 1, importances);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Scan every feature for the split with the largest squared-error
    /// reduction. Features are scanned in parallel; each scan sorts the rows
    /// once and sweeps prefix sums over the candidate thresholds.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
    ) -> Option<SplitCandidate> {
        let n = indices.len() as f64;
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n;

        let candidates: Vec<SplitCandidate> = (0..x.ncols())
            .into_par_iter()
            .filter_map(|feature| {
                self.best_split_for_feature(x, y, indices, feature, total_sum, total_sq, parent_sse)
            })
            .collect();

        candidates
            .into_iter()
            .filter(|c| c.gain > 1e-12)
            .max_by(|a, b| a.gain.partial_cmp(&b.gain).unwrap_or(std::cmp::Ordering::Equal))
    }

    #[allow(clippy::too_many_arguments)]
    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        feature: usize,
        total_sum: f64,
        total_sq: f64,
        parent_sse: f64,
    ) -> Option<SplitCandidate> {
        let mut order: Vec<usize> = indices.to_vec();
        order.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let n = order.len();
        let mut best: Option<SplitCandidate> = None;
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for (pos, &row) in order.iter().enumerate().take(n - 1) {
            left_sum += y[row];
            left_sq += y[row] * y[row];

            let here = x[[row, feature]];
            let next = x[[order[pos + 1], feature]];
            if here == next {
                continue;
            }

            let n_left = (pos + 1) as f64;
            let n_right = (n - pos - 1) as f64;
            if (pos + 1) < self.min_samples_leaf || (n - pos - 1) < self.min_samples_leaf {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let left_sse = left_sq - left_sum * left_sum / n_left;
            let right_sse = right_sq - right_sum * right_sum / n_right;
            let gain = parent_sse - left_sse - right_sse;

            if best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    gain,
                });
            }
        }

        best
    }

    fn predict_row(&self, x: &Array2<f64>, row: usize) -> Result<f64> {
        let mut node = self.root.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        loop {
            match node {
                Node::Leaf { value } => return Ok(*value),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[[row, *feature]] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

fn leaf_value(y: &Array1<f64>, indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

impl Model for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PipelineError::Shape {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(PipelineError::Validation(
                "cannot fit a tree on an empty dataset".into(),
            ));
        }

        self.n_features = x.ncols();
        let mut importances = vec![0.0; self.n_features];
        let indices: Vec<usize> = (0..x.nrows()).collect();

        self.root = Some(self.build(x, y, &indices, 0, &mut importances));

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for value in &mut importances {
                *value /= total;
            }
        }
        self.importances = importances;

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.root.is_some() && x.ncols() != self.n_features {
            return Err(PipelineError::Shape {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut predictions = Array1::zeros(x.nrows());
        for row in 0..x.nrows() {
            predictions[row] = self.predict_row(x, row)?;
        }
        Ok(predictions)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.importances.is_empty() {
            None
        } else {
            Some(Array1::from_vec(self.importances.clone()))
        }
    }
}
