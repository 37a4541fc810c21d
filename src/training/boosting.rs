//! Gradient boosted regression trees

use crate::config::ModelParams;
use crate::error::{PipelineError, Result};
use crate::training::tree::DecisionTree;
use crate::training::Model;
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Squared-error gradient boosting over depth-limited regression trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    params: ModelParams,
    initial_prediction: f64,
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
}

impl GradientBoostingRegressor {
    pub fn new(params: ModelParams) -> Self {
        Self {
            params,
            initial_prediction: 0.0,
            trees: Vec::new(),
            importances: Vec::new(),
        }
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.params.subsample >= 1.0 {
            return (0..n).collect();
        }
        let size = ((n as f64) * self.params.subsample).round().max(1.0) as usize;
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);
        indices.truncate(size);
        indices
    }
}

impl Model for GradientBoostingRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PipelineError::Shape {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(PipelineError::Validation(
                "cannot fit gradient boosting on an empty dataset".into(),
            ));
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();

        // Boosting starts from the mean and fits each tree to the residuals
        self.initial_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);

        let mut rng = match self.params.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.trees = Vec::with_capacity(self.params.n_estimators);
        self.importances = vec![0.0; n_features];

        for round in 0..self.params.n_estimators {
            let residuals: Array1<f64> = y - &predictions;

            let sample = self.subsample_indices(n_samples, &mut rng);
            let x_sub = x.select(Axis(0), &sample);
            let r_sub: Array1<f64> = sample.iter().map(|&i| residuals[i]).collect();

            let mut tree =
                DecisionTree::new(self.params.max_depth, self.params.min_samples_leaf);
            tree.fit(&x_sub, &r_sub)?;

            let update = tree.predict(x)?;
            predictions = predictions + update.mapv(|v| v * self.params.learning_rate);

            if let Some(tree_importances) = tree.feature_importances() {
                for (total, value) in self.importances.iter_mut().zip(tree_importances.iter()) {
                    *total += value;
                }
            }
            self.trees.push(tree);

            if (round + 1) % 25 == 0 {
                debug!(round = round + 1, "boosting rounds completed");
            }
        }

        let total: f64 = self.importances.iter().sum();
        if total > 0.0 {
            for value in &mut self.importances {
                *value /= total;
            }
        }

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }

        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for tree in &self.trees {
            let update = tree.predict(x)?;
            predictions = predictions + update.mapv(|v| v * self.params.learning_rate);
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

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params(n_estimators: usize) -> ModelParams {
        ModelParams {
            n_estimators,
            learning_rate: 0.3,
            max_depth: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: Some(42),
        }
    }

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0],
            [2.0],
            [3.0],
            [4.0],
            [5.0],
            [6.0],
            [7.0],
            [8.0],
        ];
        let y = array![1.0, 1.0, 1.0, 1.0, 9.0, 9.0, 9.0, 9.0];
        (x, y)
    }

    #[test]
    fn test_beats_mean_predictor() {
        let (x, y) = step_data();
        let mean = y.mean().unwrap();
        let mean_sse: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();

        let mut model = GradientBoostingRegressor::new(params(50));
        model.fit(&x, &y).unwrap();

        let predictions = model.predict(&x).unwrap();
        let sse: f64 = y
            .iter()
            .zip(predictions.iter())
            .map(|(t, p)| (t - p).powi(2))
            .sum();

        assert!(sse < mean_sse / 10.0);
    }

    #[test]
    fn test_importances_sum_to_one() {
        let (x, y) = step_data();
        let mut model = GradientBoostingRegressor::new(params(10));
        model.fit(&x, &y).unwrap();

        let importances = model.feature_importances().unwrap();
        assert!((importances.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_is_reproducible_with_seed() {
        let (x, y) = step_data();
        let mut subsampled = params(20);
        subsampled.subsample = 0.75;

        let mut a = GradientBoostingRegressor::new(subsampled.clone());
        let mut b = GradientBoostingRegressor::new(subsampled);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = GradientBoostingRegressor::new(params(5));
        let err = model.predict(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::ModelNotFitted));
    }
}
