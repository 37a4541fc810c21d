//! Regression model training
//!
//! The model registry is an explicit mapping from the configured model kind
//! to an implementation; there is no dynamic name lookup.

pub mod boosting;
pub mod engine;
pub mod linear;
pub mod tree;

pub use boosting::GradientBoostingRegressor;
pub use engine::{run, TrainOutcome};
pub use linear::LinearRegression;
pub use tree::DecisionTree;

use crate::error::Result;
use ndarray::{Array1, Array2};

/// Trait for regression models fit on a numeric design matrix
pub trait Model {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict targets for new rows
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Per-feature importances, when the model provides them
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}
