//! Regression metrics for a table of actuals and predictions

use crate::artifacts::RunDir;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Summary metrics for one set of test predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub r2: f64,
    pub mae: f64,
    pub mse: f64,
}

impl RegressionReport {
    /// Compute metrics over paired actual/predicted values
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len() as f64;
        if actual.is_empty() {
            return Self {
                r2: 0.0,
                mae: 0.0,
                mse: 0.0,
            };
        }

        let errors: Vec<f64> = actual
            .iter()
            .zip(predicted.iter())
            .map(|(a, p)| a - p)
            .collect();

        let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let mean = actual.iter().sum::<f64>() / n;
        let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        Self { r2, mae, mse }
    }

    /// Rounded copy used for display and the saved summary
    pub fn rounded(&self) -> Self {
        Self {
            r2: round_to(self.r2, 2),
            mae: round_to(self.mae, 5),
            mse: round_to(self.mse, 5),
        }
    }

    /// Write the rounded metrics summary to `metrics.json`
    pub fn save(&self, run_dir: &RunDir) -> Result<()> {
        let path = run_dir.file("metrics.json");
        info!(path = %path.display(), "saving metrics summary");
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer(file, &self.rounded())?;
        Ok(())
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
