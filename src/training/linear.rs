//! Ordinary least squares regression

use crate::error::{PipelineError, Result};
use crate::training::Model;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Ordinary least squares with an intercept, solved via the normal equations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fitted feature coefficients (excluding the intercept)
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    /// Fitted intercept
    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Model for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PipelineError::Shape {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        // Augment with a leading column of ones for the intercept
        let n = x.nrows();
        let p = x.ncols();
        let mut design = Array2::ones((n, p + 1));
        design
            .slice_mut(ndarray::s![.., 1..])
            .assign(x);

        let weights = solve_normal_equations(&design, y).ok_or_else(|| {
            PipelineError::Validation(
                "least squares system is singular; check for constant or duplicated features"
                    .into(),
            )
        })?;

        self.intercept = weights[0];
        self.coefficients = Some(weights.slice(ndarray::s![1..]).to_owned());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or(PipelineError::ModelNotFitted)?;

        if x.ncols() != coefficients.len() {
            return Err(PipelineError::Shape {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.dot(coefficients) + self.intercept)
    }
}

/// Solve (X^T X) w = X^T y.
///
/// Cholesky first; a ridge-jittered retry if the Gram matrix is not positive
/// definite; Gaussian elimination with partial pivoting as the last resort.
fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>) -> Option<Array1<f64>> {
    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);

    if let Some(w) = cholesky_solve(&xtx, &xty) {
        return Some(w);
    }

    let n = xtx.nrows();
    let ridge = 1e-8 * xtx.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    let mut jittered = xtx.clone();
    for i in 0..n {
        jittered[[i, i]] += ridge;
    }
    if let Some(w) = cholesky_solve(&jittered, &xty) {
        return Some(w);
    }

    gaussian_solve(xtx, xty)
}

/// Solve a symmetric positive-definite system via Cholesky decomposition.
/// Returns None when the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L L^T
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L z = b
    let mut z = Array1::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T w = z
    let mut w = Array1::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * w[j]).sum();
        w[i] = (z[i] - sum) / l[[i, i]];
    }

    Some(w)
}

/// Gaussian elimination with partial pivoting
fn gaussian_solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();

    for col in 0..n {
        let mut pivot = col;
        for row in (col + 1)..n {
            if a[[row, col]].abs() > a[[pivot, col]].abs() {
                pivot = row;
            }
        }
        if a[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for j in 0..n {
                a.swap([col, j], [pivot, j]);
            }
            b.swap(col, pivot);
        }

        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            for j in col..n {
                a[[row, j]] -= factor * a[[col, j]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut w = Array1::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| a[[i, j]] * w[j]).sum();
        w[i] = (b[i] - sum) / a[[i, i]];
    }
    Some(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_recovers_known_coefficients() {
        // y = 2 * x0 + 3 * x1 + 1
        let x = array![
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [2.0, 1.0],
            [3.0, 5.0],
            [4.0, 2.0],
        ];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| 3.0 * v) + 1.0;

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let coefficients = model.coefficients().unwrap();
        assert!((coefficients[0] - 2.0).abs() < 1e-6);
        assert!((coefficients[1] - 3.0).abs() < 1e-6);
        assert!((model.intercept() - 1.0).abs() < 1e-6);

        let predictions = model.predict(&x).unwrap();
        for (p, t) in predictions.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = LinearRegression::new();
        let err = model.predict(&array![[1.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::ModelNotFitted));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut model = LinearRegression::new();
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![1.0, 2.0, 3.0];
        let err = model.fit(&x, &y).unwrap_err();
        assert!(matches!(err, PipelineError::Shape { .. }));
    }

    #[test]
    fn test_cholesky_solves_simple_system() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![10.0, 8.0];
        let w = cholesky_solve(&a, &b).unwrap();
        // Verify A w = b
        let recovered = a.dot(&w);
        assert!((recovered[0] - b[0]).abs() < 1e-9);
        assert!((recovered[1] - b[1]).abs() < 1e-9);
    }
}
