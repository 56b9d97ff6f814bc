//! ML Model Definitions
//!
//! The [`Regressor`] seam shared by the base models, and the ordinary least
//! squares model used as the stacking combiner.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{check_columns, check_training_data, ModelType};
use crate::error::{ForecastError, Result};

/// Singular values below this fraction of the largest are treated as zero.
const RCOND: f64 = 1e-10;

/// Trait for fitted regressors
pub trait Regressor: Send + Sync {
    /// Predict one value per row of `x`
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>>;

    fn model_type(&self) -> ModelType;
}

/// Linear Regression Model with intercept, fitted by least squares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressionModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressionModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }

    /// Centre `x` and `y`, solve the least-squares system through an SVD, and
    /// recover the intercept from the means.
    ///
    /// Rank-deficient inputs (e.g. identical base predictions) get the
    /// minimum-norm coefficients.
    pub fn fit(x: &[Vec<f64>], y: &[f64]) -> Result<Self> {
        let n_features = check_training_data(x, y)?;
        let n = x.len();

        let x_means: Vec<f64> = (0..n_features)
            .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n as f64)
            .collect();
        let y_mean = y.iter().sum::<f64>() / n as f64;

        let centred_x = DMatrix::from_fn(n, n_features, |i, j| x[i][j] - x_means[j]);
        let centred_y = DVector::from_fn(n, |i, _| y[i] - y_mean);

        let svd = centred_x.svd(true, true);
        let eps = svd.singular_values.max() * RCOND;
        let solution = svd
            .solve(&centred_y, eps)
            .map_err(|e| ForecastError::Training(format!("Least squares solve failed: {}", e)))?;

        let coefficients: Vec<f64> = solution.iter().copied().collect();
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(x_means.iter())
                .map(|(c, m)| c * m)
                .sum::<f64>();

        Ok(Self::new(coefficients, intercept))
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(self.coefficients.iter())
            .map(|(f, c)| f * c)
            .sum::<f64>()
            + self.intercept
    }
}

impl Regressor for LinearRegressionModel {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let n_features = check_columns(x)?;
        if !x.is_empty() && n_features != self.coefficients.len() {
            return Err(ForecastError::Input(format!(
                "Feature count mismatch: expected {}, got {}",
                self.coefficients.len(),
                n_features
            )));
        }

        Ok(x.iter().map(|row| self.predict_row(row)).collect())
    }

    fn model_type(&self) -> ModelType {
        ModelType::LinearRegression
    }
}
