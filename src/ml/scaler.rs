//! Z-score feature scaling.

use serde::{Deserialize, Serialize};

use super::check_columns;
use crate::error::{ForecastError, Result};

/// Per-feature mean and standard deviation learned from the fit set.
///
/// Features with zero variance are scaled by 1, so they are only centred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Learn population mean/variance of every column.
    pub fn fit(x: &[Vec<f64>]) -> Result<Self> {
        if x.is_empty() {
            return Err(ForecastError::Input(
                "Cannot fit scaler on empty dataset".to_string(),
            ));
        }
        let n_features = check_columns(x)?;
        let n = x.len() as f64;

        let means: Vec<f64> = (0..n_features)
            .map(|j| x.iter().map(|row| row[j]).sum::<f64>() / n)
            .collect();

        let stds = means
            .iter()
            .enumerate()
            .map(|(j, mean)| {
                let var = x.iter().map(|row| (row[j] - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std < 1e-12 {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Ok(Self { means, stds })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(ForecastError::Input(format!(
                "Standardization parameter count mismatch: expected {}, got {}",
                self.n_features(),
                row.len()
            )));
        }

        Ok(row
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(value, (mean, std))| (value - mean) / std)
            .collect())
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        x.iter().map(|row| self.transform_row(row)).collect()
    }
}
