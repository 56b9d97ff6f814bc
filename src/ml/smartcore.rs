//! SmartCore tree ensembles
//!
//! Bagged trees via SmartCore's `RandomForestRegressor`, and gradient boosting
//! built from SmartCore's `DecisionTreeRegressor` fitted on residuals.

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use super::{check_columns, check_training_data, ModelType, Regressor};
use crate::error::{ForecastError, Result};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Row-major rows to a SmartCore matrix.
pub fn to_dense_matrix(x: &[Vec<f64>]) -> Result<DenseMatrix<f64>> {
    let n_features = check_columns(x)?;
    let mut flat_data = Vec::with_capacity(x.len() * n_features);
    for row in x {
        flat_data.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(x.len(), n_features, flat_data, false))
}

/// Bagged decision tree settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: Some(20),
            seed: 42,
        }
    }
}

/// Random forest regressor
pub struct RandomForestModel {
    model: Forest,
    pub params: ForestParams,
}

impl RandomForestModel {
    /// Every split considers all features and leaves may hold a single sample.
    fn smartcore_parameters(params: &ForestParams, n_features: usize) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: params.max_depth,
            min_samples_leaf: 1,
            min_samples_split: 2,
            n_trees: params.n_trees,
            m: Some(n_features),
            keep_samples: false,
            seed: params.seed,
        }
    }

    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Result<Self> {
        let n_features = check_training_data(x, y)?;
        if params.n_trees == 0 {
            return Err(ForecastError::Input("Forest needs at least one tree".to_string()));
        }

        let x_matrix = to_dense_matrix(x)?;
        let y_vec = y.to_vec();

        let model = RandomForestRegressor::fit(
            &x_matrix,
            &y_vec,
            Self::smartcore_parameters(params, n_features),
        )
        .map_err(|e| ForecastError::Training(format!("RandomForest training failed: {:?}", e)))?;

        Ok(Self {
            model,
            params: params.clone(),
        })
    }
}

impl Regressor for RandomForestModel {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if x.is_empty() {
            return Ok(Vec::new());
        }
        self.model
            .predict(&to_dense_matrix(x)?)
            .map_err(|e| ForecastError::Training(format!("RandomForest prediction failed: {:?}", e)))
    }

    fn model_type(&self) -> ModelType {
        ModelType::RandomForest
    }
}

/// Boosted decision tree settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_trees: usize,
    pub max_depth: u16,
    pub learning_rate: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 5,
            learning_rate: 0.1,
        }
    }
}

/// Least-squares gradient boosting: starts from the target mean and adds
/// shrunken trees fitted to the current residuals.
pub struct GradientBoostingModel {
    init: f64,
    trees: Vec<Tree>,
    pub params: BoostingParams,
}

impl GradientBoostingModel {
    fn tree_parameters(&self) -> DecisionTreeRegressorParameters {
        DecisionTreeRegressorParameters::default().with_max_depth(self.params.max_depth)
    }

    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &BoostingParams) -> Result<Self> {
        check_training_data(x, y)?;
        if !(params.learning_rate > 0.0 && params.learning_rate <= 1.0) {
            return Err(ForecastError::Input(format!(
                "learning_rate must be in (0, 1], got {}",
                params.learning_rate
            )));
        }

        let x_matrix = to_dense_matrix(x)?;
        let init = y.iter().sum::<f64>() / y.len() as f64;

        let mut model = Self {
            init,
            trees: Vec::with_capacity(params.n_trees),
            params: params.clone(),
        };

        let mut current = vec![init; y.len()];
        for stage in 0..params.n_trees {
            let residuals: Vec<f64> = y.iter().zip(current.iter()).map(|(t, p)| t - p).collect();

            let tree = Tree::fit(&x_matrix, &residuals, model.tree_parameters()).map_err(|e| {
                ForecastError::Training(format!("Boosting stage {} failed: {:?}", stage, e))
            })?;
            let update = tree.predict(&x_matrix).map_err(|e| {
                ForecastError::Training(format!("Boosting stage {} prediction failed: {:?}", stage, e))
            })?;

            for (value, step) in current.iter_mut().zip(update.iter()) {
                *value += params.learning_rate * step;
            }
            model.trees.push(tree);
        }

        Ok(model)
    }

    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoostingModel {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if x.is_empty() {
            return Ok(Vec::new());
        }
        let x_matrix = to_dense_matrix(x)?;
        let mut out = vec![self.init; x.len()];

        for tree in &self.trees {
            let update = tree.predict(&x_matrix).map_err(|e| {
                ForecastError::Training(format!("Boosting prediction failed: {:?}", e))
            })?;
            for (value, step) in out.iter_mut().zip(update.iter()) {
                *value += self.params.learning_rate * step;
            }
        }

        Ok(out)
    }

    fn model_type(&self) -> ModelType {
        ModelType::GradientBoosting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // y = 2x1 + 3x2
    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = vec![
            vec![1.0, 1.0],
            vec![2.0, 1.0],
            vec![1.0, 2.0],
            vec![2.0, 2.0],
            vec![3.0, 3.0],
            vec![4.0, 2.0],
            vec![2.0, 4.0],
            vec![3.0, 1.0],
            vec![1.0, 3.0],
            vec![4.0, 4.0],
        ];
        let y = x.iter().map(|r| 2.0 * r[0] + 3.0 * r[1]).collect();
        (x, y)
    }

    #[test]
    fn test_forest_default_parameters() {
        let params = ForestParams::default();
        assert_eq!(params.n_trees, 200);
        assert_eq!(params.max_depth, Some(20));
        assert_eq!(params.seed, 42);

        let sc = RandomForestModel::smartcore_parameters(&params, 6);
        assert_eq!(sc.m, Some(6));
        assert!(!sc.keep_samples);
    }

    #[test]
    fn test_train_random_forest() {
        let (x, y) = linear_data();
        let params = ForestParams {
            n_trees: 10,
            max_depth: Some(5),
            seed: 7,
        };

        let model = RandomForestModel::fit(&x, &y, &params).unwrap();
        let predictions = model.predict(&x).unwrap();

        assert_eq!(predictions.len(), 10);
        let (min, max) = (5.0, 20.0);
        assert!(predictions.iter().all(|p| *p >= min && *p <= max));
    }

    #[test]
    fn test_random_forest_is_seeded() {
        let (x, y) = linear_data();
        let params = ForestParams {
            n_trees: 8,
            max_depth: Some(4),
            seed: 42,
        };

        let a = RandomForestModel::fit(&x, &y, &params).unwrap().predict(&x).unwrap();
        let b = RandomForestModel::fit(&x, &y, &params).unwrap().predict(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_boosting_fits_training_data() {
        let (x, y) = linear_data();
        let model = GradientBoostingModel::fit(&x, &y, &BoostingParams::default()).unwrap();
        assert_eq!(model.n_stages(), 200);

        let predictions = model.predict(&x).unwrap();
        for (p, t) in predictions.iter().zip(y.iter()) {
            assert!((p - t).abs() < 0.5, "pred={} target={}", p, t);
        }
    }

    #[test]
    fn test_boosting_without_stages_predicts_mean() {
        let (x, y) = linear_data();
        let params = BoostingParams {
            n_trees: 0,
            ..Default::default()
        };
        let model = GradientBoostingModel::fit(&x, &y, &params).unwrap();
        let mean = y.iter().sum::<f64>() / y.len() as f64;

        assert!(model.predict(&x).unwrap().iter().all(|p| (p - mean).abs() < 1e-12));
    }

    #[test]
    fn test_boosting_rejects_bad_learning_rate() {
        let (x, y) = linear_data();
        let params = BoostingParams {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            GradientBoostingModel::fit(&x, &y, &params),
            Err(ForecastError::Input(_))
        ));
    }

    #[test]
    fn test_empty_prediction_input() {
        let (x, y) = linear_data();
        let model = GradientBoostingModel::fit(&x, &y, &BoostingParams::default()).unwrap();
        assert!(model.predict(&[]).unwrap().is_empty());
    }
}
