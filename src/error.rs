use thiserror::Error;

/// Errors raised by the feature pipeline, the ensemble and the forecaster.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    /// Malformed or unparseable dates/targets, or a series that is not ascending.
    #[error("Data error: {0}")]
    Data(String),

    #[error("Insufficient data: {required} rows required, {available} available")]
    InsufficientData { required: usize, available: usize },

    /// Operation is not valid in the forecaster's current state.
    #[error("State error: {0}")]
    State(String),

    /// Empty or malformed caller input (seed rows, step counts, missing targets).
    #[error("Input error: {0}")]
    Input(String),

    /// A base or meta regressor failed inside its fitting routine.
    #[error("Training error: {0}")]
    Training(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
