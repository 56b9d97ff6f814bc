//! Lake Kariba water-level forecasting.
//!
//! A stacked ensemble (random forest, gradient boosting and an RBF support
//! vector regressor combined by least squares) is trained on calendar and
//! lagged-level features, then rolled forward one day at a time.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ingest;
pub mod ml;
pub mod service;
pub mod telemetry;

pub use error::{ForecastError, Result};
