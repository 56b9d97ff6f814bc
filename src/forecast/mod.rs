pub mod engine;
pub mod features;
pub mod metrics;

pub use engine::{CancelFlag, ForecastOptions, LagUpdate, RecursiveForecaster};
pub use features::FeaturePipeline;
pub use metrics::{ForecastMetrics, ForecastMetricsError};
