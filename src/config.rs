use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::forecast::{ForecastOptions, LagUpdate};
use crate::ml::EnsembleParams;

pub const CONFIG_FILE: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "KARIBA__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub ensemble: EnsembleParams,
    pub forecast: ForecastConfig,
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 120,
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Where the historical water level series lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub lake_csv: PathBuf,
    pub date_column: String,
    pub target_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            lake_csv: PathBuf::from("data/lake.csv"),
            date_column: "date".to_string(),
            target_column: "Target_height_variation".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub default_steps: usize,
    pub max_steps: usize,
    pub lag_update: LagUpdate,
    pub recompute_full_buffer: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_steps: 365,
            max_steps: 3650,
            lag_update: LagUpdate::default(),
            recompute_full_buffer: true,
        }
    }
}

impl ForecastConfig {
    pub fn options(&self) -> ForecastOptions {
        ForecastOptions {
            lag_update: self.lag_update,
            recompute_full_buffer: self.recompute_full_buffer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// TOML file (if present) overridden by `KARIBA__SECTION__KEY` environment
    /// variables. Anything unset keeps its `Default` value.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.forecast.max_steps == 0 {
            anyhow::bail!("forecast.max_steps must be at least 1");
        }
        if self.forecast.default_steps == 0 || self.forecast.default_steps > self.forecast.max_steps {
            anyhow::bail!(
                "forecast.default_steps must be in 1..={}, got {}",
                self.forecast.max_steps,
                self.forecast.default_steps
            );
        }
        if !(self.evaluation.test_ratio > 0.0 && self.evaluation.test_ratio < 1.0) {
            anyhow::bail!(
                "evaluation.test_ratio must be between 0 and 1, got {}",
                self.evaluation.test_ratio
            );
        }
        Ok(())
    }
}
