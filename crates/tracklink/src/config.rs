//! # Runtime Configuration
//!
//! Loaded once at startup from TOML. Every section and field is optional;
//! omitted values take the library defaults.
//!
//! ```toml
//! [region]
//! name = "tracklink_sensor_state"
//! backend = "os"          # or "in_process"
//! open_attempts = 3
//!
//! [prediction]
//! max_prediction_dt = 0.1
//! slope = 0.2
//!
//! [latency]
//! csv_dir = "/var/log/tracklink"
//!
//! [logging]
//! filter = "info,tracklink_core=debug"
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracklink_core::{RegionFactory, DEFAULT_ATTEMPTS};
use tracklink_latency::{AggregatorConfig, DEFAULT_EPOCH_SECONDS, DEFAULT_RESET_LIMIT_SECONDS};
use tracklink_shared::{
    DEFAULT_REGION_NAME, MAX_PREDICTION_DT, MIN_ANGULAR_SPEED, PREDICTION_LINEAR_COEFFICIENT,
    PREDICTION_SLOPE,
};
use tracklink_tracking::PredictiveFilter;

/// Default number of open/create attempts per region.
pub const DEFAULT_OPEN_ATTEMPTS: u32 = DEFAULT_ATTEMPTS;

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("config {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Convenience alias.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which region backend the factory uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Named OS shared memory, visible to other processes.
    #[default]
    Os,
    /// Heap blocks inside this process, for debugging without OS objects.
    InProcess,
}

/// `[region]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Region name shared by writer and readers.
    pub name: String,
    /// Backend selection.
    pub backend: BackendKind,
    /// Open/create attempts before giving up.
    pub open_attempts: u32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_REGION_NAME.to_owned(),
            backend: BackendKind::Os,
            open_attempts: DEFAULT_OPEN_ATTEMPTS,
        }
    }
}

impl RegionConfig {
    /// Factory for the configured backend.
    #[must_use]
    pub fn factory(&self) -> RegionFactory {
        let factory = match self.backend {
            BackendKind::Os => RegionFactory::platform(),
            BackendKind::InProcess => RegionFactory::in_process(),
        };
        factory.with_attempts(self.open_attempts)
    }
}

/// `[prediction]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Upper bound on the prediction interval, seconds.
    pub max_prediction_dt: f64,
    /// Seconds of horizon per unit of combined speed.
    pub slope: f64,
    /// Weight of linear speed against angular speed.
    pub linear_coefficient: f64,
    /// Angular speed below which rotation is not extrapolated.
    pub min_angular_speed: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            max_prediction_dt: MAX_PREDICTION_DT,
            slope: PREDICTION_SLOPE,
            linear_coefficient: PREDICTION_LINEAR_COEFFICIENT,
            min_angular_speed: MIN_ANGULAR_SPEED,
        }
    }
}

impl PredictionConfig {
    /// Filter with these tuning values.
    #[must_use]
    pub fn filter(&self) -> PredictiveFilter {
        PredictiveFilter::new(self.slope, self.linear_coefficient, self.min_angular_speed)
    }
}

/// `[latency]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Statistics epoch, seconds.
    pub epoch_seconds: f64,
    /// Inactivity gap that discards a partial epoch, seconds.
    pub reset_limit_seconds: f64,
    /// Directory for the CSV log. No log when absent.
    pub csv_dir: Option<PathBuf>,
    /// CSV file name inside `csv_dir`.
    pub csv_file: String,
    /// Free text written to the `UserData1` column.
    pub user_data1: String,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            epoch_seconds: DEFAULT_EPOCH_SECONDS,
            reset_limit_seconds: DEFAULT_RESET_LIMIT_SECONDS,
            csv_dir: None,
            csv_file: "latency.csv".to_owned(),
            user_data1: String::new(),
        }
    }
}

impl LatencyConfig {
    /// Epoch timing for the aggregator.
    #[must_use]
    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            epoch_seconds: self.epoch_seconds,
            reset_limit_seconds: self.reset_limit_seconds,
        }
    }
}

/// `[logging]`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
        }
    }
}

/// Complete runtime configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackLinkConfig {
    /// Shared region.
    pub region: RegionConfig,
    /// Pose prediction.
    pub prediction: PredictionConfig,
    /// Latency statistics.
    pub latency: LatencyConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl TrackLinkConfig {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// `Io` if unreadable, `Parse` for bad TOML, `Invalid` for bad values.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads `path` when given, defaults otherwise.
    ///
    /// # Errors
    ///
    /// As [`load`](Self::load).
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// `Parse` for bad TOML, `Invalid` for bad values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks across all sections.
    ///
    /// # Errors
    ///
    /// `Invalid` naming the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.region.name.is_empty() {
            return Err(ConfigError::Invalid("region.name is empty".into()));
        }
        if self.region.open_attempts == 0 {
            return Err(ConfigError::Invalid("region.open_attempts must be at least 1".into()));
        }

        let prediction = &self.prediction;
        for (key, value) in [
            ("prediction.max_prediction_dt", prediction.max_prediction_dt),
            ("prediction.slope", prediction.slope),
            ("prediction.linear_coefficient", prediction.linear_coefficient),
            ("prediction.min_angular_speed", prediction.min_angular_speed),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be a non-negative number, got {value}"
                )));
            }
        }

        self.latency
            .aggregator()
            .validate()
            .map_err(|error| ConfigError::Invalid(format!("latency: {error}")))?;
        if self.latency.csv_file.is_empty() {
            return Err(ConfigError::Invalid("latency.csv_file is empty".into()));
        }
        Ok(())
    }
}
