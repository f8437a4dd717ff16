/// Run configuration loader - parses fdnl.toml
///
/// Keeps input/output paths, the series range and run options out of the
/// code so a new catchment or season only needs a new config file.

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analysis::evaluation::EvaluationOptions;
use crate::ingest::tables::parse_timestamp;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "fdnl.toml";

/// Environment variable overriding the config location.
pub const CONFIG_ENV_VAR: &str = "FDNL_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("[series].{field} is not a valid timestamp: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("[series].step_minutes must be positive, got {0}")]
    InvalidStep(i64),
}

/// Input tables.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub reaches: PathBuf,
    pub observations: PathBuf,
    pub readings: PathBuf,
    /// Previously exported thresholds; when set, calibration can be skipped.
    pub thresholds: Option<PathBuf>,
}

/// Output files.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub thresholds: PathBuf,
    pub series: PathBuf,
    pub reach_states: Option<PathBuf>,
    pub evaluation: Option<PathBuf>,
}

/// FDNL series range as written in the file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeriesConfig {
    pub start: String,
    pub end: String,
    #[serde(default = "default_step_minutes")]
    pub step_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub resample: bool,
    pub seed: Option<u64>,
}

impl EvaluationConfig {
    pub fn options(&self) -> EvaluationOptions {
        EvaluationOptions {
            resample: self.resample,
            seed: self.seed,
        }
    }
}

/// Root of fdnl.toml.
#[derive(Debug, Clone, Deserialize)]
pub struct FdnlConfig {
    pub data: DataConfig,
    pub output: OutputConfig,
    pub series: SeriesConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Series range with parsed timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub step: Duration,
}

fn default_step_minutes() -> i64 {
    60
}

fn default_workers() -> usize {
    4
}

impl FdnlConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses and validates the `[series]` section.
    pub fn series_range(&self) -> Result<SeriesRange, ConfigError> {
        let start = parse_timestamp(&self.series.start).ok_or_else(|| ConfigError::InvalidTimestamp {
            field: "start",
            value: self.series.start.clone(),
        })?;
        let end = parse_timestamp(&self.series.end).ok_or_else(|| ConfigError::InvalidTimestamp {
            field: "end",
            value: self.series.end.clone(),
        })?;
        if self.series.step_minutes <= 0 {
            return Err(ConfigError::InvalidStep(self.series.step_minutes));
        }

        Ok(SeriesRange {
            start,
            end,
            step: Duration::minutes(self.series.step_minutes),
        })
    }
}

/// Loads the run configuration from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FdnlConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FdnlConfig::parse(&contents, path)
}

/// Resolves the config location: `FDNL_CONFIG` (a `.env` file is honoured),
/// otherwise `fdnl.toml` in the working directory.
pub fn config_path() -> PathBuf {
    dotenv::dotenv().ok();
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_config_default() -> Result<FdnlConfig, ConfigError> {
    load_config(config_path())
}
