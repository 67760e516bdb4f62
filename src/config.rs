//! Run configuration of the console programs, read from the environment.
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use serde_json;
use tracing_subscriber::EnvFilter;

use super::models::factorization::Hyperparameters;

const DATA_DIR: &str = "MFREC_DATA_DIR";
const HYPERPARAMETERS: &str = "MFREC_HYPERPARAMETERS";
const MODEL_PATH: &str = "MFREC_MODEL_PATH";
const TRIALS: &str = "MFREC_TRIALS";

/// Configuration error types.
#[derive(Debug, Fail)]
pub enum ConfigError {
    /// The hyperparameter file cannot be opened.
    #[fail(display = "Cannot open hyperparameter file {}: {}", path, error)]
    Io {
        /// Path of the hyperparameter file.
        path: String,
        /// Underlying I/O error.
        #[cause]
        error: ::std::io::Error,
    },
    /// The hyperparameter file is not valid JSON hyperparameters.
    #[fail(display = "Invalid hyperparameter file {}: {}", path, error)]
    Format {
        /// Path of the hyperparameter file.
        path: String,
        /// Underlying parse error.
        #[cause]
        error: serde_json::Error,
    },
    /// A variable holds an unusable value.
    #[fail(display = "Invalid value {:?} for {}", value, key)]
    InvalidValue {
        /// Name of the variable.
        key: String,
        /// The offending value.
        value: String,
    },
}

/// Settings shared by the console programs.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// Directory holding the input files.
    pub data_dir: PathBuf,
    /// JSON file replacing the program's built-in hyperparameters.
    pub hyperparameters_path: Option<PathBuf>,
    /// Where to save the fitted predictor, if anywhere.
    pub model_path: Option<PathBuf>,
    /// Number of hyperparameter search trials.
    pub num_trials: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            data_dir: PathBuf::from("data"),
            hyperparameters_path: None,
            model_path: None,
            num_trials: 20,
        }
    }
}

impl RunConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        RunConfig::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable
    /// name to its value. Unset or empty variables keep their defaults.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let mut config = RunConfig::default();

        if let Some(data_dir) = lookup(DATA_DIR) {
            config.data_dir = PathBuf::from(data_dir);
        }
        config.hyperparameters_path = lookup(HYPERPARAMETERS).map(PathBuf::from);
        config.model_path = lookup(MODEL_PATH).map(PathBuf::from);

        if let Some(value) = lookup(TRIALS) {
            config.num_trials = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: TRIALS.to_owned(),
                value: value.clone(),
            })?;
        }

        Ok(config)
    }

    /// The hyperparameters from the configured file, or `default` when
    /// no file is configured.
    pub fn hyperparameters(&self, default: Hyperparameters) -> Result<Hyperparameters, ConfigError> {
        let path = match self.hyperparameters_path {
            Some(ref path) => path.display().to_string(),
            None => return Ok(default),
        };

        let file = File::open(&path).map_err(|error| ConfigError::Io {
            path: path.clone(),
            error,
        })?;
        let hyper = serde_json::from_reader(BufReader::new(file)).map_err(|error| {
            ConfigError::Format {
                path: path.clone(),
                error,
            }
        })?;

        info!(path = %path, "Loaded hyperparameters");

        Ok(hyper)
    }
}

/// Install the global `tracing` subscriber, filtered by `RUST_LOG`
/// (defaulting to `info`). Does nothing if a subscriber is already set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
