use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "CONFIG_IO",
            ConfigError::Parse { .. } => "CONFIG_PARSE",
            ConfigError::Invalid(_) => "CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    /// Minor units per major unit, as a power of ten
    #[serde(default = "default_currency_decimals")]
    pub currency_decimals: u32,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub accrual: AccrualConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

fn default_currency_decimals() -> u32 {
    2
}

/// Transfer scheduler settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Transfers executed at once within one tick
    pub max_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}

/// Savings accrual settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccrualConfig {
    /// Days per year in the daily rate (365 or 360)
    pub day_count_basis: u32,
    pub max_concurrency: usize,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            day_count_basis: 365,
            max_concurrency: 8,
        }
    }
}

/// Periodic driver settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DriverConfig {
    pub tick_interval_secs: u64,
    /// CSV journal of posted entries, appended after every tick
    #[serde(default)]
    pub journal_path: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 86_400,
            journal_path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_string(),
                message,
            },
            other => other,
        })
    }

    /// `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(&format!("config/{}.yaml", env))
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.accrual.day_count_basis == 0 {
            return Err(ConfigError::Invalid("accrual.day_count_basis must be positive".into()));
        }
        if self.driver.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid("driver.tick_interval_secs must be positive".into()));
        }
        if self.currency_decimals > 18 {
            return Err(ConfigError::Invalid(format!(
                "currency_decimals {} exceeds 18",
                self.currency_decimals
            )));
        }
        Ok(())
    }
}
