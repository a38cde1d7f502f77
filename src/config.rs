use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::detection::DetectionOptions;
use crate::errors::DetectionError;
use crate::logging::LoggingConfig;
use crate::settings::DetectionSettings;

/// Detection section of config.toml
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionTomlConfig {
    /// Fraction of transactions to analyze (default: 1.0)
    pub sample_rate: f64,
    pub settings: DetectionSettings,
}

impl Default for DetectionTomlConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1.0,
            settings: DetectionSettings::default(),
        }
    }
}

/// Logging section of config.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingTomlConfig {
    pub level_filter: Option<String>,
    pub json_format: Option<bool>,
    pub with_target: Option<bool>,
}

/// Full TOML configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detection: DetectionTomlConfig,
    #[serde(default)]
    pub logging: LoggingTomlConfig,
}

impl AppConfig {
    /// Parse and validate a config.toml body
    pub fn from_toml_str(contents: &str) -> Result<Self, DetectionError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config.toml from disk
    pub fn load(path: &Path) -> Result<Self, DetectionError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!(
            path = %path.display(),
            sample_rate = config.detection.sample_rate,
            "📋 Loaded detection configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DetectionError> {
        let rate = self.detection.sample_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(DetectionError::InvalidSettings(format!(
                "sample_rate must be within [0, 1] (got {})",
                rate
            )));
        }
        self.detection.settings.validate()
    }

    pub fn detection_options(&self) -> DetectionOptions {
        DetectionOptions {
            sample_rate: self.detection.sample_rate,
            settings: self.detection.settings.clone(),
        }
    }

    /// Logging config with TOML values layered over the defaults
    pub fn logging_config(&self) -> LoggingConfig {
        let defaults = LoggingConfig::default();
        LoggingConfig {
            level_filter: self.logging.level_filter.clone().unwrap_or(defaults.level_filter),
            json_format: self.logging.json_format.unwrap_or(defaults.json_format),
            with_target: self.logging.with_target.unwrap_or(defaults.with_target),
        }
    }
}
