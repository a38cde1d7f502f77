use thiserror::Error;

/// Errors surfaced by the detection pipeline.
///
/// None of these ever escape [`crate::detection::PerformanceDetection::analyze`]; the
/// facade logs them and reports "no issues".
#[derive(Error, Debug)]
pub enum DetectionError {
    /// A threshold group failed validation
    #[error("Invalid detection settings: {0}")]
    InvalidSettings(String),

    /// config.toml could not be parsed
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Event payload could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus registration failure
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A detector panicked mid-pass
    #[error("Detection panicked: {0}")]
    Panicked(String),
}

impl DetectionError {
    /// Short label used for error counters and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            DetectionError::InvalidSettings(_) => "invalid_settings",
            DetectionError::Config(_) => "config",
            DetectionError::Json(_) => "json",
            DetectionError::Io(_) => "io",
            DetectionError::Metrics(_) => "metrics",
            DetectionError::Panicked(_) => "panicked",
        }
    }
}

/// Build an [`DetectionError::InvalidSettings`] with a detector key prefix
pub fn invalid_settings(detector_key: &str, reason: impl std::fmt::Display) -> DetectionError {
    DetectionError::InvalidSettings(format!("{}: {}", detector_key, reason))
}
