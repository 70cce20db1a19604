//! Configuration for the motion agent.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Window and aggregation parameters for the two analysis stages
    pub analysis: AnalysisConfig,

    /// Port the transport server binds to
    pub port: u16,

    /// Path for the session store and statistics
    pub data_path: PathBuf,

    /// Directory holding classifier artifacts
    pub classifier_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("athlete-motion-agent");

        Self {
            analysis: AnalysisConfig::default(),
            port: 8080,
            classifier_path: data_dir.join("classifiers"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit file, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `config_path`.
    pub fn save_to(&self, config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("athlete-motion-agent")
            .join("config.json")
    }

    /// Directory of the durable session store.
    pub fn sessions_path(&self) -> PathBuf {
        self.data_path.join("sessions")
    }

    /// Path of the persisted ingestion statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Directory of event-detection model artifacts.
    pub fn event_detection_models(&self) -> PathBuf {
        self.classifier_path.join("event_detection")
    }

    /// Directory of type-classification model artifacts.
    pub fn type_classification_models(&self) -> PathBuf {
        self.classifier_path.join("type_classification")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [
            self.sessions_path(),
            self.event_detection_models(),
            self.type_classification_models(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }
}

/// How the type stage compresses a chunk of readings into 9 values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Mean,
    Max,
    Min,
}

impl Aggregation {
    /// Parse an aggregation name; anything unrecognised means the mean.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "max" => Aggregation::Max,
            "min" => Aggregation::Min,
            _ => Aggregation::Mean,
        }
    }
}

/// Window sizes and intervals for the event-detection and type stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Readings in an event-detection window
    pub bool_window_size: usize,
    /// Event detection runs every `bool_interval` readings
    pub bool_interval: usize,
    /// Readings in a type-classification window
    pub type_window_size: usize,
    /// Chunk size for type-stage aggregation
    pub type_interval: usize,
    pub aggregation: Aggregation,
    /// Also gate the type stage on `count % type_interval == 0`
    #[serde(default)]
    pub type_periodic_gate: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bool_window_size: 150,
            bool_interval: 75,
            type_window_size: 150,
            type_interval: 10,
            aggregation: Aggregation::Mean,
            type_periodic_gate: false,
        }
    }
}

impl AnalysisConfig {
    /// Reject parameters that would make window evaluation meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("bool_window_size", self.bool_window_size),
            ("bool_interval", self.bool_interval),
            ("type_window_size", self.type_window_size),
            ("type_interval", self.type_interval),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidAnalysis {
                    field,
                    reason: "must be a positive integer".to_string(),
                });
            }
        }

        // The anchor sits at floor(N/2) - 1.
        if self.type_window_size < 2 {
            return Err(ConfigError::InvalidAnalysis {
                field: "type_window_size",
                reason: "must be at least 2".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidAnalysis { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidAnalysis { field, reason } => {
                write!(f, "Invalid analysis setting {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
