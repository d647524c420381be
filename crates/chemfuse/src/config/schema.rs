use serde::{Deserialize, Serialize};

use crate::quality::RuleSet;
use crate::store::{default_export_tasks, ExportTask};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Defaults to `~/.chemfuse/data/chemfuse.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub quality: RuleSet,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            jobs: JobsConfig::default(),
            recognition: RecognitionConfig::default(),
            review: ReviewConfig::default(),
            quality: RuleSet::default(),
            export: ExportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// How long finished jobs stay pollable, in seconds.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// `Expired` polls a caller tolerates before giving up on a job.
    #[serde(default = "default_expired_poll_tolerance")]
    pub expired_poll_tolerance: u32,
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_expired_poll_tolerance() -> u32 {
    3
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            expired_poll_tolerance: default_expired_poll_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Recognitions below this confidence are treated as absent.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Recognitions below this confidence are kept but reported.
    #[serde(default = "default_low_confidence")]
    pub low_confidence: f64,
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_low_confidence() -> f64 {
    0.7
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            low_confidence: default_low_confidence(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_tasks")]
    pub tasks: Vec<ExportTask>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            tasks: default_export_tasks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
