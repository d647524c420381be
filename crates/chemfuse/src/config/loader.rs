use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::quality::FieldRule;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let recognition = &config.recognition;
    for (name, value) in [
        ("min_confidence", recognition.min_confidence),
        ("low_confidence", recognition.low_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation {
                message: format!("recognition.{} must be within [0, 1], got {}", name, value),
            });
        }
    }
    if recognition.min_confidence > recognition.low_confidence {
        return Err(ConfigError::Validation {
            message: "recognition.min_confidence must not exceed recognition.low_confidence"
                .to_string(),
        });
    }

    if config.jobs.retention_secs == 0 {
        return Err(ConfigError::Validation {
            message: "jobs.retention_secs must be positive".to_string(),
        });
    }

    validate_rules(&config.quality.photophysics)?;
    validate_rules(&config.quality.device)?;

    let mut task_names = HashSet::new();
    for task in &config.export.tasks {
        if !task_names.insert(task.name.as_str()) {
            return Err(ConfigError::InvalidExportTask {
                name: task.name.clone(),
                reason: "Duplicate task name".to_string(),
            });
        }
        let unknown = task.unknown_fields();
        if !unknown.is_empty() {
            return Err(ConfigError::InvalidExportTask {
                name: task.name.clone(),
                reason: format!("unknown {} fields: {}", task.kind, unknown.join(", ")),
            });
        }
    }

    Ok(())
}

fn validate_rules<F: Copy + fmt::Display>(rules: &[FieldRule<F>]) -> Result<(), ConfigError> {
    let mut fields = HashSet::new();
    for rule in rules {
        let field = rule.field.to_string();
        if let Some(reason) = rule.consistency_error() {
            return Err(ConfigError::InvalidRule { field, reason });
        }
        if !fields.insert(field.clone()) {
            return Err(ConfigError::InvalidRule {
                field,
                reason: "Duplicate rule for field".to_string(),
            });
        }
    }
    Ok(())
}
