// Settings data models
use crate::file_manager::{read_json_file_or_default, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid setting: {0}")]
    Invalid(String),

    #[error("Failed to load settings: {0}")]
    Load(#[from] StoreError),
}

fn default_max_concurrent_tasks() -> usize {
    num_cpus::get().max(1)
}

fn default_task_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_arm_length() -> u32 {
    18
}

fn default_spacer_min() -> u32 {
    14
}

fn default_spacer_max() -> u32 {
    18
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: u32,
    /// Cap on predictor calls in flight across all jobs
    #[serde(default)]
    pub global_predictor_limit: Option<usize>,
    #[serde(default = "default_arm_length")]
    pub arm_length: u32,
    #[serde(default = "default_spacer_min")]
    pub spacer_min: u32,
    #[serde(default = "default_spacer_max")]
    pub spacer_max: u32,
    /// argv of an external predictor, run once per variant
    #[serde(default)]
    pub predictor_command: Option<Vec<String>>,
    #[serde(default)]
    pub jobs_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            task_timeout_ms: default_task_timeout_ms(),
            max_retries: 0,
            global_predictor_limit: None,
            arm_length: default_arm_length(),
            spacer_min: default_spacer_min(),
            spacer_max: default_spacer_max(),
            predictor_command: None,
            jobs_path: None,
        }
    }
}

impl Settings {
    /// Load from a JSON file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = read_json_file_or_default(path)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.global_predictor_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "global_predictor_limit must be at least 1".to_string(),
            ));
        }
        if self.arm_length == 0 {
            return Err(ConfigError::Invalid("arm_length must be at least 1".to_string()));
        }
        if self.spacer_min > self.spacer_max {
            return Err(ConfigError::Invalid(format!(
                "spacer_min ({}) exceeds spacer_max ({})",
                self.spacer_min, self.spacer_max
            )));
        }
        if let Some(command) = &self.predictor_command {
            if command.is_empty() {
                return Err(ConfigError::Invalid("predictor_command is empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.max_concurrent_tasks >= 1);
        assert_eq!(settings.task_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"max_concurrent_tasks": 2, "task_timeout_ms": null}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.max_concurrent_tasks, 2);
        assert_eq!(settings.task_timeout(), None);
        assert_eq!(settings.spacer_max, 18);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let settings = Settings {
            max_concurrent_tasks: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_inverted_spacer_rejected() {
        let settings = Settings {
            spacer_min: 20,
            spacer_max: 12,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
