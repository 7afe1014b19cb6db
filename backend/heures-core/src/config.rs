// src/config.rs
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;

use crate::model::DEFAULT_PLANNED_HOURS;

pub const DEFAULT_DATA_FILE: &str = "heures_data.json";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Process configuration, read from `HEURES_*` environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    #[serde(default = "default_planned_hours")]
    pub default_planned_hours: Decimal,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_file() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_FILE)
}

fn default_planned_hours() -> Decimal {
    DEFAULT_PLANNED_HOURS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            default_planned_hours: default_planned_hours(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    /// Builds the configuration from explicit key/value pairs.
    pub fn from_iter<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::prefixed("HEURES_").from_iter::<_, AppConfig>(vars)?;
        if config.default_planned_hours.is_sign_negative() {
            return Err(envy::Error::Custom(format!(
                "HEURES_DEFAULT_PLANNED_HOURS must not be negative (got {})",
                config.default_planned_hours
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = AppConfig::from_iter(vars(&[("PATH", "/usr/bin")])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.default_planned_hours, dec!(24));
    }

    #[test]
    fn prefixed_variables_override_defaults() {
        let config = AppConfig::from_iter(vars(&[
            ("HEURES_DATA_FILE", "/tmp/store.json"),
            ("HEURES_DEFAULT_PLANNED_HOURS", "30.5"),
            ("HEURES_LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.data_file, PathBuf::from("/tmp/store.json"));
        assert_eq!(config.default_planned_hours, dec!(30.5));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn negative_default_hours_are_rejected() {
        let result = AppConfig::from_iter(vars(&[("HEURES_DEFAULT_PLANNED_HOURS", "-4")]));
        assert!(result.is_err());
    }
}
