//! Engine configuration.
//!
//! Config structs are serde-deserializable (TOML in practice) and every
//! tunable is an `Option` with an `effective_*()` accessor supplying the
//! default. A flat properties-style key/value surface
//! (`filter.ignore.patterns` etc.) layers on top for callers that carry
//! key/value config files.

mod filter_config;
mod pipeline_config;

pub use filter_config::{FilterConfig, DEFAULT_NOISE_PATTERNS};
pub use pipeline_config::PipelineConfig;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Top-level configuration for one analysis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub filter: FilterConfig,
    pub pipeline: PipelineConfig,
}

impl AnalysisConfig {
    /// Parse from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Apply one properties-style override.
    ///
    /// Recognized keys: `filter.ignore.patterns` (replaces the default noise
    /// set), `filter.ignore.add` (union), `filter.ignore.remove`
    /// (difference). Values are comma-separated substring lists.
    pub fn apply_property(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let split = |v: &str| -> Vec<String> {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };
        match key {
            "filter.ignore.patterns" => self.filter.patterns = Some(split(value)),
            "filter.ignore.add" => self.filter.add = split(value),
            "filter.ignore.remove" => self.filter.remove = split(value),
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Apply a batch of properties-style overrides.
    pub fn apply_properties<'a, I>(&mut self, properties: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in properties {
            self.apply_property(key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_round_trip() {
        let config = AnalysisConfig::from_toml_str(
            r#"
            [filter]
            add = ["myNoisyCommand"]

            [pipeline]
            chunk_size = 1000
            workers = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.effective_chunk_size(), 1000);
        assert_eq!(config.pipeline.effective_workers(), 2);
        assert!(config
            .filter
            .effective_patterns()
            .iter()
            .any(|p| p == "myNoisyCommand"));
    }

    #[test]
    fn properties_surface() {
        let mut config = AnalysisConfig::default();
        config
            .apply_properties([
                ("filter.ignore.patterns", "alpha, beta"),
                ("filter.ignore.add", "gamma"),
                ("filter.ignore.remove", "beta"),
            ])
            .unwrap();
        let patterns = config.filter.effective_patterns();
        assert_eq!(patterns, vec!["alpha".to_string(), "gamma".to_string()]);
    }

    #[test]
    fn unknown_property_key_rejected() {
        let mut config = AnalysisConfig::default();
        let err = config.apply_property("filter.bogus", "x").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { .. }));
    }
}
