use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Settings for the undo history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// How many undo groups are kept.
    pub depth: usize,
    /// Milliseconds between edits after which a new undo group starts.
    pub new_group_delay: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            depth: 100,
            new_group_delay: 500,
        }
    }
}

impl HistoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "depth",
                reason: "must keep at least one undo group".to_string(),
            });
        }
        Ok(())
    }

    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let config: HistoryConfig =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;
        config.validate()?;

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/folio");
        PathBuf::from(config_dir.as_ref()).join("history.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_config_path() {
        let config_path = HistoryConfig::config_path();
        let path_str = config_path.to_string_lossy();

        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/folio/history.toml"));
    }

    #[test]
    fn test_defaults() {
        let config = HistoryConfig::default();
        assert_eq!(config.depth, 100);
        assert_eq!(config.new_group_delay, 500);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: HistoryConfig = toml::from_str("depth = 20\n").unwrap();
        assert_eq!(
            config,
            HistoryConfig {
                depth: 20,
                new_group_delay: 500,
            }
        );
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let original = HistoryConfig {
            depth: 7,
            new_group_delay: 1200,
        };

        let toml_str = toml::to_string(&original).unwrap();
        let deserialized: HistoryConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let non_existent_config = temp_dir.path().join("nonexistent.toml");

        let result = HistoryConfig::load_from_path(&non_existent_config).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested").join("history.toml");
        let test_config = HistoryConfig {
            depth: 3,
            new_group_delay: 250,
        };

        test_config.save_to_path(&config_file).unwrap();
        let loaded_config = HistoryConfig::load_from_path(&config_file).unwrap().unwrap();

        assert_eq!(loaded_config, test_config);
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("history.toml");
        std::fs::write(&config_file, "depth = 0\n").unwrap();

        let result = HistoryConfig::load_from_path(&config_file);

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "depth", .. })
        ));
    }

    #[test]
    fn test_unparseable_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("history.toml");
        std::fs::write(&config_file, "depth = \"lots\"\n").unwrap();

        let err = HistoryConfig::load_from_path(&config_file).unwrap_err();

        assert!(matches!(err, ConfigError::ConfigParseError { .. }));
        assert!(err.to_string().contains("history.toml"));
    }
}
