//! `taxmap.yaml` settings.
//!
//! Every key is optional; a missing or empty file yields the defaults.
//!
//! ```yaml
//! data:
//!   root: data
//! engine:
//!   floor_year: 2010
//!   cache_capacity: 256
//! defaults:
//!   fiscal_year: 2024
//!   entity: single
//! logging:
//!   level: info
//!   file: taxmap.log
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tax_core::EngineConfig;
use tax_core::config::current_fiscal_year;
use tax_core::models::EntityClass;
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "taxmap.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub data: DataConfig,
    pub engine: EngineConfig,
    pub defaults: DefaultsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Directory holding `rates/` and `scales/`.
    pub root: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Unset means the current calendar year.
    pub fiscal_year: Option<i32>,
    pub entity: EntityClass,
}

impl DefaultsConfig {
    pub fn fiscal_year(&self) -> i32 {
        self.fiscal_year.unwrap_or_else(current_fiscal_year)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Bare level or any `EnvFilter` directive.
    pub level: String,
    /// Log file, appended to. Unset means stderr only.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `explicit` when given (it must exist), otherwise
    /// [`DEFAULT_CONFIG_FILE`] when present, otherwise the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_gives_defaults() {
        let file = write_config("");

        let config = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.engine.floor_year, 2010);
        assert_eq!(config.data.root, PathBuf::from("data"));
        assert_eq!(config.defaults.entity, EntityClass::Single);
    }

    #[test]
    fn reads_every_section() {
        let file = write_config(
            "data:\n  root: /srv/estv\n\
             engine:\n  floor_year: 2015\n  cache_capacity: 32\n\
             defaults:\n  fiscal_year: 2023\n  entity: with_family\n\
             logging:\n  level: debug\n  file: taxmap.log\n",
        );

        let config = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(config.data.root, PathBuf::from("/srv/estv"));
        assert_eq!(
            config.engine,
            EngineConfig {
                floor_year: 2015,
                cache_capacity: 32,
            }
        );
        assert_eq!(config.defaults.fiscal_year(), 2023);
        assert_eq!(config.defaults.entity, EntityClass::WithFamily);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("taxmap.log")));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let file = write_config("engine:\n  cache_capacity: 8\n");

        let config = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(config.engine.cache_capacity, 8);
        assert_eq!(config.engine.floor_year, 2010);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("data:\n  root_dir: /srv/estv\n");

        let err = AppConfig::from_file(file.path()).expect_err("typo in key");

        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = AppConfig::load(Some(&dir.path().join("nope.yaml"))).expect_err("missing");

        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
