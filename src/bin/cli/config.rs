use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named set of engine overrides, loaded from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    pub database: Option<PathBuf>,
    pub cache_root: Option<PathBuf>,
    pub thumbnail_memory_capacity: Option<usize>,
    pub preview_memory_capacity: Option<usize>,
    pub thumbnail_concurrency: Option<usize>,
    pub preview_concurrency: Option<usize>,
    pub scan_batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    default_profile: Option<String>,
    #[serde(default)]
    profiles: HashMap<String, Profile>,
}

/// Loaded CLI configuration: the parsed TOML file plus its named profiles.
#[derive(Debug, Default)]
pub struct CliConfig {
    data: RawConfig,
}

impl CliConfig {
    /// Loads configuration from `explicit`, falling back to the default
    /// per-user config path, falling back to an empty configuration if
    /// neither exists.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
                toml::from_str(&raw).map_err(|e| ConfigError::Parse(path.clone(), e))?
            }
            _ => RawConfig::default(),
        };
        Ok(Self { data })
    }

    /// The profile named `name`, if configured.
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.data.profiles.get(name)
    }

    /// The configured default profile name, if any and if it exists.
    pub fn default_profile_name(&self) -> Option<&str> {
        self.data
            .default_profile
            .as_deref()
            .filter(|name| self.data.profiles.contains_key(*name))
    }
}

/// Failures loading or parsing the CLI's TOML config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("photocat").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_empty_config() {
        let config = CliConfig::load(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert!(config.default_profile_name().is_none());
    }

    #[test]
    fn parses_profiles_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            default_profile = "low-memory"

            [profiles.low-memory]
            thumbnail_memory_capacity = 40
            scan_batch_size = 25
            "#,
        )
        .unwrap();
        let config = CliConfig::load(Some(path)).unwrap();
        assert_eq!(config.default_profile_name(), Some("low-memory"));
        let profile = config.profile("low-memory").unwrap();
        assert_eq!(profile.thumbnail_memory_capacity, Some(40));
    }
}
