//! Configuration file support for habitsync
//!
//! Reads credentials and paths from habitsync.toml, with environment
//! variable overrides (HABITSYNC_USER_ID, HABITSYNC_API_KEY,
//! HABITSYNC_BASE_URL, HABITSYNC_DB_PATH).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "habitsync.toml";
const DEFAULT_DB_FILE: &str = "habitica_data.db";

/// Error type for configuration loading
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    MissingCredentials,
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "Failed to read config file: {}", e),
            SettingsError::Parse(e) => write!(f, "Failed to parse config file: {}", e),
            SettingsError::MissingCredentials => write!(
                f,
                "No credentials configured. Set user_id and api_key in {} \
                 or the HABITSYNC_USER_ID / HABITSYNC_API_KEY environment variables.",
                DEFAULT_CONFIG_FILE
            ),
        }
    }
}

impl std::error::Error for SettingsError {}

/// Runtime settings for one sync pass
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Settings {
    /// Habitica user id (the x-api-user header)
    #[serde(default)]
    pub user_id: String,

    /// Habitica API key (the x-api-key header)
    #[serde(default)]
    pub api_key: String,

    /// Override for the API base URL; None means the production service
    #[serde(default)]
    pub base_url: Option<String>,

    /// Path of the SQLite database file
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the default config file location, tolerating a
    /// missing file, then apply environment overrides. Fails only if no
    /// credentials came from either source.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load settings from an explicit config file path.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(SettingsError::Io)?;
            toml::from_str(&contents).map_err(SettingsError::Parse)?
        } else {
            Self::default()
        };
        settings.apply_env();
        if settings.user_id.is_empty() || settings.api_key.is_empty() {
            return Err(SettingsError::MissingCredentials);
        }
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("HABITSYNC_USER_ID") {
            self.user_id = v;
        }
        if let Ok(v) = std::env::var("HABITSYNC_API_KEY") {
            self.api_key = v;
        }
        if let Ok(v) = std::env::var("HABITSYNC_BASE_URL") {
            self.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("HABITSYNC_DB_PATH") {
            self.database = Some(PathBuf::from(v));
        }
    }

    /// Database path, defaulting to habitica_data.db in the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
user_id = "u-123"
api_key = "k-456"
base_url = "http://localhost:3000"
database = "/tmp/habits.db"
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.user_id, "u-123");
        assert_eq!(settings.api_key, "k-456");
        assert_eq!(settings.base_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(settings.database_path(), PathBuf::from("/tmp/habits.db"));
    }

    #[test]
    fn test_database_path_default() {
        let settings = Settings::default();
        assert_eq!(settings.database_path(), PathBuf::from(DEFAULT_DB_FILE));
    }

    #[test]
    fn test_partial_config_parses() {
        let settings: Settings = toml::from_str(r#"user_id = "u-123""#).unwrap();
        assert_eq!(settings.user_id, "u-123");
        assert!(settings.api_key.is_empty());
        assert!(settings.base_url.is_none());
    }
}
