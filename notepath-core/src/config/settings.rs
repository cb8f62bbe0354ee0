//! Settings configuration loaded from TOML files.
//!
//! This module handles the user-facing configuration stored in TOML format
//! in the XDG config directory (~/.config/notepath/config.toml).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# notepath configuration file
# Located at: ~/.config/notepath/config.toml

[logging]
level = "info"

[store]
# db_path = "/path/to/graph.sqlite3"  # Defaults to <data dir>/notepath/graph.sqlite3

[embedding]
url = "http://127.0.0.1:11434"
model = "qwen3-embedding:8b"
batch = 32
# dim = 1024  # Detected from the first embedding response when unset

[pathfinding]
max_hops = 4
max_results = 5
neighbor_limit = 20
include_semantic = true
timeout_ms = 15000
temporal_timeout_ms = 3000
"#;

/// Settings loaded from TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Graph database location
    #[serde(default)]
    pub store: StoreSettings,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingToolsSettings,

    /// Path-finding tuning
    #[serde(default)]
    pub pathfinding: PathFindingToolsSettings,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Graph store settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreSettings {
    /// Optional override for the SQLite database path
    pub db_path: Option<String>,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmbeddingToolsSettings {
    /// Embedding provider base URL
    pub url: Option<String>,

    /// Embedding model name
    pub model: Option<String>,

    /// Embedding dimension (if known)
    pub dim: Option<usize>,

    /// Embedding batch size
    pub batch: Option<usize>,
}

/// Path-finding overrides. Unset values fall back to engine defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PathFindingToolsSettings {
    pub max_hops: Option<usize>,
    pub max_results: Option<usize>,
    pub neighbor_limit: Option<usize>,
    pub include_semantic: Option<bool>,
    /// Global search timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Internal budget of the temporal strategy in milliseconds.
    pub temporal_timeout_ms: Option<u64>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error("Data directory not found")]
    DataDirNotFound,
}

impl Settings {
    /// Load settings from the TOML configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    /// The file is located at `~/.config/notepath/config.toml`.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// Uses XDG config directory: `~/.config/notepath/config.toml`
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("NOTEPATH_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("notepath");

        Ok(config_dir.join("config.toml"))
    }

    /// Resolve the graph database path, honoring `[store] db_path`.
    pub fn db_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.store.db_path {
            return Ok(PathBuf::from(path));
        }
        Ok(data_root()?.join("graph.sqlite3"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, DEFAULT_CONFIG_TOML)?;

        Ok(())
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Root data directory, `NOTEPATH_DATA_DIR` or `<XDG data>/notepath`.
pub fn data_root() -> Result<PathBuf, SettingsError> {
    if let Ok(override_dir) = std::env::var("NOTEPATH_DATA_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let dir = dirs::data_dir().ok_or(SettingsError::DataDirNotFound)?;
    Ok(dir.join("notepath"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let settings = Settings::from_toml(DEFAULT_CONFIG_TOML).unwrap();

        assert_eq!(settings.logging.level, "info");
        assert!(settings.store.db_path.is_none());
        assert_eq!(settings.embedding.batch, Some(32));
        assert_eq!(settings.pathfinding.max_hops, Some(4));
        assert_eq!(settings.pathfinding.include_semantic, Some(true));
        assert_eq!(settings.pathfinding.temporal_timeout_ms, Some(3000));
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[pathfinding]
max_hops = 6
"#;

        let settings = Settings::from_toml(toml).unwrap();

        assert_eq!(settings.pathfinding.max_hops, Some(6));
        assert!(settings.pathfinding.max_results.is_none());
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_db_path_override() {
        let toml = r#"
[store]
db_path = "/tmp/vault/graph.sqlite3"
"#;
        let settings = Settings::from_toml(toml).unwrap();
        assert_eq!(
            settings.db_path().unwrap(),
            PathBuf::from("/tmp/vault/graph.sqlite3")
        );
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let mut settings = Settings::default();
        settings.pathfinding.max_results = Some(9);
        settings.embedding.model = Some("nomic-embed-text".to_string());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        settings.save_to_path(&path).expect("save failed");

        let content = fs::read_to_string(&path).expect("read failed");
        let loaded = Settings::from_toml(&content).expect("parse failed");

        assert_eq!(loaded.pathfinding.max_results, Some(9));
        assert_eq!(loaded.embedding.model.as_deref(), Some("nomic-embed-text"));
    }

    #[test]
    fn test_config_path_uses_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let value = dir.path().to_string_lossy().to_string();

        // SAFETY: test-scoped env mutation.
        unsafe { std::env::set_var("NOTEPATH_CONFIG_DIR", &value) };
        let path = Settings::config_path().unwrap();
        // SAFETY: test-scoped env mutation cleanup.
        unsafe { std::env::remove_var("NOTEPATH_CONFIG_DIR") };

        assert_eq!(path, dir.path().join("config.toml"));
    }
}
