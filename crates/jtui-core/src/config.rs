use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
    pub player: PlayerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub device_name: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadsConfig {
    /// Overrides the platform data directory.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Player executable, looked up on `PATH`.
    pub program: String,
    /// Extra arguments placed before the IPC flag.
    #[serde(default)]
    pub args: Vec<String>,
    pub ipc_path: PathBuf,
    pub status_interval_ms: u64,
    pub report_interval_secs: u64,
    /// Fraction of the duration after which an item counts as watched.
    pub watched_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl AppConfig {
    /// Load config from a file, falling back to the built-in defaults when
    /// the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return toml::from_str(DEFAULT_CONFIG).map_err(|e| CoreError::Config(e.to_string()));
        }
        let user_str =
            std::fs::read_to_string(path).map_err(|e| CoreError::Config(e.to_string()))?;
        toml::from_str(&user_str).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Root directory holding downloaded media.
    pub fn downloads_root(&self) -> PathBuf {
        if let Some(root) = &self.downloads.root {
            return root.clone();
        }
        Self::project_dirs()
            .map(|d| d.data_dir().join("downloads"))
            .unwrap_or_else(|| PathBuf::from("downloads"))
    }

    /// Where the authenticated session is persisted.
    pub fn session_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.cache_dir().join("session.json"))
            .unwrap_or_else(|| PathBuf::from("session.json"))
    }

    /// Directory for log files.
    pub fn log_dir() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "jtui")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}
