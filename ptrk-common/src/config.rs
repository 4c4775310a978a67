//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `PTRK_ROOT_FOLDER`, then `PTRK_ROOT` environment variables
//! 3. `root_folder` in the module's TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed config file is never fatal: defaults are used and a
//! warning is logged.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::db::DEFAULT_BUSY_TIMEOUT_MS;
use crate::recalc::DEFAULT_CHUNK_SIZE;
use crate::{Error, Result};

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "ptrk.db";

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write log lines to this file (appended)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: None,
        }
    }
}

impl LoggingConfig {
    /// Open the configured log file for appending, creating parent folders
    pub fn open_log_file(&self) -> Result<Option<File>> {
        let Some(path) = &self.log_file else {
            return Ok(None);
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Some(file))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Components read and written per recalculation chunk
    #[serde(default = "default_chunk_size")]
    pub recalc_chunk_size: usize,
    /// SQLite busy timeout applied to every connection
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
    /// Retry budget for single-component writes that hit a locked database
    #[serde(default = "default_max_lock_wait")]
    pub max_lock_wait_ms: u64,
    /// Engine event broadcast capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            recalc_chunk_size: default_chunk_size(),
            busy_timeout_ms: default_busy_timeout(),
            max_lock_wait_ms: default_max_lock_wait(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_busy_timeout() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_max_lock_wait() -> u64 {
    5000
}

fn default_event_capacity() -> usize {
    100
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.recalc_chunk_size == 0 {
            return Err(Error::Config("recalc_chunk_size must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5810
}

/// Contents of `<module>.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

impl TomlConfig {
    /// Parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults on any problem
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file: {}", e);
                Self::default()
            }
        }
    }
}

/// OS-dependent defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = if cfg!(target_os = "linux") {
            dirs::data_local_dir()
                .map(|d| d.join("ptrk"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/ptrk"))
        } else if cfg!(target_os = "macos") {
            dirs::data_dir()
                .map(|d| d.join("ptrk"))
                .unwrap_or_else(|| PathBuf::from("/Library/Application Support/ptrk"))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("ptrk"))
                .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\ptrk"))
        } else {
            PathBuf::from("./ptrk_data")
        };

        Self { root_folder }
    }
}

/// Resolves the root folder for one module
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_file: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config_file: None,
        }
    }

    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Use an explicit config file instead of searching the standard locations
    pub fn with_config_file(mut self, config_file: Option<PathBuf>) -> Self {
        self.config_file = config_file;
        self
    }

    /// Explicit config file, else the per-user one, else the system-wide one on Linux
    pub fn config_file_path(&self) -> Option<PathBuf> {
        if self.config_file.is_some() {
            return self.config_file.clone();
        }
        let file_name = format!("{}.toml", self.module_name);
        let user = dirs::config_dir().map(|d| d.join("ptrk").join(&file_name));
        if let Some(path) = &user {
            if path.exists() {
                return user;
            }
        }
        if cfg!(target_os = "linux") {
            let system = PathBuf::from("/etc/ptrk").join(&file_name);
            if system.exists() {
                return Some(system);
            }
        }
        None
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        for var in ["PTRK_ROOT_FOLDER", "PTRK_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(config_path) = self.config_file_path() {
            if let Some(root) = TomlConfig::load_or_default(Some(&config_path)).root_folder {
                return root;
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Prepares the root folder on disk
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.engine.recalc_chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.server.port, 5810);
    }

    #[test]
    fn test_partial_engine_section() {
        let config: TomlConfig = toml::from_str(
            r#"
            root_folder = "/srv/ptrk"
            [engine]
            recalc_chunk_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/ptrk")));
        assert_eq!(config.engine.recalc_chunk_size, 50);
        assert_eq!(config.engine.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let settings = EngineSettings {
            recalc_chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }
}
