//! Bootstrap configuration and root folder resolution
//!
//! The TOML file holds only what is needed before the database is open.
//! Runtime settings (the end-of-track policy) live in the `settings` table.
//!
//! Root folder priority:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. `root_folder` in the TOML file
//! 4. OS-dependent default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "OFFTRACK_ROOT_FOLDER";

/// Database file name used when the TOML file does not name one
pub const DEFAULT_DATABASE_FILE: &str = "offtrack.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Database file; relative paths resolve against the root folder
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Mount prefix of the media route (`<scope>/audio/<id>`)
    #[serde(default = "default_media_scope")]
    pub media_scope: String,

    /// Quiet period before a burst of speed/pitch edits is written
    #[serde(default = "default_settings_debounce_ms")]
    pub settings_debounce_ms: u64,

    /// Largest accepted upload body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            port: default_port(),
            media_scope: default_media_scope(),
            settings_debounce_ms: default_settings_debounce_ms(),
            max_upload_bytes: default_max_upload_bytes(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    5780
}

fn default_media_scope() -> String {
    "/media".to_string()
}

fn default_settings_debounce_ms() -> u64 {
    400
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load the TOML file at `path`
    ///
    /// A missing file is not an error: a warning is logged and defaults are
    /// used. A file that exists but does not parse is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit` if given, else from the per-user config file
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.media_scope.starts_with('/') || self.media_scope.ends_with('/') {
            return Err(Error::Config(format!(
                "media_scope must start with '/' and not end with one: {:?}",
                self.media_scope
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".to_string()));
        }
        Ok(())
    }

    /// Database file location for the given root folder
    pub fn database_file(&self, root_folder: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root_folder.join(path),
            None => root_folder.join(DEFAULT_DATABASE_FILE),
        }
    }
}

/// Resolve the root folder (CLI > environment > TOML > OS default)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Per-user config file: `<config dir>/offtrack/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("offtrack").join("config.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("offtrack"))
        .unwrap_or_else(|| PathBuf::from("./offtrack_data"))
}
