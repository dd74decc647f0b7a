//! Player configuration
//!
//! Command-line arguments (with environment fallbacks handled by clap)
//! override the TOML bootstrap file, which overrides built-in defaults.

use offtrack_common::config::{resolve_root_folder, TomlConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Effective configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub port: u16,
    /// Mount prefix of the media route, e.g. `/media`
    pub media_scope: String,
    pub settings_debounce: Duration,
    pub max_upload_bytes: usize,
    pub log_level: String,
}

impl Config {
    pub fn resolve(overrides: ConfigOverrides, toml: TomlConfig) -> Self {
        let root_folder = resolve_root_folder(overrides.root_folder.as_deref(), &toml);
        let database_path = toml.database_file(&root_folder);

        Self {
            root_folder,
            database_path,
            port: overrides.port.unwrap_or(toml.port),
            media_scope: toml.media_scope,
            settings_debounce: Duration::from_millis(toml.settings_debounce_ms),
            max_upload_bytes: toml.max_upload_bytes,
            log_level: toml.logging.level,
        }
    }

    /// Defaults rooted at `root_folder`, for embedding and tests
    pub fn for_root(root_folder: &Path) -> Self {
        Self::resolve(
            ConfigOverrides {
                root_folder: Some(root_folder.to_path_buf()),
                port: None,
            },
            TomlConfig::default(),
        )
    }
}
