//! Configuration module for the preview host.
//!
//! Provides a layered configuration system that supports:
//! - Default values
//! - User-level TOML file (`<config dir>/prevue/settings.toml`)
//! - Workspace TOML file (`.prevue/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PREVUE_` and use double
//! underscores to separate nested levels:
//! - `PREVUE_WATCHER__COOLDOWN_MS=100` sets `watcher.cooldown_ms`
//! - `PREVUE_RELOAD_ALL=true` sets `reload_all`
//! - `PREVUE_PROJECT__FLAT_PACKAGES=false` sets `project.flat_packages`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Known project roots, selectable from the consumer
    #[serde(default)]
    pub projects: Vec<PathBuf>,

    /// Currently active project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_project: Option<PathBuf>,

    /// Reload policy: `true` restarts the whole host process on any change,
    /// `false` reloads changed units incrementally
    #[serde(default = "default_false")]
    pub reload_all: bool,

    /// Display theme name, passed through to the consumer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,

    /// Last selected preview key, restored on startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_preview_key: Option<String>,

    /// Last selected preview group, restored on startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_group_key: Option<String>,

    /// Project layout settings (source extension, package resolution)
    #[serde(default)]
    pub project: ProjectConfig,

    /// File watcher settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Unit runner settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProjectConfig {
    /// The single recognized source extension (without the dot)
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// File stem of the package root marker (`<stem>.<ext>`)
    #[serde(default = "default_root_marker")]
    pub root_marker: String,

    /// Treat a directory with source files but no root marker as a package.
    /// The heuristic can misclassify a directory of unrelated scripts,
    /// so it is switchable.
    #[serde(default = "default_true")]
    pub flat_packages: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Suppression window for repeated events on the same path, in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Foreground idle-wait between queue polls, in milliseconds
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RunnerConfig {
    /// Command used to execute a unit; the unit path is appended as the
    /// last argument. Empty means the unit file is executed directly
    /// (shebang decides the interpreter).
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level filter
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_true() -> bool {
    true
}
fn default_source_extension() -> String {
    "pv".to_string()
}
fn default_root_marker() -> String {
    "__root__".to_string()
}
fn default_cooldown_ms() -> u64 {
    50
}
fn default_poll_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            projects: Vec::new(),
            current_project: None,
            reload_all: false,
            theme: None,
            last_preview_key: None,
            last_group_key: None,
            project: ProjectConfig::default(),
            watcher: WatcherConfig::default(),
            runner: RunnerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_extension: default_source_extension(),
            root_marker: default_root_marker(),
            flat_packages: true,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            poll_ms: default_poll_ms(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources. Later layers win: defaults,
    /// then the user-level file, then the workspace file, then environment.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".prevue/settings.toml"));

        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(global) = Self::global_config_path() {
            figment = figment.merge(Toml::file(global));
        }
        figment
            .merge(Toml::file(config_path))
            // Double underscore becomes a dot, single underscore stays
            // inside field names
            .merge(Env::prefixed("PREVUE_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(Box::new)
    }

    /// User-level settings file, shared across workspaces.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("prevue").join("settings.toml"))
    }

    /// Find the workspace config by looking for a `.prevue` directory,
    /// searching from the current directory up to the filesystem root.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(".prevue");
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Get the workspace root directory (where `.prevue` is located).
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            if ancestor.join(".prevue").is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Path the settings will be saved to.
    pub fn config_path() -> PathBuf {
        Self::find_workspace_config().unwrap_or_else(|| PathBuf::from(".prevue/settings.toml"))
    }

    /// Check if configuration is properly initialized.
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'prevue init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(".prevue/settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings::default();
        settings.save(&config_path)?;

        Ok(config_path)
    }
}
