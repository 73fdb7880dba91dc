//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "UART_CONTROL";

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "uart_control.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "UART_CONTROL_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `UART_CONTROL_CONFIG` environment variable (explicit path)
    /// 2. `./uart_control.toml` (current directory)
    /// 3. `<platform config dir>/uart_control/config.toml`
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values; the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;
        debug!(path = ?config_path, "configuration loaded");

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file, no overrides).
    pub fn with_defaults() -> Self {
        Self {
            config_path: None,
            config: Config::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to its file.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self.config_path.as_ref().ok_or(ConfigError::NoPath)?;
        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            config.validate()?;
            self.config = config;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Platform config directory for this application.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "uart_control").map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Apply `UART_CONTROL_<SECTION>_<KEY>` overrides from the process environment.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    apply_overrides(config, |var| std::env::var(var).ok())
}

/// Apply overrides from any variable source.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let serial = &mut config.serial;
    override_parsed(&lookup, "SERIAL_DEFAULT_BAUD", &mut serial.default_baud)?;
    override_parsed(&lookup, "SERIAL_READ_POLL_MS", &mut serial.read_poll_ms)?;
    override_parsed(
        &lookup,
        "SERIAL_WRITE_QUEUE_CAPACITY",
        &mut serial.write_queue_capacity,
    )?;
    override_parsed(&lookup, "SERIAL_STOP_TIMEOUT_MS", &mut serial.stop_timeout_ms)?;
    override_parsed(
        &lookup,
        "SERIAL_MAX_CONSECUTIVE_ERRORS",
        &mut serial.max_consecutive_errors,
    )?;
    override_parsed(&lookup, "SERIAL_READ_BUFFER_SIZE", &mut serial.read_buffer_size)?;

    override_parsed(
        &lookup,
        "CONSOLE_MAX_ENTRIES_PER_SOURCE",
        &mut config.console.max_entries_per_source,
    )?;

    if let Some(level) = lookup(&format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
        config.logging.level = level;
    }
    if let Some(file) = lookup(&format!("{ENV_PREFIX}_LOGGING_FILE")) {
        config.logging.file = Some(PathBuf::from(file));
    }

    Ok(())
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let var = format!("{ENV_PREFIX}_{key}");
    if let Some(raw) = lookup(&var) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::env_parse(var, e.to_string()))?;
    }
    Ok(())
}
