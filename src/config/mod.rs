//! Configuration module for uart_control.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `UART_CONTROL_CONFIG` environment variable (explicit path)
//! 2. `./uart_control.toml` (current directory)
//! 3. Platform config directory, e.g. `~/.config/uart_control/config.toml`
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `UART_CONTROL_<SECTION>_<KEY>`
//!
//! Examples:
//! - `UART_CONTROL_SERIAL_DEFAULT_BAUD=9600`
//! - `UART_CONTROL_SERIAL_READ_POLL_MS=50`
//! - `UART_CONTROL_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use uart_control::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let options = loader.config().serial.worker_options();
//! println!("Read poll: {:?}", options.read_poll());
//! # Ok::<(), uart_control::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    apply_overrides, get_default_config_dir, get_default_config_path, resolve_config_path,
    ConfigLoader,
};
pub use schema::{Config, ConsoleConfig, LogFormat, LoggingConfig, SerialConfig};
