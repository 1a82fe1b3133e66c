//! # Cloister Runtime Configuration
//!
//! Centralized defaults and environment-driven settings for the cloister
//! actor runtime.
//!
//! ## Features
//!
//! - **Defaults**: watchdog timeouts, destroy grace period, pool re-check interval
//! - **Runtime Configuration**: `CLOISTER_*` environment variables layered over defaults
//!
//! ## Usage
//!
//! ```rust
//! use cloister_config::{defaults, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_env().unwrap_or_default();
//! assert!(config.testing_timeout.as_millis() as u64 >= defaults::watchdog::MIN_TIMEOUT_MS);
//! ```

pub mod defaults;
pub mod runtime_config;

// Re-export commonly used types
pub use runtime_config::{RuntimeConfig, ShellStrategy};
