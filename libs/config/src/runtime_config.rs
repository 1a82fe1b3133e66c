//! Runtime Configuration Module
//!
//! Loads the actor runtime settings from `CLOISTER_*` environment variables
//! layered over the typed defaults in [`crate::defaults`].

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, Map};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Execution strategy used for actors that do not pick one explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellStrategy {
    /// Callers run on their own threads behind a reentrant lock
    #[default]
    Liberated,
    /// A dedicated thread owns the instance and drains a request queue
    Confined,
}

impl fmt::Display for ShellStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellStrategy::Liberated => write!(f, "liberated"),
            ShellStrategy::Confined => write!(f, "confined"),
        }
    }
}

/// Settings read once when an actor system starts
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Wrap dispatched calls in a watchdog
    pub testing: bool,
    /// Watchdog limit per call when `testing` is set
    pub testing_timeout: Duration,
    /// Lock acquisition limit for liberated actors (debug aid)
    pub lock_timeout: Option<Duration>,
    /// Time tracked threads get to exit after their actor is destroyed
    pub destroy_grace: Duration,
    /// Pool availability re-check interval
    pub pool_wait: Duration,
    /// Strategy for actors built without an explicit choice
    pub default_strategy: ShellStrategy,
}

/// Raw shape of the environment layer
#[derive(Debug, Deserialize)]
struct RawSettings {
    testing: bool,
    testing_timeout_ms: u64,
    lock_timeout_ms: Option<u64>,
    destroy_grace_ms: u64,
    pool_wait_ms: u64,
    default_strategy: ShellStrategy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            testing: false,
            testing_timeout: Duration::from_millis(defaults::watchdog::TESTING_TIMEOUT_MS),
            lock_timeout: None,
            destroy_grace: Duration::from_millis(defaults::lifecycle::DESTROY_GRACE_MS),
            pool_wait: Duration::from_millis(defaults::pool::WAIT_MS),
            default_strategy: ShellStrategy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::load(Environment::with_prefix(defaults::ENV_PREFIX))
    }

    /// Load settings from an explicit variable map instead of the process environment
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source: Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::load(Environment::with_prefix(defaults::ENV_PREFIX).source(Some(source)))
    }

    fn load(environment: Environment) -> Result<Self> {
        let settings = Config::builder()
            .set_default("testing", false)?
            .set_default("testing_timeout_ms", defaults::watchdog::TESTING_TIMEOUT_MS)?
            .set_default("destroy_grace_ms", defaults::lifecycle::DESTROY_GRACE_MS)?
            .set_default("pool_wait_ms", defaults::pool::WAIT_MS)?
            .set_default("default_strategy", ShellStrategy::default().to_string())?
            .add_source(environment.try_parsing(true))
            .build()
            .context("Failed to build runtime configuration")?;

        let raw: RawSettings = settings
            .try_deserialize()
            .context("Failed to deserialize runtime configuration")?;

        if raw.testing_timeout_ms < defaults::watchdog::MIN_TIMEOUT_MS {
            bail!(
                "testing_timeout_ms must be at least {}ms, got {}ms",
                defaults::watchdog::MIN_TIMEOUT_MS,
                raw.testing_timeout_ms
            );
        }

        let config = Self {
            testing: raw.testing,
            testing_timeout: Duration::from_millis(raw.testing_timeout_ms),
            lock_timeout: raw.lock_timeout_ms.map(Duration::from_millis),
            destroy_grace: Duration::from_millis(raw.destroy_grace_ms),
            pool_wait: Duration::from_millis(raw.pool_wait_ms.max(1)),
            default_strategy: raw.default_strategy,
        };
        debug!(?config, "Loaded runtime configuration");
        Ok(config)
    }

    /// Enable the watchdog with the given per-call limit
    pub fn with_testing(mut self, timeout: Duration) -> Self {
        self.testing = true;
        self.testing_timeout = timeout;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn with_destroy_grace(mut self, grace: Duration) -> Self {
        self.destroy_grace = grace;
        self
    }

    pub fn with_pool_wait(mut self, wait: Duration) -> Self {
        self.pool_wait = wait;
        self
    }

    pub fn with_default_strategy(mut self, strategy: ShellStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Limit applied to a single dispatched call, if any
    pub fn watchdog(&self) -> Option<Duration> {
        self.testing.then_some(self.testing_timeout)
    }

    /// Limit applied when acquiring a liberated actor's lock, if any
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.lock_timeout.or_else(|| self.watchdog())
    }
}
