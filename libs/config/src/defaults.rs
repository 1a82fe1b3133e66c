//! Runtime defaults
//!
//! Default configuration values and constants shared by the actor runtime.

/// Environment variable prefix for every runtime setting
pub const ENV_PREFIX: &str = "CLOISTER";

/// Watchdog defaults (test/debug mode only)
pub mod watchdog {
    /// Per-call timeout applied when testing mode is enabled (milliseconds)
    pub const TESTING_TIMEOUT_MS: u64 = 5_000;

    /// Smallest accepted watchdog timeout (milliseconds)
    pub const MIN_TIMEOUT_MS: u64 = 1;
}

/// Actor lifecycle defaults
pub mod lifecycle {
    /// Grace period granted to tracked threads before they are detached (milliseconds)
    pub const DESTROY_GRACE_MS: u64 = 2_000;
}

/// Pool defaults
pub mod pool {
    /// Interval between availability re-checks while every worker is busy (milliseconds)
    pub const WAIT_MS: u64 = 50;

    /// Workers built when no size is requested
    pub const DEFAULT_SIZE: usize = 1;
}
