//! Shared fixtures for the integration tests

#![allow(dead_code)]

use cloister::{ActorSystem, RuntimeConfig, Strategy};
use std::time::Duration;

/// Install a test-writer subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cloister=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn system() -> ActorSystem {
    init_tracing();
    ActorSystem::with_config(RuntimeConfig::default().with_destroy_grace(Duration::from_millis(500)))
}

pub fn system_with(strategy: Strategy) -> ActorSystem {
    init_tracing();
    ActorSystem::with_config(
        RuntimeConfig::default()
            .with_destroy_grace(Duration::from_millis(500))
            .with_default_strategy(strategy),
    )
}

/// Short pause letting spawned threads reach their blocking point
pub fn settle() {
    std::thread::sleep(Duration::from_millis(30));
}
