//! Actor System Core
//!
//! The explicit runtime context: configuration read at start, the shutdown
//! token consulted before every rebuild, and system-wide metrics. Actors,
//! pools, supervisors and timers are all created through an [`ActorSystem`].
//!
//! ## Usage Notes
//!
//! ### Raw instances
//! - **Interior mutability**: behavior methods take `&self`; keep state in `Cell`/`RefCell`
//! - **One caller at a time**: the proxy guarantees exclusion, so non-`Sync` state is fine
//! - **Reentrancy**: a call may call back into its own actor without deadlocking
//!
//! ### Supervision
//! - **Supervised actors keep answering**: a failure rebuilds the instance, the caller still sees the error
//! - **Unsupervised actors die**: the first unhandled failure destroys them
//! - **Watch `restart_failures`**: a factory that keeps failing leaves actors destroyed
//!
//! ### Strategy choice
//! - **Liberated**: callers run on their own threads; good for short calls
//! - **Confined**: one owning thread; required when the instance must never change threads

use crate::error::{ActorError, Result};
use crate::pool::Pool;
use crate::proxy::{ActorRef, Core, Factory, Proxy};
use crate::registry::{ActorId, InstanceId};
use crate::signal::Signal;
use crate::supervisor::Supervisor;
use crate::timer::Timer;
use cloister_config::{RuntimeConfig, ShellStrategy};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Behavior implemented by every raw instance
pub trait ActorBehavior: Send + Sized + 'static {
    /// Whether exit notices from linked actors are delivered to `trap_exit`
    const TRAPS_EXIT: bool = false;

    /// Decide how to recover from an unhandled failure
    fn restart(&self, error: &ActorError) -> SupervisorDirective {
        let _ = error;
        SupervisorDirective::Rebuild
    }

    /// Called on a freshly rebuilt instance
    fn restarted(&self) -> Result<()> {
        Ok(())
    }

    /// Called before the instance is discarded
    fn terminate(&self) -> Result<()> {
        Ok(())
    }

    /// Receive the failure of a linked actor
    fn trap_exit(&self, exit: Exit) -> Result<()> {
        debug!(actor_id = %exit.actor, error = %exit.error, "Ignoring exit notice");
        Ok(())
    }

    fn inspect(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Supervision directive for error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorDirective {
    /// Keep the current instance
    Resume,
    /// Terminate the instance and build a fresh one
    Rebuild,
}

/// Notice sent to a linked actor when an actor fails
#[derive(Debug, Clone)]
pub struct Exit {
    pub actor: ActorId,
    pub instance: InstanceId,
    pub type_name: &'static str,
    pub error: ActorError,
}

/// Process-wide stop flag; once set, failed actors are not rebuilt
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// System-wide metrics
#[derive(Debug, Default)]
pub struct SystemMetrics {
    pub actors_spawned: AtomicU64,
    pub actors_destroyed: AtomicU64,
    pub calls_dispatched: AtomicU64,
    pub call_failures: AtomicU64,
    pub actor_restarts: AtomicU64,
    pub restart_failures: AtomicU64,
    pub exits_trapped: AtomicU64,
    pub watchdog_timeouts: AtomicU64,
}

impl SystemMetrics {
    pub fn record_spawned(&self) {
        self.actors_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_destroyed(&self) {
        self.actors_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call(&self) {
        self.calls_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.call_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record actor restart event
    pub fn record_restart(&self, success: bool) {
        self.actor_restarts.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.restart_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_exit_trapped(&self) {
        self.exits_trapped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.watchdog_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> SystemStats {
        let total_restarts = self.actor_restarts.load(Ordering::Relaxed);
        let restart_failures = self.restart_failures.load(Ordering::Relaxed);
        let restart_success_rate = if total_restarts > 0 {
            ((total_restarts - restart_failures) as f64 / total_restarts as f64) * 100.0
        } else {
            100.0
        };

        SystemStats {
            actors_spawned: self.actors_spawned.load(Ordering::Relaxed),
            actors_destroyed: self.actors_destroyed.load(Ordering::Relaxed),
            calls_dispatched: self.calls_dispatched.load(Ordering::Relaxed),
            call_failures: self.call_failures.load(Ordering::Relaxed),
            restart_stats: RestartStats {
                total_restarts,
                restart_failures,
                restart_success_rate,
            },
            exits_trapped: self.exits_trapped.load(Ordering::Relaxed),
            watchdog_timeouts: self.watchdog_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Basic system statistics
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub actors_spawned: u64,
    pub actors_destroyed: u64,
    pub calls_dispatched: u64,
    pub call_failures: u64,
    pub restart_stats: RestartStats,
    pub exits_trapped: u64,
    pub watchdog_timeouts: u64,
}

/// Actor restart statistics
#[derive(Debug, Clone)]
pub struct RestartStats {
    pub total_restarts: u64,
    pub restart_failures: u64,
    pub restart_success_rate: f64,
}

struct SystemInner {
    system_id: String,
    config: RuntimeConfig,
    shutdown: Shutdown,
    metrics: SystemMetrics,
}

/// Core actor system; cheap to clone
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// Create an actor system configured from `CLOISTER_*` environment variables
    pub fn new() -> Result<Self> {
        let config = RuntimeConfig::from_env()
            .map_err(|e| ActorError::configuration(format!("{e:#}"), None))?;
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let system_id = format!("system-{}", Uuid::new_v4().simple());
        info!(
            system_id = %system_id,
            testing = config.testing,
            default_strategy = %config.default_strategy,
            "Creating new actor system"
        );
        Self {
            inner: Arc::new(SystemInner {
                system_id,
                config,
                shutdown: Shutdown::default(),
                metrics: SystemMetrics::default(),
            }),
        }
    }

    pub fn system_id(&self) -> &str {
        &self.inner.system_id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.inner.shutdown
    }

    /// Stop rebuilding failed actors
    pub fn signal_shutdown(&self) {
        info!(system_id = %self.inner.system_id, "Shutdown signalled");
        self.inner.shutdown.signal();
    }

    pub fn metrics(&self) -> SystemStats {
        self.inner.metrics.snapshot()
    }

    pub(crate) fn metrics_ref(&self) -> &SystemMetrics {
        &self.inner.metrics
    }

    /// Start building an actor from `factory`
    pub fn actor<T, F>(&self, factory: F) -> ActorBuilder<T>
    where
        T: ActorBehavior,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        ActorBuilder::new(self.clone(), Arc::new(factory))
    }

    /// Spawn an unsupervised actor with the default strategy
    pub fn spawn<T, F>(&self, factory: F) -> Result<ActorRef<T>>
    where
        T: ActorBehavior,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        self.actor(factory).spawn()
    }

    /// Build a pool of `size` supervised workers with the default strategy
    pub fn pool<T, F>(&self, factory: F, size: usize) -> Result<Pool<T>>
    where
        T: ActorBehavior,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Pool::new(self, Arc::new(factory), size, self.config().default_strategy)
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(self)
    }

    pub fn timer(&self) -> Result<Timer> {
        Timer::new(self)
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("system_id", &self.inner.system_id)
            .field("config", &self.inner.config)
            .field("shutdown", &self.inner.shutdown.is_set())
            .finish()
    }
}

/// Configures and spawns one actor
pub struct ActorBuilder<T: ActorBehavior> {
    system: ActorSystem,
    factory: Factory<T>,
    supervised: bool,
    strategy: ShellStrategy,
    notifier: Option<Arc<Signal>>,
}

impl<T: ActorBehavior> ActorBuilder<T> {
    pub(crate) fn new(system: ActorSystem, factory: Factory<T>) -> Self {
        let strategy = system.config().default_strategy;
        Self {
            system,
            factory,
            supervised: false,
            strategy,
            notifier: None,
        }
    }

    /// Rebuild the instance after unhandled failures instead of destroying the actor
    pub fn supervised(mut self) -> Self {
        self.supervised = true;
        self
    }

    pub fn strategy(mut self, strategy: ShellStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn liberated(self) -> Self {
        self.strategy(ShellStrategy::Liberated)
    }

    pub fn confined(self) -> Self {
        self.strategy(ShellStrategy::Confined)
    }

    /// Signal `unlocked` on `signal` every time a call releases the actor
    pub(crate) fn notify(mut self, signal: Arc<Signal>) -> Self {
        self.notifier = Some(signal);
        self
    }

    pub fn spawn(self) -> Result<ActorRef<T>> {
        let core = Core::new(
            self.system,
            self.factory,
            self.strategy,
            self.supervised,
            self.notifier,
        );
        Proxy::spawn(core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Counter {
        count: Cell<u32>,
    }

    impl ActorBehavior for Counter {}

    #[test]
    fn test_metrics_track_lifecycle() {
        let system = ActorSystem::with_config(RuntimeConfig::default());
        let counter = system.spawn(|| Ok(Counter::default())).unwrap();
        counter
            .call(|c| {
                c.count.set(c.count.get() + 1);
                Ok(())
            })
            .unwrap();
        drop(counter);

        let stats = system.metrics();
        assert_eq!(stats.actors_spawned, 1);
        assert_eq!(stats.actors_destroyed, 1);
        assert_eq!(stats.calls_dispatched, 1);
        assert_eq!(stats.restart_stats.restart_success_rate, 100.0);
    }

    #[test]
    fn test_restart_success_rate() {
        let metrics = SystemMetrics::default();
        metrics.record_restart(true);
        metrics.record_restart(false);
        let stats = metrics.snapshot();
        assert_eq!(stats.restart_stats.total_restarts, 2);
        assert_eq!(stats.restart_stats.restart_failures, 1);
        assert_eq!(stats.restart_stats.restart_success_rate, 50.0);
    }

    #[test]
    fn test_shutdown_token_is_shared() {
        let system = ActorSystem::with_config(RuntimeConfig::default());
        let clone = system.clone();
        assert!(!system.shutdown().is_set());
        clone.signal_shutdown();
        assert!(system.shutdown().is_set());
        system.shutdown().reset();
        assert!(!clone.shutdown().is_set());
    }

    #[test]
    fn test_builder_defaults_follow_config() {
        let config = RuntimeConfig::default().with_default_strategy(ShellStrategy::Confined);
        let system = ActorSystem::with_config(config);
        let actor = system.actor(|| Ok(Counter::default())).spawn().unwrap();
        assert_eq!(actor.strategy(), ShellStrategy::Confined);
        assert!(!actor.is_supervised());

        let actor = system.actor(|| Ok(Counter::default())).liberated().supervised().spawn().unwrap();
        assert_eq!(actor.strategy(), ShellStrategy::Liberated);
        assert!(actor.is_supervised());
    }
}
