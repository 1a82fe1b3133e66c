//! Exclusive-Access Actor Runtime
//!
//! In-process actors for Cloister. Every actor wraps one raw instance behind a
//! proxy that admits a single logical caller at a time, restarts the instance
//! when a call fails, and answers `Dead` once it has been destroyed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐    ┌───────────────────────────┐
//! │     ActorSystem      │    │          Proxy            │
//! │                      │    │                           │
//! │  config, metrics,    │    │ ┌───────────────────────┐ │
//! │  shutdown token      │────┼─│ Liberated             │ │
//! │                      │    │ │ reentrant lock, runs  │ │
//! │  ┌────────────────┐  │    │ │ on the caller thread  │ │
//! │  │ Supervisor     │  │    │ └───────────────────────┘ │
//! │  │  name → actor  │  │    │ ┌───────────────────────┐ │
//! │  │  name → Pool   │  │    │ │ Confined              │ │
//! │  └────────────────┘  │    │ │ one owning thread,    │ │
//! │  ┌────────────────┐  │    │ │ FIFO request queue    │ │
//! │  │ Timer          │  │    │ └───────────────────────┘ │
//! │  └────────────────┘  │    │  supervision · link · Dead│
//! └──────────────────────┘    └───────────────────────────┘
//! ```
//!
//! # Suspension points
//!
//! - **`defer`**: release exclusion while a block runs, then reacquire
//! - **`sleep` / `wait_for`**: built on `defer`
//! - **`suspend`**: cooperative futures; on a confined actor other queued
//!   requests run while the future waits
//!
//! # Examples
//!
//! ```rust
//! use cloister::{ActorBehavior, ActorSystem, RuntimeConfig};
//! use std::cell::Cell;
//!
//! #[derive(Default)]
//! struct Counter {
//!     count: Cell<u64>,
//! }
//!
//! impl ActorBehavior for Counter {}
//!
//! let system = ActorSystem::with_config(RuntimeConfig::default());
//! let counter = system.actor(|| Ok(Counter::default())).supervised().spawn()?;
//! let value = counter.call(|c| {
//!     c.count.set(c.count.get() + 1);
//!     Ok(c.count.get())
//! })?;
//! assert_eq!(value, 1);
//! # Ok::<(), cloister::ActorError>(())
//! ```

pub mod error;
pub mod pool;
pub mod proxy;
pub mod registry;
pub mod shell;
pub mod signal;
pub mod supervisor;
pub mod system;
pub mod task;
pub mod timer;

pub use cloister_config::{RuntimeConfig, ShellStrategy as Strategy};
pub use error::{ActorError, Result};
pub use pool::Pool;
pub use proxy::{ActorRef, Factory, WeakActorRef, TERMINATED};
pub use registry::{ActorId, EntryKind, InstanceId};
pub use shell::{Cooperative, Shell};
pub use signal::{Signal, Wakeup};
pub use supervisor::{PoolOptions, Supervisor};
pub use system::{
    ActorBehavior, ActorBuilder, ActorSystem, Exit, RestartStats, Shutdown, SupervisorDirective,
    SystemMetrics, SystemStats,
};
pub use task::{ErrorSink, Progress, Task, TaskStyle, ThreadYielder, Yielder};
pub use timer::{ActionHandle, Timer};
