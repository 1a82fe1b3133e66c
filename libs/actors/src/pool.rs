//! Worker pools
//!
//! A pool is itself a liberated actor whose raw instance is the worker set.
//! Callers enter the pool, pick the first free worker (waiting on the shared
//! availability signal while every worker is busy) and then forward their
//! call with the pool's lock deferred, so the pool admits the next caller
//! while the worker runs.
//!
//! Workers are supervised: a crashing worker is rebuilt in place and the
//! caller that triggered the crash still receives the error. Workers that end
//! up destroyed are replaced the next time the pool looks for a free one.

use crate::error::{ActorError, Result};
use crate::proxy::{ActorRef, Factory, UNLOCKED};
use crate::shell::Shell;
use crate::signal::Signal;
use crate::system::{ActorBehavior, ActorBuilder, ActorSystem};
use cloister_config::ShellStrategy;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

struct Spawner<T: ActorBehavior> {
    system: ActorSystem,
    factory: Factory<T>,
    strategy: ShellStrategy,
    signal: Arc<Signal>,
}

impl<T: ActorBehavior> Spawner<T> {
    fn spawn(&self) -> Result<ActorRef<T>> {
        ActorBuilder::new(self.system.clone(), self.factory.clone())
            .supervised()
            .strategy(self.strategy)
            .notify(self.signal.clone())
            .spawn()
    }
}

/// Raw instance behind a pool
pub(crate) struct WorkerSet<T: ActorBehavior> {
    workers: RefCell<Vec<ActorRef<T>>>,
    target: Cell<usize>,
    spawner: Arc<Spawner<T>>,
}

impl<T: ActorBehavior> WorkerSet<T> {
    fn build(spawner: Arc<Spawner<T>>, size: usize) -> Result<Self> {
        let set = Self {
            workers: RefCell::new(Vec::with_capacity(size)),
            target: Cell::new(size),
            spawner,
        };
        set.heal()?;
        Ok(set)
    }

    /// Drop destroyed workers and spawn replacements up to the target
    fn heal(&self) -> Result<()> {
        let mut workers = self.workers.borrow_mut();
        let before = workers.len();
        workers.retain(ActorRef::is_alive);
        if workers.len() < before {
            warn!(lost = before - workers.len(), "Replacing destroyed pool workers");
        }
        while workers.len() < self.target.get() {
            workers.push(self.spawner.spawn()?);
        }
        Ok(())
    }

    fn first_free(&self) -> Result<Option<ActorRef<T>>> {
        self.heal()?;
        Ok(self
            .workers
            .borrow()
            .iter()
            .find(|worker| worker.is_available())
            .cloned())
    }

    fn remove(&self, worker: &ActorRef<T>) {
        self.workers.borrow_mut().retain(|w| w != worker);
    }
}

impl<T: ActorBehavior> ActorBehavior for WorkerSet<T> {
    fn terminate(&self) -> Result<()> {
        for worker in self.workers.borrow_mut().drain(..) {
            worker.destroy();
        }
        Ok(())
    }

    fn inspect(&self) -> String {
        format!(
            "Pool<{}>(workers: {}, target: {})",
            std::any::type_name::<T>(),
            self.workers.borrow().len(),
            self.target.get()
        )
    }
}

/// Wait, with the pool lock released, until some worker is free
fn free_worker<T: ActorBehavior>(
    shell: &mut Shell<'_, WorkerSet<T>>,
    signal: &Signal,
    wait: Duration,
) -> Result<ActorRef<T>> {
    loop {
        if let Some(worker) = shell.with(|set| set.first_free())?? {
            return Ok(worker);
        }
        shell.wait_for_timeout(signal, UNLOCKED, wait)?;
    }
}

fn rebalance<T: ActorBehavior>(
    shell: &mut Shell<'_, WorkerSet<T>>,
    signal: &Signal,
    wait: Duration,
    size: usize,
) -> Result<usize> {
    loop {
        let count = shell.with(|set| set.workers.borrow().len())?;
        if count < size {
            shell.with(|set| set.heal())??;
        } else if count > size {
            let worker = free_worker(shell, signal, wait)?;
            shell.with(|set| set.remove(&worker))?;
            worker.destroy();
        } else {
            return Ok(count);
        }
    }
}

/// Homogeneous set of supervised workers behind one handle
pub struct Pool<T: ActorBehavior> {
    inner: ActorRef<WorkerSet<T>>,
    signal: Arc<Signal>,
    wait: Duration,
}

impl<T: ActorBehavior> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            signal: self.signal.clone(),
            wait: self.wait,
        }
    }
}

impl<T: ActorBehavior> Pool<T> {
    /// Build a pool of `size` workers; a size of zero is raised to one
    pub(crate) fn new(
        system: &ActorSystem,
        factory: Factory<T>,
        size: usize,
        strategy: ShellStrategy,
    ) -> Result<Self> {
        let size = size.max(1);
        let signal = Arc::new(Signal::new());
        let spawner = Arc::new(Spawner {
            system: system.clone(),
            factory,
            strategy,
            signal: signal.clone(),
        });
        let inner = system
            .actor(move || WorkerSet::build(spawner.clone(), size))
            .liberated()
            .spawn()?;
        debug!(pool = %inner.id(), worker_type = std::any::type_name::<T>(), size, %strategy, "Pool created");
        Ok(Self {
            inner,
            signal,
            wait: system.config().pool_wait,
        })
    }

    /// Run `f` on the first free worker
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&T) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let signal = self.signal.clone();
        let wait = self.wait;
        self.inner.enter(move |shell| {
            let worker = free_worker(shell, &signal, wait).map_err(ActorError::abort)?;
            shell.defer(move || worker.call(f))?.map_err(ActorError::abort)
        })
    }

    /// Grow or shrink the pool to `size` workers (at least one)
    pub fn resize(&self, size: usize) -> Result<usize> {
        let size = size.max(1);
        let signal = self.signal.clone();
        let wait = self.wait;
        self.inner.enter(move |shell| {
            shell.with(|set| set.target.set(size))?;
            rebalance(shell, &signal, wait, size).map_err(ActorError::abort)
        })
    }

    /// Number of workers currently in the pool
    pub fn worker_count(&self) -> Result<usize> {
        self.inner.call(|set| Ok(set.workers.borrow().len()))
    }

    /// Requested pool size
    pub fn target(&self) -> Result<usize> {
        self.inner.call(|set| Ok(set.target.get()))
    }

    /// Snapshot of the current workers
    pub fn workers(&self) -> Result<Vec<ActorRef<T>>> {
        self.inner.call(|set| Ok(set.workers.borrow().clone()))
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    pub fn inspect(&self) -> String {
        self.inner.inspect()
    }

    /// Destroy every worker and the pool itself
    pub fn terminate(&self) {
        self.inner.destroy();
        self.signal.close();
    }
}

impl<T: ActorBehavior> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("inner", &self.inner)
            .field("wait", &self.wait)
            .finish()
    }
}
