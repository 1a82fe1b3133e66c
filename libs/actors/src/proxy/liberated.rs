//! Thread-per-caller strategy
//!
//! Callers run actor code on their own threads and contend for a reentrant
//! lock around the instance slot. `defer` releases one lock level while its
//! block runs, which admits the next caller.

use super::{Core, Engine, Gate, Proxy, Slot};
use crate::error::{ActorError, Result};
use crate::shell::{Cooperative, Shell};
use crate::system::ActorBehavior;
use crate::task::Task;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub(crate) struct LiberatedEngine<T> {
    lock: ReentrantMutex<Slot<T>>,
}

struct LockedGate<'g, T> {
    guard: ReentrantMutexGuard<'g, Slot<T>>,
}

impl<'g, T> Gate<T> for LockedGate<'g, T> {
    fn slot(&self) -> &Slot<T> {
        &self.guard
    }

    fn unlocked(&mut self, f: &mut (dyn FnMut() + Send)) {
        ReentrantMutexGuard::unlocked(&mut self.guard, f);
    }
}

impl<T: ActorBehavior> LiberatedEngine<T> {
    /// Build the instance on the calling thread
    pub(crate) fn start(core: Core<T>) -> Result<Arc<Proxy<T>>> {
        let instance = core.build()?;
        Ok(Arc::new(Proxy {
            core,
            engine: Engine::Liberated(Self {
                lock: ReentrantMutex::new(Slot::new(instance)),
            }),
        }))
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    fn acquire(&self, core: &Core<T>) -> Result<ReentrantMutexGuard<'_, Slot<T>>> {
        let Some(limit) = core.config().acquire_timeout() else {
            return Ok(self.lock.lock());
        };
        self.lock.try_lock_for(limit).ok_or_else(|| {
            core.metrics().record_timeout();
            warn!(actor_id = %core.id, timeout_ms = limit.as_millis() as u64, "Lock acquisition timed out");
            ActorError::timeout(
                format!("lock acquisition on {}", core.type_name()),
                limit.as_millis() as u64,
            )
        })
    }

    pub(crate) fn with_instance<R>(&self, core: &Core<T>, f: impl FnOnce(&T) -> R) -> Result<R> {
        let guard = self.acquire(core)?;
        core.ensure_alive()?;
        guard.with(f).ok_or_else(|| core.dead())
    }

    pub(crate) fn dispatch<R, F>(&self, proxy: &Arc<Proxy<T>>, body: F) -> Result<R>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<R>,
    {
        let core = &proxy.core;
        core.ensure_alive()?;
        core.metrics().record_call();

        let mut gate = LockedGate {
            guard: self.acquire(core)?,
        };
        core.ensure_alive()?;
        let started = Instant::now();

        let outcome = {
            let mut shell = Shell::new(proxy, &mut gate);
            panic::catch_unwind(AssertUnwindSafe(|| body(&mut shell)))
                .unwrap_or_else(|payload| Err(ActorError::from_panic(payload)))
        };
        let result = proxy.settle(gate.slot(), outcome);
        proxy.finish_frame(gate.slot());
        drop(gate);
        core.notify_available();

        if let Some(limit) = core.config().watchdog() {
            if started.elapsed() > limit {
                core.metrics().record_timeout();
                warn!(actor_id = %core.id, elapsed_ms = started.elapsed().as_millis() as u64, "Call exceeded watchdog limit");
                return Err(ActorError::timeout(
                    format!("call on {}", core.type_name()),
                    limit.as_millis() as u64,
                ));
            }
        }
        result
    }

    /// Run `body` on a tracked thread once it acquires the lock
    pub(crate) fn cast<F>(&self, proxy: &Arc<Proxy<T>>, body: F) -> Result<()>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<()> + Send + 'static,
    {
        let target = proxy.clone();
        proxy.core.spawn_tracked(move || {
            if let Err(err) = target.enter(body) {
                debug!(actor_id = %target.core.id, error = %err, "Async call failed");
            }
        })
    }

    /// Drive a cooperative body on the calling thread; the lock is only held inside `with`
    pub(crate) fn suspend<R, F, Fut>(&self, proxy: &Arc<Proxy<T>>, body: F) -> Result<R>
    where
        F: FnOnce(Cooperative<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + 'static,
        R: Send + 'static,
    {
        let core = &proxy.core;
        core.ensure_alive()?;
        core.metrics().record_call();

        let cooperative = Cooperative::liberated(proxy.clone());
        let mut task: Task<(), R> = Task::serial(None, move |_| async move { body(cooperative).await });
        let outcome = task.value();

        let guard = self.acquire(core)?;
        let result = proxy.settle(&guard, outcome);
        proxy.finish_frame(&guard);
        drop(guard);
        core.notify_available();
        result
    }

    /// Tear the instance down once the current holder, if any, lets go
    pub(crate) fn shutdown(&self, core: &Core<T>) {
        match self.lock.try_lock_for(core.config().destroy_grace) {
            Some(guard) => core.teardown_slot(&guard),
            None => {
                warn!(actor_id = %core.id, "Lock still held after grace period; holder tears down on release");
            }
        }
    }
}
