//! Call contexts handed to actor code
//!
//! [`Shell`] is the synchronous context of a call running under the actor's
//! exclusion. The instance is only reachable through [`Shell::with`], and
//! suspension points (`defer`, `sleep`, `wait_for`) need `&mut self`, so no
//! reference to the instance can survive while exclusion is released.
//!
//! [`Cooperative`] is the asynchronous counterpart used by
//! [`ActorRef::suspend`]. On a confined actor its futures hand the dedicated
//! thread back to the request queue until the awaited work completes.

use crate::error::{ActorError, Result};
use crate::proxy::confined::Confinement;
use crate::proxy::{ActorRef, Engine, Gate, Proxy};
use crate::registry::{ActorId, InstanceId};
use crate::signal::{Signal, Wakeup};
use crate::system::{ActorBehavior, ActorSystem};
use crate::task::{Progress, Task};
use crate::timer::Timer;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Context of a call holding the actor's exclusion
pub struct Shell<'a, T: ActorBehavior> {
    proxy: &'a Arc<Proxy<T>>,
    gate: &'a mut dyn Gate<T>,
}

impl<'a, T: ActorBehavior> Shell<'a, T> {
    pub(crate) fn new(proxy: &'a Arc<Proxy<T>>, gate: &'a mut dyn Gate<T>) -> Self {
        Self { proxy, gate }
    }

    /// Borrow the raw instance for the duration of `f`
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let core = &self.proxy.core;
        core.ensure_alive()?;
        self.gate.slot().with(f).ok_or_else(|| core.dead())
    }

    /// Release one level of exclusion while `f` runs, then reacquire
    ///
    /// On a confined actor `f` runs on a helper thread and the dedicated
    /// thread serves other requests until it returns.
    pub fn defer<R: Send>(&mut self, f: impl FnOnce() -> R + Send) -> Result<R> {
        let mut f = Some(f);
        let mut out = None;
        self.gate.unlocked(&mut || {
            if let Some(f) = f.take() {
                out = Some(f());
            }
        });
        self.proxy.core.ensure_alive()?;
        out.ok_or_else(|| ActorError::failed("deferred block did not run"))
    }

    /// Sleep without holding exclusion; returns the time actually slept
    pub fn sleep(&mut self, duration: Duration) -> Result<Duration> {
        let started = Instant::now();
        self.defer(|| thread::sleep(duration))?;
        Ok(started.elapsed())
    }

    /// Wait on a signal without holding exclusion
    pub fn wait_for<P: Clone + Send>(&mut self, signal: &Signal<P>, name: &str) -> Result<Wakeup<P>> {
        self.defer(|| signal.wait_for(name))?
    }

    pub fn wait_for_timeout<P: Clone + Send>(
        &mut self,
        signal: &Signal<P>,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<Wakeup<P>>> {
        self.defer(|| signal.wait_for_timeout(name, timeout))?
    }

    pub fn id(&self) -> ActorId {
        self.proxy.core.id.clone()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.proxy.core.instance_id()
    }

    pub fn system(&self) -> &ActorSystem {
        &self.proxy.core.system
    }

    /// Handle to the actor this call runs in
    pub fn current_self(&self) -> Result<ActorRef<T>> {
        self.proxy.core.current_self()
    }

    pub fn signal(&self) -> Result<Arc<Signal>> {
        self.proxy.core.own_signal()
    }

    pub fn timer(&self) -> Result<Arc<Timer>> {
        self.proxy.core.own_timer()
    }

    /// Run `body` later, on another thread, holding the actor's exclusion
    pub fn async_locked<F>(&self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<()> + Send + 'static,
    {
        self.proxy.cast(body)
    }

    /// Run `body` on a new thread that only receives the actor's handle
    pub fn async_unlocked<F>(&self, body: F) -> Result<()>
    where
        F: FnOnce(ActorRef<T>) -> Result<()> + Send + 'static,
    {
        let me = self.current_self()?;
        let actor = me.id();
        self.proxy.core.spawn_tracked(move || {
            if let Err(err) = body(me) {
                debug!(actor_id = %actor, error = %err, "Unlocked async body failed");
            }
        })
    }

    /// Route unhandled failures of this actor to `other`
    pub fn link<U: ActorBehavior>(&self, other: &ActorRef<U>) -> Result<()> {
        self.current_self()?.link(other);
        Ok(())
    }
}

enum Access<T: ActorBehavior> {
    Confined(Rc<Confinement<T>>),
    Liberated,
}

/// Context of a cooperative body started with [`ActorRef::suspend`]
pub struct Cooperative<T: ActorBehavior> {
    proxy: Arc<Proxy<T>>,
    access: Access<T>,
}

impl<T: ActorBehavior> Cooperative<T> {
    pub(crate) fn confined(local: Rc<Confinement<T>>) -> Self {
        Self {
            proxy: local.proxy().clone(),
            access: Access::Confined(local),
        }
    }

    pub(crate) fn liberated(proxy: Arc<Proxy<T>>) -> Self {
        Self {
            proxy,
            access: Access::Liberated,
        }
    }

    /// Borrow the raw instance for the duration of `f`
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let core = &self.proxy.core;
        core.ensure_alive()?;
        match (&self.access, &self.proxy.engine) {
            (Access::Confined(local), _) => local.slot().with(f).ok_or_else(|| core.dead()),
            (Access::Liberated, Engine::Liberated(engine)) => engine.with_instance(core, f),
            (Access::Liberated, Engine::Confined(_)) => Err(core.dead()),
        }
    }

    /// Run blocking `f` on a worker thread; the actor is free until it completes
    pub async fn defer<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.proxy.core.ensure_alive()?;
        let task = Task::threaded(None, move |_| Ok(f()))?;
        let out = Deferred { task }.await;
        self.proxy.core.ensure_alive()?;
        out
    }

    pub async fn sleep(&self, duration: Duration) -> Result<Duration> {
        let started = Instant::now();
        self.defer(move || thread::sleep(duration)).await?;
        Ok(started.elapsed())
    }

    pub async fn wait_for<P>(&self, signal: Arc<Signal<P>>, name: &str) -> Result<Wakeup<P>>
    where
        P: Clone + Send + 'static,
    {
        let name = name.to_string();
        self.defer(move || signal.wait_for(&name)).await?
    }

    pub async fn wait_for_timeout<P>(
        &self,
        signal: Arc<Signal<P>>,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<Wakeup<P>>>
    where
        P: Clone + Send + 'static,
    {
        let name = name.to_string();
        self.defer(move || signal.wait_for_timeout(&name, timeout)).await?
    }

    pub fn id(&self) -> ActorId {
        self.proxy.core.id.clone()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.proxy.core.instance_id()
    }

    pub fn current_self(&self) -> Result<ActorRef<T>> {
        self.proxy.core.current_self()
    }

    pub fn signal(&self) -> Result<Arc<Signal>> {
        self.proxy.core.own_signal()
    }
}

/// Completion of a threaded task, awaited from a serial one
struct Deferred<R: Send + 'static> {
    task: Task<(), R>,
}

impl<R: Send + 'static> Unpin for Deferred<R> {}

impl<R: Send + 'static> Future for Deferred<R> {
    type Output = Result<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.task.poll_with(None, cx.waker()) {
            Progress::Finished => Poll::Ready(self.task.value()),
            Progress::Ceased(()) | Progress::Suspended => Poll::Pending,
        }
    }
}
