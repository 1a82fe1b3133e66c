//! Dedicated-thread strategy
//!
//! One thread constructs the raw instance and owns it for its lifetime.
//! Other threads enqueue requests carrying their own response channel; the
//! dedicated thread processes them in arrival order, each wrapped in a serial
//! [`Task`]. A task that suspends is parked in a table and re-queued by its
//! waker once the awaited work completes, so other requests run meanwhile.
//! Calls made from the dedicated thread itself run inline.
//!
//! A synchronous [`Shell::defer`] runs its block on a scoped helper thread
//! while the dedicated thread keeps serving the inbox, so `sleep` and
//! `wait_for` inside `enter` release the actor as well.

use super::{Core, Engine, Gate, Proxy, Slot};
use crate::error::{ActorError, Result};
use crate::shell::{Cooperative, Shell};
use crate::system::ActorBehavior;
use crate::task::{ErrorSink, Progress, Task};
use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use futures::future::LocalBoxFuture;
use futures::task::{waker, ArcWake};
use futures::FutureExt;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;
use tracing::{debug, error, trace, warn};

thread_local! {
    /// The confinement owned by the current dedicated thread, if any
    static CONFINED: RefCell<Option<Rc<dyn Any>>> = RefCell::new(None);
}

type Job<T> = Box<dyn FnOnce(Rc<Confinement<T>>) -> LocalBoxFuture<'static, ()> + Send>;

enum Envelope<T: ActorBehavior> {
    Request { job: Job<T>, blocking: bool },
    Resume(u64),
    Shutdown,
}

/// Waker that re-queues a suspended request
struct ResumeWaker<T: ActorBehavior> {
    key: u64,
    outbox: Sender<Envelope<T>>,
}

impl<T: ActorBehavior> ArcWake for ResumeWaker<T> {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        let _ = arc_self.outbox.send(Envelope::Resume(arc_self.key));
    }
}

/// Instance state living on the dedicated thread
pub(crate) struct Confinement<T: ActorBehavior> {
    proxy: Arc<Proxy<T>>,
    slot: Slot<T>,
    inbox: Receiver<Envelope<T>>,
    outbox: Sender<Envelope<T>>,
    sink: ErrorSink,
    suspended: RefCell<HashMap<u64, Task<(), ()>>>,
    next_key: Cell<u64>,
    stopping: Cell<bool>,
}

struct InlineGate<'s, T: ActorBehavior> {
    local: &'s Rc<Confinement<T>>,
}

impl<'s, T: ActorBehavior> Gate<T> for InlineGate<'s, T> {
    fn slot(&self) -> &Slot<T> {
        &self.local.slot
    }

    fn unlocked(&mut self, f: &mut (dyn FnMut() + Send)) {
        Confinement::serve_while(self.local, f);
    }
}

impl<T: ActorBehavior> Confinement<T> {
    pub(crate) fn proxy(&self) -> &Arc<Proxy<T>> {
        &self.proxy
    }

    pub(crate) fn slot(&self) -> &Slot<T> {
        &self.slot
    }

    fn enter<R, F>(local: &Rc<Self>, body: F) -> Result<R>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<R>,
    {
        let core = &local.proxy.core;
        core.ensure_alive()?;
        let mut gate = InlineGate { local };
        let outcome = {
            let mut shell = Shell::new(&local.proxy, &mut gate);
            panic::catch_unwind(AssertUnwindSafe(|| body(&mut shell)))
                .unwrap_or_else(|payload| Err(ActorError::from_panic(payload)))
        };
        local.conclude(outcome)
    }

    /// Process one envelope; `false` once the loop should stop
    fn handle(local: &Rc<Self>, envelope: Envelope<T>) -> bool {
        let Engine::Confined(engine) = &local.proxy.engine else {
            return false;
        };
        let core = &local.proxy.core;
        let (key, mut task) = match envelope {
            Envelope::Shutdown => {
                local.stopping.set(true);
                return false;
            }
            Envelope::Request { job, blocking } => {
                if core.is_destroyed() {
                    // dropping the job closes its response channel
                    return false;
                }
                let key = local.next_key.get();
                local.next_key.set(key + 1);
                engine.busy.store(blocking, Ordering::SeqCst);
                let this = local.clone();
                let task = Task::serial(Some(local.sink.clone()), move |_| async move {
                    job(this).await;
                    Ok(())
                });
                (key, task)
            }
            Envelope::Resume(key) => {
                let Some(task) = local.suspended.borrow_mut().remove(&key) else {
                    return true;
                };
                engine.busy.store(true, Ordering::SeqCst);
                (key, task)
            }
        };

        let resume = waker(Arc::new(ResumeWaker {
            key,
            outbox: local.outbox.clone(),
        }));
        match task.poll_with(None, &resume) {
            Progress::Finished => {}
            Progress::Suspended | Progress::Ceased(()) => {
                trace!(actor_id = %core.id, key, "Request suspended");
                local.suspended.borrow_mut().insert(key, task);
            }
        }
        engine.busy.store(false, Ordering::SeqCst);
        !core.is_destroyed()
    }

    /// Run `f` on a scoped helper thread while this thread keeps serving the inbox
    fn serve_while(local: &Rc<Self>, f: &mut (dyn FnMut() + Send)) {
        let Engine::Confined(engine) = &local.proxy.engine else {
            f();
            return;
        };
        let was_busy = engine.busy.swap(false, Ordering::SeqCst);
        thread::scope(|scope| {
            let (done_tx, done_rx) = bounded::<()>(0);
            let helper = scope.spawn(move || {
                // disconnects `done_rx` however `f` ends
                let _done = done_tx;
                f();
            });

            let mut serving = !local.stopping.get();
            while serving {
                select! {
                    recv(done_rx) -> _ => {
                        serving = false;
                    }
                    recv(local.inbox) -> envelope => {
                        serving = match envelope {
                            Ok(envelope) => Self::handle(local, envelope),
                            Err(_) => false,
                        };
                    }
                }
            }
            if let Err(payload) = helper.join() {
                panic::resume_unwind(payload);
            }
        });
        engine.busy.store(was_busy, Ordering::SeqCst);
    }

    fn conclude<R>(&self, outcome: Result<R>) -> Result<R> {
        let result = self.proxy.settle(&self.slot, outcome);
        self.proxy.finish_frame(&self.slot);
        self.proxy.core.notify_available();
        result
    }
}

pub(crate) struct ConfinedEngine<T: ActorBehavior> {
    sender: Sender<Envelope<T>>,
    thread: OnceCell<ThreadId>,
    runner: Mutex<Option<JoinHandle<()>>>,
    busy: AtomicBool,
}

impl<T: ActorBehavior> ConfinedEngine<T> {
    /// Start the dedicated thread and wait until it has built the instance
    pub(crate) fn start(core: Core<T>) -> Result<Arc<Proxy<T>>> {
        let (sender, inbox) = unbounded();
        let outbox = sender.clone();
        let type_name = core.type_name();
        let thread_name = format!("cloister-{}", core.id);
        let proxy = Arc::new(Proxy {
            core,
            engine: Engine::Confined(Self {
                sender,
                thread: OnceCell::new(),
                runner: Mutex::new(None),
                busy: AtomicBool::new(false),
            }),
        });

        let (ready_tx, ready_rx) = bounded(1);
        let runner = {
            let proxy = proxy.clone();
            thread::Builder::new()
                .name(thread_name)
                .spawn(move || run(proxy, inbox, outbox, ready_tx))
                .map_err(|e| ActorError::failed_with_source("failed to spawn confined thread", e))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                if let Engine::Confined(engine) = &proxy.engine {
                    *engine.runner.lock() = Some(runner);
                }
                Ok(proxy)
            }
            Ok(Err(err)) => {
                let _ = runner.join();
                Err(err)
            }
            Err(_) => {
                let _ = runner.join();
                Err(ActorError::build(type_name, "confined thread exited during construction"))
            }
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn on_own_thread(&self) -> bool {
        self.thread.get() == Some(&thread::current().id())
    }

    /// The confinement, when called from the dedicated thread
    fn local(&self) -> Option<Rc<Confinement<T>>> {
        if !self.on_own_thread() {
            return None;
        }
        CONFINED
            .with(|slot| slot.borrow().clone())
            .and_then(|local| local.downcast::<Confinement<T>>().ok())
    }

    fn enqueue(&self, core: &Core<T>, job: Job<T>, blocking: bool) -> Result<()> {
        self.sender
            .send(Envelope::Request { job, blocking })
            .map_err(|_| core.dead())
    }

    fn await_response<R>(&self, core: &Core<T>, response: Receiver<Result<R>>) -> Result<R> {
        let Some(limit) = core.config().watchdog() else {
            return response.recv().unwrap_or_else(|_| Err(core.dead()));
        };
        match response.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                core.metrics().record_timeout();
                warn!(actor_id = %core.id, timeout_ms = limit.as_millis() as u64, "Confined call exceeded watchdog limit");
                Err(ActorError::timeout(
                    format!("call on {}", core.type_name()),
                    limit.as_millis() as u64,
                ))
            }
            Err(RecvTimeoutError::Disconnected) => Err(core.dead()),
        }
    }

    pub(crate) fn dispatch<R, F>(&self, proxy: &Arc<Proxy<T>>, body: F) -> Result<R>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let core = &proxy.core;
        core.ensure_alive()?;
        core.metrics().record_call();
        if let Some(local) = self.local() {
            return Confinement::enter(&local, body);
        }

        let (tx, rx) = bounded(1);
        let job: Job<T> = Box::new(move |local: Rc<Confinement<T>>| {
            async move {
                let _ = tx.send(Confinement::enter(&local, body));
            }
            .boxed_local()
        });
        self.enqueue(core, job, true)?;
        self.await_response(core, rx)
    }

    pub(crate) fn cast<F>(&self, proxy: &Arc<Proxy<T>>, body: F) -> Result<()>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<()> + Send + 'static,
    {
        let core = &proxy.core;
        core.ensure_alive()?;
        core.metrics().record_call();
        let job: Job<T> = Box::new(move |local: Rc<Confinement<T>>| {
            async move {
                if let Err(err) = Confinement::enter(&local, body) {
                    debug!(actor_id = %local.proxy.core.id, error = %err, "Async call failed");
                }
            }
            .boxed_local()
        });
        self.enqueue(core, job, false)
    }

    pub(crate) fn suspend<R, F, Fut>(&self, proxy: &Arc<Proxy<T>>, body: F) -> Result<R>
    where
        F: FnOnce(Cooperative<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + 'static,
        R: Send + 'static,
    {
        let core = &proxy.core;
        core.ensure_alive()?;
        core.metrics().record_call();

        if let Some(local) = self.local() {
            // already on the dedicated thread: nothing else can run until this completes
            let cooperative = Cooperative::confined(local.clone());
            let mut task: Task<(), R> =
                Task::serial(None, move |_| async move { body(cooperative).await });
            return local.conclude(task.value());
        }

        let (tx, rx) = bounded(1);
        let job: Job<T> = Box::new(move |local: Rc<Confinement<T>>| {
            async move {
                let cooperative = Cooperative::confined(local.clone());
                let outcome = AssertUnwindSafe(async move { body(cooperative).await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(ActorError::from_panic(payload)));
                let _ = tx.send(local.conclude(outcome));
            }
            .boxed_local()
        });
        self.enqueue(core, job, true)?;
        self.await_response(core, rx)
    }

    /// Stop the queue loop; joins the dedicated thread unless called from it
    pub(crate) fn shutdown(&self, core: &Core<T>) {
        let _ = self.sender.send(Envelope::Shutdown);
        if self.on_own_thread() {
            return;
        }
        let Some(runner) = self.runner.lock().take() else {
            return;
        };
        let deadline = Instant::now() + core.config().destroy_grace;
        if super::join_within(runner, deadline).is_err() {
            warn!(actor_id = %core.id, "Confined thread outlived destroy grace period; detaching");
        }
    }
}

/// Body of the dedicated thread
fn run<T: ActorBehavior>(
    proxy: Arc<Proxy<T>>,
    inbox: Receiver<Envelope<T>>,
    outbox: Sender<Envelope<T>>,
    ready: Sender<Result<()>>,
) {
    let Engine::Confined(engine) = &proxy.engine else {
        return;
    };
    let _ = engine.thread.set(thread::current().id());

    let instance = match proxy.core.build() {
        Ok(instance) => instance,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let actor = proxy.core.id.clone();
    let sink: ErrorSink = {
        let actor = actor.clone();
        Arc::new(move |err: &ActorError| {
            error!(actor_id = %actor, error = %err, "Confined request task failed");
        })
    };
    let local = Rc::new(Confinement {
        proxy: proxy.clone(),
        slot: Slot::new(instance),
        inbox,
        outbox,
        sink,
        suspended: RefCell::new(HashMap::new()),
        next_key: Cell::new(0),
        stopping: Cell::new(false),
    });
    CONFINED.with(|slot| *slot.borrow_mut() = Some(local.clone() as Rc<dyn Any>));
    let _ = ready.send(Ok(()));

    while !local.stopping.get() {
        let Ok(envelope) = local.inbox.recv() else {
            break;
        };
        if !Confinement::handle(&local, envelope) {
            break;
        }
    }

    let suspended = local.suspended.borrow_mut().drain().count();
    debug!(actor_id = %actor, suspended, "Confined loop exiting");
    proxy.core.teardown_slot(&local.slot);
    CONFINED.with(|slot| slot.borrow_mut().take());
    while local.inbox.try_recv().is_ok() {}
}
