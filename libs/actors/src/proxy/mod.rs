//! Exclusive-access actor core
//!
//! A proxy owns one raw instance and admits a single logical caller at a
//! time. Failures escaping a call are classified here: aborted errors pass
//! straight through, everything else either notifies a linked actor or runs
//! supervision (restart hook, then rebuild from the factory). The error is
//! always returned to the caller.
//!
//! The two execution strategies live in [`liberated`] and [`confined`]; both
//! funnel their outcomes through [`Proxy::settle`].
//!
//! # Lock Ordering
//!
//! The instance gate (reentrant lock or confined thread) is always taken
//! before any of the `Core` mutexes. `Core` mutexes are never held while
//! calling into user code.

pub(crate) mod confined;
pub(crate) mod liberated;

use crate::error::{ActorError, Result};
use crate::registry::{ActorId, InstanceId};
use crate::shell::{Cooperative, Shell};
use crate::signal::Signal;
use crate::system::{ActorBehavior, ActorSystem, Exit, SupervisorDirective, SystemMetrics};
use crate::timer::Timer;
use cloister_config::{RuntimeConfig, ShellStrategy};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use self::confined::ConfinedEngine;
use self::liberated::LiberatedEngine;

/// Builds raw instances; retained for rebuilds
pub type Factory<T> = Arc<dyn Fn() -> Result<T> + Send + Sync>;

/// Signal name used to announce that an actor released its gate
pub(crate) const UNLOCKED: &str = "unlocked";

/// Marker returned by `inspect` once an actor is destroyed
pub const TERMINATED: &str = "#<terminated>";

/// Storage for the raw instance behind a gate
pub(crate) struct Slot<T> {
    instance: RefCell<Option<T>>,
    /// Failure whose rebuild was postponed because an outer frame still borrows the instance
    pending: RefCell<Option<ActorError>>,
}

impl<T> Slot<T> {
    pub(crate) fn new(instance: T) -> Self {
        Self {
            instance: RefCell::new(Some(instance)),
            pending: RefCell::new(None),
        }
    }

    /// Run `f` against the instance; `None` when the slot is empty
    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let instance = self.instance.borrow();
        instance.as_ref().map(f)
    }

    /// Take the instance out, unless a frame still borrows it
    fn take(&self) -> Option<T> {
        self.instance.try_borrow_mut().ok().and_then(|mut current| current.take())
    }

    fn replace(&self, instance: T) -> bool {
        match self.instance.try_borrow_mut() {
            Ok(mut current) => {
                *current = Some(instance);
                true
            }
            Err(_) => false,
        }
    }

    fn is_borrowed(&self) -> bool {
        self.instance.try_borrow_mut().is_err()
    }
}

/// Access to the slot a call is running against
pub(crate) trait Gate<T> {
    fn slot(&self) -> &Slot<T>;

    /// Release one level of exclusion while `f` runs
    fn unlocked(&mut self, f: &mut (dyn FnMut() + Send));
}

/// Failure-notification target
pub(crate) trait ExitTrap: Send + Sync {
    fn traps_exit(&self) -> bool;
    fn notify(&self, exit: Exit);
}

struct LinkTarget<U: ActorBehavior> {
    handle: Weak<Handle<U>>,
}

impl<U: ActorBehavior> ExitTrap for LinkTarget<U> {
    fn traps_exit(&self) -> bool {
        U::TRAPS_EXIT && self.handle.strong_count() > 0
    }

    fn notify(&self, exit: Exit) {
        let Some(handle) = self.handle.upgrade() else {
            return;
        };
        let target = ActorRef { handle };
        let failed = exit.actor.clone();
        let sent = target.cast(move |shell| shell.with(|this| this.trap_exit(exit))?);
        if let Err(err) = sent {
            warn!(actor_id = %failed, linked = %target.id(), error = %err, "Failed to deliver exit notice");
        }
    }
}

/// State shared by both execution strategies
pub(crate) struct Core<T: ActorBehavior> {
    pub(crate) id: ActorId,
    instance: Mutex<InstanceId>,
    pub(crate) strategy: ShellStrategy,
    pub(crate) supervised: bool,
    factory: Factory<T>,
    pub(crate) system: ActorSystem,
    destroyed: AtomicBool,
    handle: OnceCell<Weak<Handle<T>>>,
    link: Mutex<Option<Arc<dyn ExitTrap>>>,
    signal: Mutex<Option<Arc<Signal>>>,
    timer: Mutex<Option<Arc<Timer>>>,
    notifier: Mutex<Option<Arc<Signal>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: ActorBehavior> Core<T> {
    pub(crate) fn new(
        system: ActorSystem,
        factory: Factory<T>,
        strategy: ShellStrategy,
        supervised: bool,
        notifier: Option<Arc<Signal>>,
    ) -> Self {
        Self {
            id: ActorId::new(),
            instance: Mutex::new(InstanceId::new()),
            strategy,
            supervised,
            factory,
            system,
            destroyed: AtomicBool::new(false),
            handle: OnceCell::new(),
            link: Mutex::new(None),
            signal: Mutex::new(None),
            timer: Mutex::new(None),
            notifier: Mutex::new(notifier),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        self.system.config()
    }

    pub(crate) fn metrics(&self) -> &SystemMetrics {
        self.system.metrics_ref()
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn instance_id(&self) -> InstanceId {
        *self.instance.lock()
    }

    pub(crate) fn dead(&self) -> ActorError {
        ActorError::Dead {
            actor: self.id.clone(),
            instance: Some(self.instance_id()),
        }
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(self.dead())
        } else {
            Ok(())
        }
    }

    /// Run the factory, converting failures and panics into `Build` errors
    pub(crate) fn build(&self) -> Result<T> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.factory)())) {
            Ok(Ok(instance)) => Ok(instance),
            Ok(Err(err)) => Err(ActorError::build(self.type_name(), err.to_string())),
            Err(payload) => Err(ActorError::build(
                self.type_name(),
                ActorError::from_panic(payload).to_string(),
            )),
        }
    }

    /// Call `terminate` on a detached instance; failures are logged
    pub(crate) fn terminate_instance(&self, instance: T) {
        match panic::catch_unwind(AssertUnwindSafe(|| instance.terminate())) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(actor_id = %self.id, error = %err, "Terminate hook failed");
            }
            Err(payload) => {
                let err = ActorError::from_panic(payload);
                warn!(actor_id = %self.id, error = %err, "Terminate hook panicked");
            }
        }
        if panic::catch_unwind(AssertUnwindSafe(move || drop(instance))).is_err() {
            warn!(actor_id = %self.id, "Raw instance panicked while dropping");
        }
    }

    /// Empty the slot, terminating the instance; a no-op while a frame borrows it
    pub(crate) fn teardown_slot(&self, slot: &Slot<T>) {
        if let Some(instance) = slot.take() {
            debug!(actor_id = %self.id, "Tearing down raw instance");
            self.terminate_instance(instance);
        }
    }

    pub(crate) fn notify_available(&self) {
        let notifier = self.notifier.lock().clone();
        if let Some(notifier) = notifier {
            notifier.signal(UNLOCKED, None);
        }
    }

    pub(crate) fn set_notifier(&self, notifier: Arc<Signal>) {
        *self.notifier.lock() = Some(notifier);
    }

    pub(crate) fn set_link(&self, target: Arc<dyn ExitTrap>) {
        *self.link.lock() = Some(target);
    }

    fn trapping_link(&self) -> Option<Arc<dyn ExitTrap>> {
        self.link
            .lock()
            .as_ref()
            .filter(|link| link.traps_exit())
            .cloned()
    }

    fn exit_notice(&self, error: &ActorError) -> Exit {
        Exit {
            actor: self.id.clone(),
            instance: self.instance_id(),
            type_name: self.type_name(),
            error: error.clone(),
        }
    }

    /// A handle to this actor, if any external handle is still alive
    pub(crate) fn current_self(&self) -> Result<ActorRef<T>> {
        self.ensure_alive()?;
        self.handle
            .get()
            .and_then(Weak::upgrade)
            .map(|handle| ActorRef { handle })
            .ok_or_else(|| self.dead())
    }

    pub(crate) fn own_signal(&self) -> Result<Arc<Signal>> {
        self.ensure_alive()?;
        let mut signal = self.signal.lock();
        Ok(signal.get_or_insert_with(|| Arc::new(Signal::new())).clone())
    }

    pub(crate) fn own_timer(&self) -> Result<Arc<Timer>> {
        self.ensure_alive()?;
        let mut timer = self.timer.lock();
        if let Some(existing) = timer.as_ref() {
            return Ok(existing.clone());
        }
        let created = Arc::new(Timer::new(&self.system)?);
        *timer = Some(created.clone());
        Ok(created)
    }

    /// Spawn a thread that destroy will wait for
    pub(crate) fn spawn_tracked<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_alive()?;
        let handle = thread::Builder::new()
            .name(format!("cloister-async-{}", self.id))
            .spawn(f)
            .map_err(|e| ActorError::failed_with_source("failed to spawn actor thread", e))?;
        let mut threads = self.threads.lock();
        threads.retain(|thread| !thread.is_finished());
        threads.push(handle);
        Ok(())
    }

    /// Join tracked threads in the background, detaching any that outlive the grace period
    fn reap_threads(&self) {
        let current = thread::current().id();
        let threads: Vec<JoinHandle<()>> = self
            .threads
            .lock()
            .drain(..)
            .filter(|handle| handle.thread().id() != current)
            .collect();
        if threads.is_empty() {
            return;
        }

        let actor = self.id.clone();
        let grace = self.config().destroy_grace;
        let spawned = thread::Builder::new()
            .name("cloister-reaper".to_string())
            .spawn(move || {
                let deadline = Instant::now() + grace;
                for handle in threads {
                    if join_within(handle, deadline).is_err() {
                        warn!(actor_id = %actor, "Actor thread outlived destroy grace period; detaching");
                    }
                }
            });
        if let Err(err) = spawned {
            warn!(actor_id = %self.id, error = %err, "Failed to spawn reaper; detaching actor threads");
        }
    }
}

/// Join `handle` before `deadline`; gives the handle back when it is still running
pub(crate) fn join_within(handle: JoinHandle<()>, deadline: Instant) -> std::result::Result<(), JoinHandle<()>> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Err(handle);
        }
        thread::sleep(Duration::from_millis(5));
    }
    let _ = handle.join();
    Ok(())
}

pub(crate) enum Engine<T: ActorBehavior> {
    Liberated(LiberatedEngine<T>),
    Confined(ConfinedEngine<T>),
}

/// The actor core plus its execution strategy
pub(crate) struct Proxy<T: ActorBehavior> {
    pub(crate) core: Core<T>,
    pub(crate) engine: Engine<T>,
}

impl<T: ActorBehavior> Proxy<T> {
    /// Build the first instance and start the chosen strategy
    pub(crate) fn spawn(core: Core<T>) -> Result<ActorRef<T>> {
        let proxy = match core.strategy {
            ShellStrategy::Liberated => LiberatedEngine::start(core)?,
            ShellStrategy::Confined => ConfinedEngine::start(core)?,
        };
        let handle = Arc::new(Handle {
            proxy: proxy.clone(),
        });
        let _ = proxy.core.handle.set(Arc::downgrade(&handle));
        proxy.core.metrics().record_spawned();
        debug!(
            actor_id = %proxy.core.id,
            actor_type = proxy.core.type_name(),
            strategy = %proxy.core.strategy,
            supervised = proxy.core.supervised,
            "Actor spawned"
        );
        Ok(ActorRef { handle })
    }

    pub(crate) fn enter<R, F>(self: &Arc<Self>, body: F) -> Result<R>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        match &self.engine {
            Engine::Liberated(engine) => engine.dispatch(self, body),
            Engine::Confined(engine) => engine.dispatch(self, body),
        }
    }

    pub(crate) fn cast<F>(self: &Arc<Self>, body: F) -> Result<()>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<()> + Send + 'static,
    {
        match &self.engine {
            Engine::Liberated(engine) => engine.cast(self, body),
            Engine::Confined(engine) => engine.cast(self, body),
        }
    }

    pub(crate) fn suspend<R, F, Fut>(self: &Arc<Self>, body: F) -> Result<R>
    where
        F: FnOnce(Cooperative<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + 'static,
        R: Send + 'static,
    {
        match &self.engine {
            Engine::Liberated(engine) => engine.suspend(self, body),
            Engine::Confined(engine) => engine.suspend(self, body),
        }
    }

    /// Whether a new caller would be admitted right now
    pub(crate) fn is_available(&self) -> bool {
        if self.core.is_destroyed() {
            return false;
        }
        match &self.engine {
            Engine::Liberated(engine) => !engine.is_locked(),
            Engine::Confined(engine) => !engine.is_busy(),
        }
    }

    /// Classify the outcome of a call and run failure handling
    pub(crate) fn settle<R>(&self, slot: &Slot<T>, result: Result<R>) -> Result<R> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if err.bypasses_supervision() {
            return Err(err.unwrap_abort());
        }
        if self.core.is_destroyed() {
            return Err(err);
        }
        self.core.metrics().record_failure();
        self.handle_failure(slot, &err);
        Err(err)
    }

    fn handle_failure(&self, slot: &Slot<T>, err: &ActorError) {
        if let Some(link) = self.core.trapping_link() {
            warn!(actor_id = %self.core.id, error = %err, "Unhandled failure; notifying linked actor");
            self.core.metrics().record_exit_trapped();
            link.notify(self.core.exit_notice(err));
        } else if self.core.supervised {
            self.recover(slot, err);
        } else {
            error!(
                actor_id = %self.core.id,
                actor_type = self.core.type_name(),
                error = %err,
                "Unsupervised actor failed; destroying"
            );
            self.destroy();
            self.core.teardown_slot(slot);
        }
    }

    fn recover(&self, slot: &Slot<T>, err: &ActorError) {
        let directive = slot
            .with(|this| {
                panic::catch_unwind(AssertUnwindSafe(|| this.restart(err)))
                    .unwrap_or(SupervisorDirective::Rebuild)
            })
            .unwrap_or(SupervisorDirective::Rebuild);

        if directive == SupervisorDirective::Resume {
            debug!(actor_id = %self.core.id, error = %err, "Restart hook kept the instance");
            return;
        }
        if slot.is_borrowed() {
            // an outer frame still holds the instance; it rebuilds once it returns
            *slot.pending.borrow_mut() = Some(err.clone());
            return;
        }
        if let Some(old) = slot.take() {
            self.core.terminate_instance(old);
        }
        self.rebuild(slot, err);
    }

    fn rebuild(&self, slot: &Slot<T>, cause: &ActorError) {
        let core = &self.core;
        if core.system.shutdown().is_set() {
            warn!(actor_id = %core.id, "Shutdown in progress; not rebuilding failed actor");
            core.metrics().record_restart(false);
            self.destroy();
            return;
        }

        let instance = match core.build() {
            Ok(instance) => instance,
            Err(err) => {
                error!(actor_id = %core.id, cause = %cause, error = %err, "Rebuild failed; destroying actor");
                core.metrics().record_restart(false);
                self.destroy();
                return;
            }
        };
        if !slot.replace(instance) {
            *slot.pending.borrow_mut() = Some(cause.clone());
            return;
        }

        let fresh = InstanceId::new();
        *core.instance.lock() = fresh;
        core.metrics().record_restart(true);
        warn!(actor_id = %core.id, instance = %fresh, cause = %cause, "Actor rebuilt after failure");

        let restarted = slot.with(|this| panic::catch_unwind(AssertUnwindSafe(|| this.restarted())));
        match restarted {
            Some(Ok(Err(err))) => {
                warn!(actor_id = %core.id, error = %err, "Restarted hook failed");
            }
            Some(Err(payload)) => {
                let err = ActorError::from_panic(payload);
                warn!(actor_id = %core.id, error = %err, "Restarted hook panicked");
            }
            _ => {}
        }
    }

    /// Epilogue of every frame: finish postponed rebuilds and teardowns
    pub(crate) fn finish_frame(&self, slot: &Slot<T>) {
        if self.core.is_destroyed() {
            self.core.teardown_slot(slot);
            return;
        }
        if slot.is_borrowed() {
            return;
        }
        let pending = slot.pending.borrow_mut().take();
        if let Some(cause) = pending {
            if let Some(old) = slot.take() {
                self.core.terminate_instance(old);
            }
            self.rebuild(slot, &cause);
        }
    }

    /// Idempotent teardown
    pub(crate) fn destroy(&self) {
        if self.core.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let core = &self.core;
        debug!(actor_id = %core.id, actor_type = core.type_name(), "Destroying actor");

        let signal = core.signal.lock().take();
        if let Some(signal) = signal {
            signal.close_with(core.dead());
        }
        let timer = core.timer.lock().take();
        if let Some(timer) = timer {
            timer.terminate();
        }
        core.link.lock().take();

        match &self.engine {
            Engine::Liberated(engine) => engine.shutdown(core),
            Engine::Confined(engine) => engine.shutdown(core),
        }
        core.reap_threads();
        core.notify_available();
        core.notifier.lock().take();
        core.metrics().record_destroyed();
    }
}

/// Owner of a proxy; dropping the last one destroys the actor
pub(crate) struct Handle<T: ActorBehavior> {
    proxy: Arc<Proxy<T>>,
}

impl<T: ActorBehavior> Drop for Handle<T> {
    fn drop(&mut self) {
        self.proxy.destroy();
    }
}

/// Cloneable reference to an actor
pub struct ActorRef<T: ActorBehavior> {
    handle: Arc<Handle<T>>,
}

impl<T: ActorBehavior> Clone for ActorRef<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

impl<T: ActorBehavior> ActorRef<T> {
    fn proxy(&self) -> &Arc<Proxy<T>> {
        &self.handle.proxy
    }

    pub fn id(&self) -> ActorId {
        self.proxy().core.id.clone()
    }

    /// Identity of the current raw instance
    pub fn instance_id(&self) -> Result<InstanceId> {
        let core = &self.proxy().core;
        core.ensure_alive()?;
        Ok(core.instance_id())
    }

    pub fn type_name(&self) -> &'static str {
        self.proxy().core.type_name()
    }

    pub fn strategy(&self) -> ShellStrategy {
        self.proxy().core.strategy
    }

    pub fn is_supervised(&self) -> bool {
        self.proxy().core.supervised
    }

    pub fn is_alive(&self) -> bool {
        !self.proxy().core.is_destroyed()
    }

    /// Whether a caller would currently be admitted without waiting
    pub fn is_available(&self) -> bool {
        self.proxy().is_available()
    }

    /// Run `f` against the raw instance under exclusion
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&T) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.proxy().enter(move |shell| shell.with(f)?)
    }

    /// Run `body` with the full call context (defer, sleep, wait_for, async)
    pub fn enter<R, F>(&self, body: F) -> Result<R>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.proxy().enter(body)
    }

    /// Fire-and-forget call; failures go through supervision and the log
    pub fn cast<F>(&self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Shell<'_, T>) -> Result<()> + Send + 'static,
    {
        self.proxy().cast(body)
    }

    /// Run a cooperative body whose suspension points free the actor for other callers
    pub fn suspend<R, F, Fut>(&self, body: F) -> Result<R>
    where
        F: FnOnce(Cooperative<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + 'static,
        R: Send + 'static,
    {
        self.proxy().suspend(body)
    }

    /// Non-owning reference; it does not keep the actor alive
    pub fn downgrade(&self) -> WeakActorRef<T> {
        WeakActorRef {
            id: self.id(),
            handle: Arc::downgrade(&self.handle),
        }
    }

    /// Route this actor's unhandled failures to `other` when it traps exits
    pub fn link<U: ActorBehavior>(&self, other: &ActorRef<U>) {
        let target: Arc<dyn ExitTrap> = Arc::new(LinkTarget {
            handle: Arc::downgrade(&other.handle),
        });
        self.proxy().core.set_link(target);
    }

    pub(crate) fn set_availability_signal(&self, signal: Arc<Signal>) {
        self.proxy().core.set_notifier(signal);
    }

    /// This actor's own signal, created on first use
    pub fn signal(&self) -> Result<Arc<Signal>> {
        self.proxy().core.own_signal()
    }

    /// This actor's own timer, created on first use
    pub fn timer(&self) -> Result<Arc<Timer>> {
        self.proxy().core.own_timer()
    }

    /// Tear the actor down; every later call fails with `Dead`
    pub fn destroy(&self) {
        self.proxy().destroy();
    }

    /// The instance's own description, or the terminated marker
    pub fn inspect(&self) -> String {
        if !self.is_alive() {
            return TERMINATED.to_string();
        }
        self.call(|this| Ok(this.inspect()))
            .unwrap_or_else(|_| TERMINATED.to_string())
    }
}

impl<T: ActorBehavior> fmt::Debug for ActorRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = &self.proxy().core;
        f.debug_struct("ActorRef")
            .field("id", &core.id)
            .field("type", &core.type_name())
            .field("strategy", &core.strategy)
            .field("alive", &!core.is_destroyed())
            .finish()
    }
}

impl<T: ActorBehavior> PartialEq for ActorRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

/// Reference to an actor that does not keep it alive
///
/// Callbacks owned by the actor itself (its timer, for one) hold this form so
/// that dropping the last [`ActorRef`] still destroys the actor.
pub struct WeakActorRef<T: ActorBehavior> {
    id: ActorId,
    handle: Weak<Handle<T>>,
}

impl<T: ActorBehavior> Clone for WeakActorRef<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T: ActorBehavior> WeakActorRef<T> {
    pub fn id(&self) -> ActorId {
        self.id.clone()
    }

    pub fn upgrade(&self) -> Option<ActorRef<T>> {
        self.handle.upgrade().map(|handle| ActorRef { handle })
    }

    /// Like [`ActorRef::call`]; `Dead` once every owning reference is gone
    pub fn call<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&T) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        match self.upgrade() {
            Some(actor) => actor.call(f),
            None => Err(ActorError::Dead {
                actor: self.id.clone(),
                instance: None,
            }),
        }
    }
}

impl<T: ActorBehavior> fmt::Debug for WeakActorRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakActorRef")
            .field("id", &self.id)
            .field("live", &(self.handle.strong_count() > 0))
            .finish()
    }
}
