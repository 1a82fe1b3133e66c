//! Suspend/resume units of work
//!
//! A [`Task`] runs a body that can cease (hand a value back to whoever
//! resumed it) and later be proceeded with a new value. Two styles exist:
//!
//! - **Serial**: the body is a future polled in place on the resuming thread.
//!   `Yielder::cease(v).await` suspends it. The confined strategy wraps every
//!   request in one of these and polls it with a waker that re-queues it.
//! - **Threaded**: the body runs on its own parked OS thread and ceases with a
//!   blocking `ThreadYielder::cease(v)`.
//!
//! The first `proceed` starts the body; every later `proceed(input)` delivers
//! `input` as the return value of the pending `cease`. Errors and panics that
//! escape the body are forwarded to the origin sink, if one was given.

use crate::error::{ActorError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use futures::future::LocalBoxFuture;
use futures::task::{noop_waker_ref, waker, ArcWake, AtomicWaker};
use futures::FutureExt;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, JoinHandle, Thread};
use tracing::{debug, trace};

/// Receiver of errors that escape a task body
pub type ErrorSink = Arc<dyn Fn(&ActorError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStyle {
    Serial,
    Threaded,
}

/// Result of resuming a task
#[derive(Debug, PartialEq)]
pub enum Progress<Y> {
    /// The body ceased with a value
    Ceased(Y),
    /// The body is waiting on something that will wake it
    Suspended,
    /// The body returned; its result is available through `value`
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Waiting,
    Running,
    Complete { failed: bool },
    Halted,
}

/// Values exchanged between a serial body and its resumer
struct Exchange<Y> {
    inbound: RefCell<Option<Y>>,
    outbound: RefCell<Option<Y>>,
}

/// Handle a serial body uses to cease
pub struct Yielder<Y> {
    exchange: Rc<Exchange<Y>>,
}

impl<Y> Yielder<Y> {
    /// Suspend the body, handing `value` to the resumer
    pub fn cease(&self, value: Y) -> Cease<Y> {
        Cease {
            exchange: self.exchange.clone(),
            value: Some(value),
            ceased: false,
        }
    }
}

/// Future returned by [`Yielder::cease`]
pub struct Cease<Y> {
    exchange: Rc<Exchange<Y>>,
    value: Option<Y>,
    ceased: bool,
}

impl<Y> Unpin for Cease<Y> {}

impl<Y> Future for Cease<Y> {
    type Output = Option<Y>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.ceased {
            return Poll::Ready(self.exchange.inbound.borrow_mut().take());
        }
        self.ceased = true;
        let value = self.value.take();
        *self.exchange.outbound.borrow_mut() = value;
        // a real waker re-queues the task so a cease yields to the next request
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

enum Event<Y> {
    Ceased(Y),
    Finished,
}

/// Handle a threaded body uses to cease
pub struct ThreadYielder<Y> {
    inbound: Receiver<Option<Y>>,
    events: Sender<Event<Y>>,
    waker: Arc<AtomicWaker>,
}

impl<Y> ThreadYielder<Y> {
    /// Park the body, handing `value` to the resumer; fails once the task is halted
    pub fn cease(&self, value: Y) -> Result<Option<Y>> {
        self.events
            .send(Event::Ceased(value))
            .map_err(|_| ActorError::closed("task"))?;
        self.waker.wake();
        self.inbound.recv().map_err(|_| ActorError::closed("task"))
    }
}

struct SerialEngine<Y, R> {
    future: Option<LocalBoxFuture<'static, Result<R>>>,
    exchange: Rc<Exchange<Y>>,
}

struct ThreadedEngine<Y, R> {
    inbound: Option<Sender<Option<Y>>>,
    events: Receiver<Event<Y>>,
    result: Arc<Mutex<Option<Result<R>>>>,
    waker: Arc<AtomicWaker>,
    handle: Option<JoinHandle<()>>,
}

enum Engine<Y, R> {
    Serial(SerialEngine<Y, R>),
    Threaded(ThreadedEngine<Y, R>),
}

struct ThreadWaker(Thread);

impl ArcWake for ThreadWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.unpark();
    }
}

/// Resumable unit of work
pub struct Task<Y: 'static, R: 'static> {
    style: TaskStyle,
    state: TaskState,
    started: bool,
    origin: Option<ErrorSink>,
    outcome: Option<Result<R>>,
    engine: Engine<Y, R>,
}

impl<Y: 'static, R: 'static> Task<Y, R> {
    /// Cooperative task polled on the resuming thread
    pub fn serial<F, Fut>(origin: Option<ErrorSink>, body: F) -> Self
    where
        F: FnOnce(Yielder<Y>) -> Fut,
        Fut: Future<Output = Result<R>> + 'static,
    {
        let exchange = Rc::new(Exchange {
            inbound: RefCell::new(None),
            outbound: RefCell::new(None),
        });
        let future = body(Yielder {
            exchange: exchange.clone(),
        })
        .boxed_local();

        Self {
            style: TaskStyle::Serial,
            state: TaskState::Waiting,
            started: false,
            origin,
            outcome: None,
            engine: Engine::Serial(SerialEngine {
                future: Some(future),
                exchange,
            }),
        }
    }

    pub fn style(&self) -> TaskStyle {
        self.style
    }

    pub fn is_waiting(&self) -> bool {
        self.state == TaskState::Waiting
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, TaskState::Complete { .. } | TaskState::Halted)
    }

    pub fn is_error(&self) -> bool {
        self.state == TaskState::Complete { failed: true }
    }

    pub fn is_success(&self) -> bool {
        self.state == TaskState::Complete { failed: false }
    }

    /// Resume the body and block until it ceases or finishes
    pub fn proceed(&mut self, input: Option<Y>) -> Progress<Y> {
        match self.engine {
            Engine::Serial(_) => self.resume_serial(input, noop_waker_ref()),
            Engine::Threaded(_) => {
                if !self.start_threaded(input) {
                    return Progress::Finished;
                }
                self.wait_threaded()
            }
        }
    }

    /// Resume without blocking; `waker` fires when the body can make progress
    pub fn poll_with(&mut self, input: Option<Y>, waker: &Waker) -> Progress<Y> {
        match self.engine {
            Engine::Serial(_) => self.resume_serial(input, waker),
            Engine::Threaded(_) => {
                if self.state != TaskState::Running && !self.start_threaded(input) {
                    return Progress::Finished;
                }
                match self.poll_threaded(&mut Context::from_waker(waker)) {
                    Poll::Ready(progress) => progress,
                    Poll::Pending => Progress::Suspended,
                }
            }
        }
    }

    /// Drive the body to completion, discarding ceased values
    pub fn value(&mut self) -> Result<R> {
        let parked = waker(Arc::new(ThreadWaker(thread::current())));
        while !self.is_complete() {
            let progress = match self.engine {
                Engine::Serial(_) => self.resume_serial(None, &parked),
                Engine::Threaded(_) => self.proceed(None),
            };
            if matches!(progress, Progress::Suspended) {
                thread::park();
            }
        }
        self.outcome
            .take()
            .unwrap_or_else(|| Err(ActorError::closed("task")))
    }

    /// Discard the task; a parked thread sees `Closed` at its next cease and is detached
    pub fn halt(&mut self) {
        if self.is_complete() {
            return;
        }
        debug!(style = ?self.style, "Halting task");
        match &mut self.engine {
            Engine::Serial(serial) => serial.future = None,
            Engine::Threaded(threaded) => {
                threaded.inbound = None;
                threaded.handle = None;
            }
        }
        self.state = TaskState::Halted;
    }

    fn resume_serial(&mut self, input: Option<Y>, waker: &Waker) -> Progress<Y> {
        let Engine::Serial(serial) = &mut self.engine else {
            return Progress::Finished;
        };
        let Some(future) = serial.future.as_mut() else {
            return Progress::Finished;
        };
        if self.started {
            *serial.exchange.inbound.borrow_mut() = input;
        }
        self.started = true;
        self.state = TaskState::Running;

        let mut cx = Context::from_waker(waker);
        let polled = panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));
        let finished = match polled {
            Ok(Poll::Ready(result)) => result,
            Err(payload) => Err(ActorError::from_panic(payload)),
            Ok(Poll::Pending) => {
                self.state = TaskState::Waiting;
                return match serial.exchange.outbound.borrow_mut().take() {
                    Some(value) => Progress::Ceased(value),
                    None => Progress::Suspended,
                };
            }
        };
        serial.future = None;
        self.finish(finished);
        Progress::Finished
    }

    fn start_threaded(&mut self, input: Option<Y>) -> bool {
        let Engine::Threaded(threaded) = &mut self.engine else {
            return false;
        };
        let Some(inbound) = &threaded.inbound else {
            return false;
        };
        let input = if self.started { input } else { None };
        if inbound.send(input).is_err() {
            return false;
        }
        self.started = true;
        self.state = TaskState::Running;
        true
    }

    fn wait_threaded(&mut self) -> Progress<Y> {
        let Engine::Threaded(threaded) = &mut self.engine else {
            return Progress::Finished;
        };
        match threaded.events.recv() {
            Ok(Event::Ceased(value)) => {
                self.state = TaskState::Waiting;
                Progress::Ceased(value)
            }
            Ok(Event::Finished) | Err(_) => {
                self.collect_threaded();
                Progress::Finished
            }
        }
    }

    fn poll_threaded(&mut self, cx: &mut Context<'_>) -> Poll<Progress<Y>> {
        let Engine::Threaded(threaded) = &mut self.engine else {
            return Poll::Ready(Progress::Finished);
        };
        let event = match threaded.events.try_recv() {
            Err(TryRecvError::Empty) => {
                threaded.waker.register(cx.waker());
                match threaded.events.try_recv() {
                    Err(TryRecvError::Empty) => return Poll::Pending,
                    other => other,
                }
            }
            other => other,
        };
        match event {
            Ok(Event::Ceased(value)) => {
                self.state = TaskState::Waiting;
                Poll::Ready(Progress::Ceased(value))
            }
            Ok(Event::Finished) | Err(_) => {
                self.collect_threaded();
                Poll::Ready(Progress::Finished)
            }
        }
    }

    fn collect_threaded(&mut self) {
        let Engine::Threaded(threaded) = &mut self.engine else {
            return;
        };
        let result = threaded
            .result
            .lock()
            .take()
            .unwrap_or_else(|| Err(ActorError::closed("task")));
        threaded.inbound = None;
        if let Some(handle) = threaded.handle.take() {
            let _ = handle.join();
        }
        self.finish(result);
    }

    fn finish(&mut self, result: Result<R>) {
        if let Err(err) = &result {
            trace!(error = %err, "Task body failed");
            if let Some(origin) = &self.origin {
                origin(err);
            }
        }
        self.state = TaskState::Complete {
            failed: result.is_err(),
        };
        self.outcome = Some(result);
    }
}

impl<Y: Send + 'static, R: Send + 'static> Task<Y, R> {
    /// Task whose body runs on its own parked thread
    pub fn threaded<F>(origin: Option<ErrorSink>, body: F) -> Result<Self>
    where
        F: FnOnce(ThreadYielder<Y>) -> Result<R> + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = unbounded::<Option<Y>>();
        let (events_tx, events_rx) = unbounded::<Event<Y>>();
        let result = Arc::new(Mutex::new(None));
        let task_waker = Arc::new(AtomicWaker::new());

        let handle = {
            let result = result.clone();
            let task_waker = task_waker.clone();
            thread::Builder::new()
                .name("cloister-task".to_string())
                .spawn(move || {
                    // parked until the first proceed
                    if inbound_rx.recv().is_err() {
                        return;
                    }
                    let yielder = ThreadYielder {
                        inbound: inbound_rx,
                        events: events_tx.clone(),
                        waker: task_waker.clone(),
                    };
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(yielder)))
                        .unwrap_or_else(|payload| Err(ActorError::from_panic(payload)));
                    *result.lock() = Some(outcome);
                    let _ = events_tx.send(Event::Finished);
                    task_waker.wake();
                })
                .map_err(|e| ActorError::failed_with_source("failed to spawn task thread", e))?
        };

        Ok(Self {
            style: TaskStyle::Threaded,
            state: TaskState::Waiting,
            started: false,
            origin,
            outcome: None,
            engine: Engine::Threaded(ThreadedEngine {
                inbound: Some(inbound_tx),
                events: events_rx,
                result,
                waker: task_waker,
                handle: Some(handle),
            }),
        })
    }
}

impl<Y: 'static, R: 'static> fmt::Debug for Task<Y, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("style", &self.style)
            .field("state", &self.state)
            .finish()
    }
}
