//! Scheduled and recurring callbacks
//!
//! A timer pairs a liberated schedule actor (the action list, sorted by next
//! due time) with a runner thread. The runner sleeps on a signal with the
//! time until the next action is due, so inserting, pausing or cancelling
//! wakes it immediately. Callbacks run on the runner thread outside the
//! schedule's lock.

use crate::error::{ActorError, Result};
use crate::proxy::{join_within, ActorRef};
use crate::signal::Signal;
use crate::system::{ActorBehavior, ActorSystem};
use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error};

const WAKE: &str = "wakeup";

type Callback = Box<dyn FnMut() -> Result<()> + Send>;

/// One scheduled callback
struct Action {
    interval: Duration,
    recur: bool,
    last_run: Mutex<Instant>,
    cancelled: AtomicBool,
    callback: Mutex<Callback>,
}

impl Action {
    fn new(interval: Duration, recur: bool, callback: Callback) -> Self {
        Self {
            interval,
            recur,
            last_run: Mutex::new(Instant::now()),
            cancelled: AtomicBool::new(false),
            callback: Mutex::new(callback),
        }
    }

    fn due_at(&self) -> Instant {
        *self.last_run.lock() + self.interval
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn fire(&self) {
        if self.is_cancelled() {
            return;
        }
        *self.last_run.lock() = Instant::now();
        let outcome = {
            let mut callback = self.callback.lock();
            panic::catch_unwind(AssertUnwindSafe(|| (&mut **callback)()))
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_dead() => {
                debug!(error = %err, "Timed action hit a dead actor; cancelling it");
                self.cancelled.store(true, Ordering::SeqCst);
            }
            Ok(Err(err)) => {
                error!(error = %err, "Timed action generated an error");
            }
            Err(payload) => {
                let err = ActorError::from_panic(payload);
                error!(error = %err, "Timed action panicked");
            }
        }
    }
}

/// Handle to a scheduled action
#[derive(Clone)]
pub struct ActionHandle {
    action: Arc<Action>,
    wakeup: Arc<Signal>,
}

impl ActionHandle {
    /// Stop this action from firing again
    pub fn cancel(&self) {
        self.action.cancelled.store(true, Ordering::SeqCst);
        self.wakeup.signal(WAKE, None);
    }

    pub fn is_cancelled(&self) -> bool {
        self.action.is_cancelled()
    }

    pub fn interval(&self) -> Duration {
        self.action.interval
    }

    pub fn is_recurring(&self) -> bool {
        self.action.recur
    }
}

impl fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandle")
            .field("interval", &self.action.interval)
            .field("recur", &self.action.recur)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Action list owned by the schedule actor
#[derive(Default)]
pub(crate) struct Schedule {
    actions: RefCell<Vec<Arc<Action>>>,
    paused: Cell<bool>,
}

impl ActorBehavior for Schedule {}

impl Schedule {
    fn sort(&self) {
        self.actions.borrow_mut().sort_by_key(|action| action.due_at());
    }

    fn insert(&self, action: Arc<Action>) {
        self.actions.borrow_mut().push(action);
        self.sort();
    }

    /// When the runner should next wake; `None` while paused or empty
    fn next_due(&self) -> Option<Instant> {
        self.actions.borrow_mut().retain(|action| !action.is_cancelled());
        if self.paused.get() {
            return None;
        }
        self.actions.borrow().first().map(|action| action.due_at())
    }

    fn take_due(&self, now: Instant) -> Vec<Arc<Action>> {
        if self.paused.get() {
            return Vec::new();
        }
        let mut actions = self.actions.borrow_mut();
        let (due, waiting): (Vec<_>, Vec<_>) = actions
            .drain(..)
            .partition(|action| action.due_at() <= now);
        *actions = waiting;
        due
    }

    fn reinsert(&self, fired: Vec<Arc<Action>>) {
        self.actions.borrow_mut().extend(
            fired
                .into_iter()
                .filter(|action| action.recur && !action.is_cancelled()),
        );
        self.sort();
    }
}

/// Recurring and delayed callback scheduler
pub struct Timer {
    schedule: ActorRef<Schedule>,
    wakeup: Arc<Signal>,
    runner: Mutex<Option<JoinHandle<()>>>,
    runner_thread: ThreadId,
    grace: Duration,
}

impl Timer {
    pub fn new(system: &ActorSystem) -> Result<Self> {
        let schedule = system.actor(|| Ok(Schedule::default())).liberated().spawn()?;
        // caching so a wakeup sent while the runner is busy is not lost
        let wakeup = Arc::new(Signal::caching());

        let runner = {
            let schedule = schedule.clone();
            let wakeup = wakeup.clone();
            thread::Builder::new()
                .name("cloister-timer".to_string())
                .spawn(move || run(schedule, wakeup))
                .map_err(|e| ActorError::failed_with_source("failed to spawn timer thread", e))?
        };
        let runner_thread = runner.thread().id();

        Ok(Self {
            schedule,
            wakeup,
            runner: Mutex::new(Some(runner)),
            runner_thread,
            grace: system.config().destroy_grace,
        })
    }

    fn schedule_action<F>(&self, interval: Duration, recur: bool, callback: F) -> Result<ActionHandle>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        let action = Arc::new(Action::new(interval, recur, Box::new(callback)));
        let inserted = action.clone();
        self.schedule.call(move |schedule| {
            schedule.insert(inserted);
            Ok(())
        })?;
        self.wake();
        Ok(ActionHandle {
            action,
            wakeup: self.wakeup.clone(),
        })
    }

    /// Run `callback` every `interval`
    pub fn every<F>(&self, interval: Duration, callback: F) -> Result<ActionHandle>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.schedule_action(interval, true, callback)
    }

    /// Run `callback` once after `interval`
    pub fn after<F>(&self, interval: Duration, callback: F) -> Result<ActionHandle>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.schedule_action(interval, false, callback)
    }

    /// Stop firing actions until `resume`
    pub fn pause(&self) -> Result<()> {
        let changed = self.schedule.call(|schedule| Ok(!schedule.paused.replace(true)))?;
        if changed {
            self.wake();
        }
        Ok(())
    }

    /// Resume firing; overdue actions fire once, then keep their interval
    pub fn resume(&self) -> Result<()> {
        let changed = self.schedule.call(|schedule| Ok(schedule.paused.replace(false)))?;
        if changed {
            self.wake();
        }
        Ok(())
    }

    pub fn is_paused(&self) -> Result<bool> {
        self.schedule.call(|schedule| Ok(schedule.paused.get()))
    }

    /// Remove every action
    pub fn cancel(&self) -> Result<()> {
        self.schedule.call(|schedule| {
            for action in schedule.actions.borrow_mut().drain(..) {
                action.cancelled.store(true, Ordering::SeqCst);
            }
            Ok(())
        })?;
        self.wake();
        Ok(())
    }

    /// Number of scheduled actions
    pub fn len(&self) -> Result<usize> {
        self.schedule.call(|schedule| Ok(schedule.actions.borrow().len()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn wake(&self) {
        self.wakeup.signal(WAKE, None);
    }

    /// Stop the runner and discard every action
    pub fn terminate(&self) {
        self.wakeup.close();
        self.schedule.destroy();
        if thread::current().id() == self.runner_thread {
            return;
        }
        let Some(runner) = self.runner.lock().take() else {
            return;
        };
        if join_within(runner, Instant::now() + self.grace).is_err() {
            error!("Timer runner outlived destroy grace period; detaching");
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("schedule", &self.schedule)
            .field("closed", &self.wakeup.is_closed())
            .finish()
    }
}

fn run(schedule: ActorRef<Schedule>, wakeup: Arc<Signal>) {
    loop {
        let next = match schedule.call(|s| Ok(s.next_due())) {
            Ok(next) => next,
            Err(_) => break,
        };
        let woke = match next {
            Some(due) => {
                let wait = due.saturating_duration_since(Instant::now());
                if wait.is_zero() {
                    Ok(None)
                } else {
                    wakeup.wait_for_timeout(WAKE, wait)
                }
            }
            None => wakeup.wait_for(WAKE).map(Some),
        };
        match woke {
            Err(_) => break,
            Ok(Some(_)) => continue,
            Ok(None) => {}
        }

        let due = match schedule.call(|s| Ok(s.take_due(Instant::now()))) {
            Ok(due) => due,
            Err(_) => break,
        };
        for action in &due {
            action.fire();
        }
        if schedule.call(move |s| {
            s.reinsert(due);
            Ok(())
        })
        .is_err()
        {
            break;
        }
    }
    debug!("Timer runner exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloister_config::RuntimeConfig;
    use std::sync::atomic::AtomicUsize;

    fn timer() -> Timer {
        Timer::new(&ActorSystem::with_config(RuntimeConfig::default())).unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> Result<()> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let tick = {
            let count = count.clone();
            move || {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };
        (count, tick)
    }

    #[test]
    fn test_after_fires_once() {
        let timer = timer();
        let (count, tick) = counter();
        timer.after(Duration::from_millis(100), tick).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(timer.len().unwrap(), 1);

        thread::sleep(Duration::from_millis(180));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(timer.is_empty().unwrap());
    }

    #[test]
    fn test_every_recurs() {
        let timer = timer();
        let (count, tick) = counter();
        timer.every(Duration::from_millis(100), tick).unwrap();
        thread::sleep(Duration::from_millis(1050));
        let fired = count.load(Ordering::SeqCst);
        assert!((9..=11).contains(&fired), "fired {fired} times");
    }

    #[test]
    fn test_pause_stops_and_resume_does_not_burst() {
        let timer = timer();
        let (count, tick) = counter();
        timer.every(Duration::from_millis(100), tick).unwrap();
        thread::sleep(Duration::from_millis(150));
        timer.pause().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        thread::sleep(Duration::from_millis(250));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        timer.resume().unwrap();
        thread::sleep(Duration::from_millis(250));
        let fired = count.load(Ordering::SeqCst);
        assert!((3..=4).contains(&fired), "fired {fired} times");
    }

    #[test]
    fn test_cancel_single_action() {
        let timer = timer();
        let (kept, tick) = counter();
        let (dropped, other) = counter();
        timer.every(Duration::from_millis(50), tick).unwrap();
        let handle = timer.every(Duration::from_millis(50), other).unwrap();
        handle.cancel();
        thread::sleep(Duration::from_millis(180));
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
        assert!(kept.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_cancel_all_and_failing_actions() {
        let timer = timer();
        let (count, tick) = counter();
        timer
            .every(Duration::from_millis(20), || Err(ActorError::failed("boom")))
            .unwrap();
        timer
            .every(Duration::from_millis(20), || -> Result<()> { panic!("kaboom") })
            .unwrap();
        timer.every(Duration::from_millis(100), tick).unwrap();
        thread::sleep(Duration::from_millis(150));
        timer.cancel().unwrap();
        let fired = count.load(Ordering::SeqCst);
        assert_eq!(fired, 1);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), fired);
    }

    #[test]
    fn test_dead_error_cancels_action() {
        let timer = timer();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = {
            let calls = calls.clone();
            timer
                .every(Duration::from_millis(20), move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ActorError::Dead {
                        actor: crate::registry::ActorId::new(),
                        instance: None,
                    })
                })
                .unwrap()
        };
        thread::sleep(Duration::from_millis(120));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_terminate_rejects_new_actions() {
        let timer = timer();
        timer.terminate();
        let (_, tick) = counter();
        assert!(timer.after(Duration::from_millis(1), tick).unwrap_err().is_dead());
    }
}
