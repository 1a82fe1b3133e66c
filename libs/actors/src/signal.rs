//! Named wait/notify queues
//!
//! A [`Signal`] maps names to FIFO waiter lists. `signal` wakes exactly one
//! registered waiter, `broadcast` wakes all of them with the same payload.
//! Waiters either receive the payload or, when none was sent, the time they
//! spent waiting.

use crate::error::{ActorError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// What a waiter receives when it is woken
#[derive(Debug, Clone, PartialEq)]
pub enum Wakeup<P> {
    /// Payload supplied by the sender
    Payload(P),
    /// No payload was supplied; time spent waiting
    Elapsed(Duration),
}

impl<P> Wakeup<P> {
    pub fn payload(self) -> Option<P> {
        match self {
            Wakeup::Payload(p) => Some(p),
            Wakeup::Elapsed(_) => None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Wakeup::Payload(_) => None,
            Wakeup::Elapsed(d) => Some(*d),
        }
    }
}

struct Channel<P> {
    waiters: VecDeque<u64>,
    delivered: HashMap<u64, Option<P>>,
    cached: VecDeque<Option<P>>,
}

impl<P> Default for Channel<P> {
    fn default() -> Self {
        Self {
            waiters: VecDeque::new(),
            delivered: HashMap::new(),
            cached: VecDeque::new(),
        }
    }
}

struct State<P> {
    channels: HashMap<String, Channel<P>>,
    next_ticket: u64,
    closed: Option<ActorError>,
}

/// Condition primitive keyed by signal name
pub struct Signal<P = ()> {
    state: Mutex<State<P>>,
    condvar: Condvar,
    cache_signals: bool,
}

impl<P: Clone + Send> Signal<P> {
    /// Signals sent while nobody waits are dropped
    pub fn new() -> Self {
        Self::with_policy(false)
    }

    /// Signals sent while nobody waits are kept for the next waiter
    pub fn caching() -> Self {
        Self::with_policy(true)
    }

    fn with_policy(cache_signals: bool) -> Self {
        Self {
            state: Mutex::new(State {
                channels: HashMap::new(),
                next_ticket: 0,
                closed: None,
            }),
            condvar: Condvar::new(),
            cache_signals,
        }
    }

    pub fn caches_signals(&self) -> bool {
        self.cache_signals
    }

    /// Wake one waiter; returns whether a waiter received it, or whether it
    /// was cached for the next one
    pub fn signal(&self, name: &str, payload: Option<P>) -> bool {
        let mut state = self.state.lock();
        if state.closed.is_some() {
            return false;
        }
        let cache = self.cache_signals;
        let channel = state.channels.entry(name.to_string()).or_default();
        match channel.waiters.pop_front() {
            Some(ticket) => {
                channel.delivered.insert(ticket, payload);
                drop(state);
                self.condvar.notify_all();
                true
            }
            None => {
                if cache {
                    channel.cached.push_back(payload);
                }
                cache
            }
        }
    }

    /// Wake every current waiter with the same payload
    pub fn broadcast(&self, name: &str, payload: Option<P>) -> bool {
        let mut state = self.state.lock();
        if state.closed.is_some() {
            return false;
        }
        let Some(channel) = state.channels.get_mut(name) else {
            return false;
        };
        if channel.waiters.is_empty() {
            return false;
        }
        while let Some(ticket) = channel.waiters.pop_front() {
            channel.delivered.insert(ticket, payload.clone());
        }
        drop(state);
        self.condvar.notify_all();
        true
    }

    /// Block until the named signal arrives
    pub fn wait_for(&self, name: &str) -> Result<Wakeup<P>> {
        match self.wait(name, None)? {
            Some(wakeup) => Ok(wakeup),
            None => Err(ActorError::closed("signal")),
        }
    }

    /// Block until the named signal arrives or `timeout` passes (`Ok(None)`)
    pub fn wait_for_timeout(&self, name: &str, timeout: Duration) -> Result<Option<Wakeup<P>>> {
        self.wait(name, Some(Instant::now() + timeout))
    }

    fn wait(&self, name: &str, deadline: Option<Instant>) -> Result<Option<Wakeup<P>>> {
        let started = Instant::now();
        let mut state = self.state.lock();
        if let Some(err) = &state.closed {
            return Err(err.clone());
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        {
            let channel = state.channels.entry(name.to_string()).or_default();
            if let Some(payload) = channel.cached.pop_front() {
                return Ok(Some(Self::wakeup(payload, started)));
            }
            channel.waiters.push_back(ticket);
        }

        loop {
            if let Some(payload) = Self::take_delivery(&mut state, name, ticket) {
                return Ok(Some(Self::wakeup(payload, started)));
            }
            if let Some(err) = &state.closed {
                return Err(err.clone());
            }
            match deadline {
                None => self.condvar.wait(&mut state),
                Some(deadline) => {
                    if self.condvar.wait_until(&mut state, deadline).timed_out() {
                        if let Some(payload) = Self::take_delivery(&mut state, name, ticket) {
                            return Ok(Some(Self::wakeup(payload, started)));
                        }
                        if let Some(channel) = state.channels.get_mut(name) {
                            channel.waiters.retain(|t| *t != ticket);
                        }
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn take_delivery(state: &mut State<P>, name: &str, ticket: u64) -> Option<Option<P>> {
        state
            .channels
            .get_mut(name)
            .and_then(|channel| channel.delivered.remove(&ticket))
    }

    fn wakeup(payload: Option<P>, started: Instant) -> Wakeup<P> {
        match payload {
            Some(p) => Wakeup::Payload(p),
            None => Wakeup::Elapsed(started.elapsed()),
        }
    }

    /// Number of waiters currently registered for `name`
    pub fn waiters(&self, name: &str) -> usize {
        self.state
            .lock()
            .channels
            .get(name)
            .map_or(0, |channel| channel.waiters.len())
    }

    /// Release every waiter with `Closed`; later waits fail immediately
    pub fn close(&self) {
        self.close_with(ActorError::closed("signal"));
    }

    /// Release every waiter with the given error
    pub(crate) fn close_with(&self, error: ActorError) {
        let mut state = self.state.lock();
        if state.closed.is_some() {
            return;
        }
        let waiting: usize = state.channels.values().map(|c| c.waiters.len()).sum();
        debug!(waiting, error = %error, "Closing signal");
        state.closed = Some(error);
        for channel in state.channels.values_mut() {
            channel.waiters.clear();
            channel.cached.clear();
        }
        drop(state);
        self.condvar.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }
}

impl<P: Clone + Send> Default for Signal<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Signal<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Signal")
            .field("channels", &state.channels.keys().collect::<Vec<_>>())
            .field("cache_signals", &self.cache_signals)
            .field("closed", &state.closed.is_some())
            .finish()
    }
}
