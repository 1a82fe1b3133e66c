//! Exclusion, defer and reentrancy for both strategies

mod common;

use cloister::{ActorBehavior, ActorError, Strategy, TERMINATED};
use common::{settle, system_with};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

struct Mailbox {
    tx: Sender<&'static str>,
    rx: Receiver<&'static str>,
    calls: Cell<u32>,
}

impl ActorBehavior for Mailbox {
    fn inspect(&self) -> String {
        format!("Mailbox(calls: {})", self.calls.get())
    }
}

impl Mailbox {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            calls: Cell::new(0),
        }
    }

    fn go(&self) {
        self.calls.set(self.calls.get() + 1);
        let _ = self.tx.send("ohai");
    }
}

fn each_strategy(test: impl Fn(Strategy)) {
    test(Strategy::Liberated);
    test(Strategy::Confined);
}

#[test]
fn behaves_like_a_plain_instance() {
    each_strategy(|strategy| {
        let inst = system_with(strategy).spawn(|| Ok(Mailbox::new())).unwrap();
        inst.call(|m| Ok(m.go())).unwrap();
        assert_eq!(inst.call(|m| Ok(m.rx.recv().ok())).unwrap(), Some("ohai"));
        assert_eq!(inst.strategy(), strategy);
    });
}

#[test]
fn only_one_caller_at_a_time() {
    each_strategy(|strategy| {
        let inst = system_with(strategy).spawn(|| Ok(Mailbox::new())).unwrap();
        let tx = inst.call(|m| Ok(m.tx.clone())).unwrap();

        let pauser = inst.clone();
        let t_pause = thread::spawn(move || pauser.call(|m| Ok(m.rx.recv().ok())));
        settle();
        let goer = inst.clone();
        let t_go = thread::spawn(move || goer.call(|m| Ok(m.go())));
        settle();

        assert!(!inst.is_available());
        assert!(!t_pause.is_finished());
        assert!(!t_go.is_finished());

        // release the blocked holder from outside the actor
        tx.send("outside").unwrap();
        assert_eq!(t_pause.join().unwrap().unwrap(), Some("outside"));
        t_go.join().unwrap().unwrap();
        assert_eq!(inst.call(|m| Ok(m.calls.get())).unwrap(), 1);
    });
}

#[test]
fn defer_admits_the_next_caller() {
    each_strategy(|strategy| {
        let inst = system_with(strategy).spawn(|| Ok(Mailbox::new())).unwrap();
        let pauser = inst.clone();
        let t_pause = thread::spawn(move || {
            pauser.enter(|shell| {
                let rx = shell.with(|m| m.rx.clone())?;
                shell.defer(move || rx.recv().ok())
            })
        });
        settle();
        assert!(inst.is_available());

        inst.call(|m| Ok(m.go())).unwrap();
        assert_eq!(t_pause.join().unwrap().unwrap(), Some("ohai"));
    });
}

#[test]
fn sleep_releases_the_lock() {
    each_strategy(|strategy| {
        let inst = system_with(strategy).spawn(|| Ok(Mailbox::new())).unwrap();
        let sleeper = inst.clone();
        let t_sleep = thread::spawn(move || sleeper.enter(|shell| shell.sleep(Duration::from_millis(500))));
        settle();
        assert!(inst.is_available());

        let started = Instant::now();
        assert_eq!(inst.call(|m| Ok(m.calls.get())).unwrap(), 0);
        assert!(
            started.elapsed() < Duration::from_millis(250),
            "{strategy}: call waited {:?} behind a sleeping caller",
            started.elapsed()
        );

        let slept = t_sleep.join().unwrap().unwrap();
        assert!(slept >= Duration::from_millis(500));
    });
}

#[test]
fn waiting_on_own_signal_lets_the_signaller_in() {
    each_strategy(|strategy| {
        let inst = system_with(strategy).spawn(|| Ok(Mailbox::new())).unwrap();
        let waiter = inst.clone();
        let t_wait = thread::spawn(move || {
            waiter.enter(|shell| {
                let signal = shell.signal()?;
                let wakeup = shell.wait_for(&signal, "open")?;
                shell.with(|m| m.go())?;
                Ok(wakeup)
            })
        });
        settle();

        let signaller = inst.clone();
        let t_signal = thread::spawn(move || signaller.enter(|shell| Ok(shell.signal()?.signal("open", None))));
        let deadline = Instant::now() + Duration::from_secs(2);
        while !t_signal.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(t_signal.is_finished(), "{strategy}: signaller never got in");
        assert!(t_signal.join().unwrap().unwrap());

        assert!(t_wait.join().unwrap().unwrap().elapsed().is_some());
        assert_eq!(inst.call(|m| Ok(m.calls.get())).unwrap(), 1);
    });
}

#[test]
fn panic_in_deferred_block_is_reported() {
    each_strategy(|strategy| {
        let inst = system_with(strategy)
            .actor(|| Ok(Mailbox::new()))
            .supervised()
            .spawn()
            .unwrap();
        let err = inst
            .enter(|shell| shell.defer(|| -> u32 { panic!("deferred boom") }))
            .unwrap_err();
        assert!(matches!(err, ActorError::Panicked { .. }), "{strategy}: {err}");
        assert!(inst.is_alive());
    });
}

#[test]
fn reentrant_calls_do_not_deadlock() {
    each_strategy(|strategy| {
        let inst = system_with(strategy).spawn(|| Ok(Mailbox::new())).unwrap();
        let depth = inst
            .enter(|shell| {
                shell.with(|m| m.go())?;
                let me = shell.current_self()?;
                me.enter(|inner| {
                    inner.with(|m| m.go())?;
                    inner.current_self()?.call(|m| Ok(m.calls.get()))
                })
            })
            .unwrap();
        assert_eq!(depth, 2);
    });
}

#[test]
fn cast_runs_later_under_exclusion() {
    each_strategy(|strategy| {
        let inst = system_with(strategy).spawn(|| Ok(Mailbox::new())).unwrap();
        let rx = inst.call(|m| Ok(m.rx.clone())).unwrap();
        inst.cast(|shell| shell.with(|m| m.go())).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "ohai");
    });
}

#[test]
fn async_unlocked_receives_a_handle() {
    let inst = system_with(Strategy::Liberated).spawn(|| Ok(Mailbox::new())).unwrap();
    let rx = inst.call(|m| Ok(m.rx.clone())).unwrap();
    inst.enter(|shell| shell.async_unlocked(|me| me.call(|m| Ok(m.go()))))
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "ohai");
}

#[test]
fn destroyed_actor_is_dead() {
    each_strategy(|strategy| {
        let inst = system_with(strategy).spawn(|| Ok(Mailbox::new())).unwrap();
        assert_eq!(inst.inspect(), "Mailbox(calls: 0)");
        let id = inst.id();
        inst.destroy();
        inst.destroy();

        let err = inst.call(|m| Ok(m.go())).unwrap_err();
        assert!(err.is_dead_for(&id));
        assert!(matches!(err, ActorError::Dead { instance: Some(_), .. }));
        assert!(!inst.is_alive());
        assert!(!inst.is_available());
        assert_eq!(inst.inspect(), TERMINATED);
    });
}

#[test]
fn destroy_releases_waiters_on_own_signal() {
    let inst = system_with(Strategy::Liberated).spawn(|| Ok(Mailbox::new())).unwrap();
    let signal = inst.signal().unwrap();
    let waiter = thread::spawn(move || signal.wait_for("never"));
    settle();
    inst.destroy();
    assert!(waiter.join().unwrap().unwrap_err().is_dead());
    assert!(inst.signal().unwrap_err().is_dead());
}

#[test]
fn watchdog_flags_slow_calls_in_testing_mode() {
    common::init_tracing();
    let config = cloister::RuntimeConfig::default().with_testing(Duration::from_millis(50));
    each_strategy(|strategy| {
        let system = cloister::ActorSystem::with_config(config.clone());
        let inst = system
            .actor(|| Ok(Mailbox::new()))
            .strategy(strategy)
            .supervised()
            .spawn()
            .unwrap();
        let started = Instant::now();
        let err = inst
            .call(|_| {
                thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_timeout(), "{strategy}: {err}");
        assert!(started.elapsed() < Duration::from_secs(2));
        thread::sleep(Duration::from_millis(250));
        assert!(inst.is_alive());
    });
}
