//! Signals shared between threads and actors

mod common;

use cloister::{ActorBehavior, Signal, Strategy, Wakeup};
use common::{settle, system_with};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn no_waiters_means_no_delivery() {
    let signal: Signal = Signal::new();
    assert!(!signal.signal("fubar", None));
    assert!(!signal.broadcast("fubar", None));
}

#[test]
fn signal_wakes_a_single_waiter() {
    let signal = Arc::new(Signal::<()>::new());
    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_for("go"))
        })
        .collect();
    settle();

    assert!(signal.signal("go", None));
    settle();
    let finished = waiters.iter().filter(|w| w.is_finished()).count();
    assert_eq!(finished, 1);

    assert!(signal.signal("go", None));
    for waiter in waiters {
        assert!(waiter.join().unwrap().is_ok());
    }
}

#[test]
fn broadcast_wakes_every_waiter() {
    let signal = Arc::new(Signal::<&'static str>::new());
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_for("go"))
        })
        .collect();
    settle();

    assert!(signal.broadcast("go", Some("all")));
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap().unwrap(), Wakeup::Payload("all"));
    }
}

#[test]
fn wakeup_without_payload_reports_time_waited() {
    let signal = Arc::new(Signal::<()>::new());
    let sender = signal.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        sender.signal("go", None);
    });
    let waited = signal.wait_for("go").unwrap().elapsed().unwrap();
    assert!(waited >= Duration::from_millis(200));
}

#[derive(Default)]
struct Gatekeeper;

impl ActorBehavior for Gatekeeper {}

#[test]
fn actor_waits_on_its_signal_without_holding_the_lock() {
    let inst = system_with(Strategy::Liberated)
        .spawn(|| Ok(Gatekeeper))
        .unwrap();

    let waiter = inst.clone();
    let t_wait = thread::spawn(move || {
        waiter.enter(|shell| {
            let signal = shell.signal()?;
            shell.wait_for(&signal, "open")
        })
    });
    settle();
    assert!(inst.is_available());

    let woke = inst
        .enter(|shell| Ok(shell.signal()?.signal("open", None)))
        .unwrap();
    assert!(woke);
    assert!(t_wait.join().unwrap().unwrap().elapsed().is_some());
}

#[test]
fn wait_with_timeout_elapses() {
    let inst = system_with(Strategy::Liberated)
        .spawn(|| Ok(Gatekeeper))
        .unwrap();
    let outcome = inst
        .enter(|shell| {
            let signal = shell.signal()?;
            shell.wait_for_timeout(&signal, "never", Duration::from_millis(30))
        })
        .unwrap();
    assert!(outcome.is_none());
}
