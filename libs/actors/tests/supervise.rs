//! Supervision, restart hooks, aborts and linking

mod common;

use cloister::{ActorBehavior, ActorError, Exit, Strategy, SupervisorDirective};
use common::system_with;
use crossbeam_channel::{unbounded, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Sniper;

impl ActorBehavior for Sniper {}

impl Sniper {
    fn snipe(&self) -> cloister::Result<()> {
        Err(ActorError::failed("AHHHHHHH"))
    }

    fn halted_snipe(&self) -> cloister::Result<()> {
        Err(ActorError::abort(ActorError::failed("AHHHHHHH")))
    }
}

fn each_strategy(test: impl Fn(Strategy)) {
    test(Strategy::Liberated);
    test(Strategy::Confined);
}

#[test]
fn rebuilds_instance_on_unexpected_failure() {
    each_strategy(|strategy| {
        let inst = system_with(strategy)
            .actor(|| Ok(Sniper))
            .supervised()
            .spawn()
            .unwrap();
        let before = inst.instance_id().unwrap();
        let err = inst.call(|s| s.snipe()).unwrap_err();
        assert!(matches!(err, ActorError::Failed { ref message, .. } if message == "AHHHHHHH"));
        assert_ne!(inst.instance_id().unwrap(), before);
        assert!(inst.is_alive());
        inst.call(|_| Ok(())).unwrap();
    });
}

#[test]
fn panics_are_supervised_like_errors() {
    each_strategy(|strategy| {
        let inst = system_with(strategy)
            .actor(|| Ok(Sniper))
            .supervised()
            .spawn()
            .unwrap();
        let before = inst.instance_id().unwrap();
        let err = inst.call(|_| -> cloister::Result<()> { panic!("kaboom") }).unwrap_err();
        assert!(matches!(err, ActorError::Panicked { ref message } if message == "kaboom"));
        assert_ne!(inst.instance_id().unwrap(), before);
    });
}

#[test]
fn aborted_failure_keeps_the_instance() {
    each_strategy(|strategy| {
        let inst = system_with(strategy)
            .actor(|| Ok(Sniper))
            .supervised()
            .spawn()
            .unwrap();
        let before = inst.instance_id().unwrap();
        let err = inst.call(|s| s.halted_snipe()).unwrap_err();
        // the caller sees the inner error, not the wrapper
        assert!(matches!(err, ActorError::Failed { .. }));
        assert_eq!(inst.instance_id().unwrap(), before);
    });
}

#[test]
fn unsupervised_actor_dies_on_failure() {
    each_strategy(|strategy| {
        let inst = system_with(strategy).spawn(|| Ok(Sniper)).unwrap();
        assert!(!inst.is_supervised());
        assert!(matches!(inst.call(|s| s.snipe()).unwrap_err(), ActorError::Failed { .. }));
        assert!(!inst.is_alive());
        assert!(inst.call(|_| Ok(())).unwrap_err().is_dead());
    });
}

#[test]
fn aborted_failure_keeps_unsupervised_actor_alive() {
    let inst = system_with(Strategy::Liberated).spawn(|| Ok(Sniper)).unwrap();
    assert!(inst.call(|s| s.halted_snipe()).is_err());
    assert!(inst.is_alive());
}

struct Resilient {
    restarts: Arc<AtomicUsize>,
}

impl ActorBehavior for Resilient {
    fn restart(&self, error: &ActorError) -> SupervisorDirective {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        match error {
            ActorError::Failed { message, .. } if message == "recoverable" => SupervisorDirective::Resume,
            _ => SupervisorDirective::Rebuild,
        }
    }
}

#[test]
fn restart_hook_can_keep_identity() {
    let restarts = Arc::new(AtomicUsize::new(0));
    let counter = restarts.clone();
    let inst = system_with(Strategy::Liberated)
        .actor(move || {
            Ok(Resilient {
                restarts: counter.clone(),
            })
        })
        .supervised()
        .spawn()
        .unwrap();

    let before = inst.instance_id().unwrap();
    inst.call(|_| -> cloister::Result<()> { Err(ActorError::failed("recoverable")) })
        .unwrap_err();
    assert_eq!(inst.instance_id().unwrap(), before);

    inst.call(|_| -> cloister::Result<()> { Err(ActorError::failed("fatal")) })
        .unwrap_err();
    assert_ne!(inst.instance_id().unwrap(), before);
    assert_eq!(restarts.load(Ordering::SeqCst), 2);
}

struct Hooked {
    generation: usize,
    log: Sender<String>,
}

impl ActorBehavior for Hooked {
    fn restarted(&self) -> cloister::Result<()> {
        let _ = self.log.send(format!("restarted {}", self.generation));
        Ok(())
    }

    fn terminate(&self) -> cloister::Result<()> {
        let _ = self.log.send(format!("terminate {}", self.generation));
        Ok(())
    }
}

#[test]
fn rebuild_terminates_old_and_notifies_new_instance() {
    each_strategy(|strategy| {
        let (log, events) = unbounded();
        let built = Arc::new(AtomicUsize::new(0));
        let inst = system_with(strategy)
            .actor(move || {
                Ok(Hooked {
                    generation: built.fetch_add(1, Ordering::SeqCst),
                    log: log.clone(),
                })
            })
            .supervised()
            .spawn()
            .unwrap();

        inst.call(|_| -> cloister::Result<()> { Err(ActorError::failed("boom")) })
            .unwrap_err();
        assert_eq!(events.recv().unwrap(), "terminate 0");
        assert_eq!(events.recv().unwrap(), "restarted 1");

        inst.destroy();
        assert_eq!(events.recv_timeout(Duration::from_secs(2)).unwrap(), "terminate 1");
    });
}

#[test]
fn failing_factory_destroys_the_actor() {
    let built = Arc::new(AtomicUsize::new(0));
    let inst = system_with(Strategy::Liberated)
        .actor(move || {
            if built.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Sniper)
            } else {
                Err(ActorError::failed("no more snipers"))
            }
        })
        .supervised()
        .spawn()
        .unwrap();

    assert!(inst.call(|s| s.snipe()).is_err());
    assert!(!inst.is_alive());
}

#[test]
fn first_build_failure_is_reported() {
    let err = system_with(Strategy::Confined)
        .spawn(|| -> cloister::Result<Sniper> { Err(ActorError::failed("nope")) })
        .unwrap_err();
    assert!(matches!(err, ActorError::Build { .. }));
}

#[test]
fn shutdown_token_stops_rebuilds() {
    let system = system_with(Strategy::Liberated);
    let inst = system.actor(|| Ok(Sniper)).supervised().spawn().unwrap();
    system.signal_shutdown();
    assert!(inst.call(|s| s.snipe()).is_err());
    assert!(!inst.is_alive());
    assert_eq!(system.metrics().restart_stats.restart_failures, 1);
}

struct Watcher {
    exits: Sender<Exit>,
}

impl ActorBehavior for Watcher {
    const TRAPS_EXIT: bool = true;

    fn trap_exit(&self, exit: Exit) -> cloister::Result<()> {
        let _ = self.exits.send(exit);
        Ok(())
    }
}

#[test]
fn linked_actor_receives_exit_notice() {
    each_strategy(|strategy| {
        let system = system_with(strategy);
        let (exits, notices) = unbounded();
        let watcher = system.spawn(move || Ok(Watcher { exits: exits.clone() })).unwrap();
        let worker = system.actor(|| Ok(Sniper)).supervised().spawn().unwrap();
        let before = worker.instance_id().unwrap();
        worker.link(&watcher);

        let err = worker.call(|s| s.snipe()).unwrap_err();
        assert!(matches!(err, ActorError::Failed { .. }));

        let exit = notices.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(exit.actor, worker.id());
        assert_eq!(exit.instance, before);
        assert!(matches!(exit.error, ActorError::Failed { .. }));
        // the linked actor handles the failure instead of local supervision
        assert_eq!(worker.instance_id().unwrap(), before);
        assert_eq!(system.metrics().exits_trapped, 1);
    });
}

#[test]
fn link_to_non_trapping_actor_falls_back_to_supervision() {
    let system = system_with(Strategy::Liberated);
    let bystander = system.spawn(|| Ok(Sniper)).unwrap();
    let worker = system.actor(|| Ok(Sniper)).supervised().spawn().unwrap();
    let before = worker.instance_id().unwrap();
    worker.link(&bystander);

    worker.call(|s| s.snipe()).unwrap_err();
    assert_ne!(worker.instance_id().unwrap(), before);
    assert!(bystander.is_alive());
}
