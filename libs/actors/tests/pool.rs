//! Worker pools: forwarding, resizing and self-healing

mod common;

use cloister::{ActorBehavior, ActorError, Strategy};
use common::{system, system_with};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Worker;

impl ActorBehavior for Worker {}

impl Worker {
    fn ohai(&self) -> &'static str {
        "ohai"
    }

    fn snipe(&self) -> cloister::Result<()> {
        Err(ActorError::failed("AHHHHHHHHHHH"))
    }
}

#[test]
fn one_worker_by_default() {
    let pool = system().pool(|| Ok(Worker), 1).unwrap();
    assert_eq!(pool.worker_count().unwrap(), 1);
    assert_eq!(pool.target().unwrap(), 1);
    assert_eq!(pool.call(|w| Ok(w.ohai())).unwrap(), "ohai");
}

#[test]
fn grows_and_shrinks_on_request() {
    let pool = system().pool(|| Ok(Worker), 1).unwrap();
    assert_eq!(pool.resize(3).unwrap(), 3);
    assert_eq!(pool.target().unwrap(), 3);
    assert_eq!(pool.worker_count().unwrap(), 3);

    let before = pool.workers().unwrap();
    assert_eq!(pool.resize(2).unwrap(), 2);
    assert_eq!(pool.worker_count().unwrap(), 2);
    assert_eq!(before.iter().filter(|w| !w.is_alive()).count(), 1);
}

#[test]
fn still_has_a_worker_after_a_crash() {
    let pool = system().pool(|| Ok(Worker), 1).unwrap();
    let worker = pool.workers().unwrap().remove(0);
    let before = worker.instance_id().unwrap();

    let err = pool.call(|w| w.snipe()).unwrap_err();
    assert!(matches!(err, ActorError::Failed { ref message, .. } if message == "AHHHHHHHHHHH"));
    assert!(pool.is_alive());

    let workers = pool.workers().unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0], worker);
    assert_ne!(worker.instance_id().unwrap(), before);
}

#[test]
fn processes_all_requests() {
    for strategy in [Strategy::Liberated, Strategy::Confined] {
        let pool = system_with(strategy).pool(|| Ok(Worker), 5).unwrap();
        assert_eq!(pool.worker_count().unwrap(), 5);

        let started = Instant::now();
        let callers: Vec<_> = (0..100)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    pool.call(|w| {
                        thread::sleep(Duration::from_millis(5));
                        Ok(w.ohai())
                    })
                })
            })
            .collect();
        for caller in callers {
            assert_eq!(caller.join().unwrap().unwrap(), "ohai");
        }
        assert!(started.elapsed() < Duration::from_secs(5), "{strategy} pool stalled");
    }
}

#[test]
fn busy_pool_waits_for_a_free_worker() {
    let pool = system().pool(|| Ok(Worker), 1).unwrap();
    let busy = pool.clone();
    let holder = thread::spawn(move || {
        busy.call(|_| {
            thread::sleep(Duration::from_millis(150));
            Ok(())
        })
    });
    common::settle();

    let started = Instant::now();
    assert_eq!(pool.call(|w| Ok(w.ohai())).unwrap(), "ohai");
    assert!(started.elapsed() >= Duration::from_millis(80));
    holder.join().unwrap().unwrap();
}

#[test]
fn inspect_describes_the_pool() {
    let pool = system().pool(|| Ok(Worker), 2).unwrap();
    assert!(pool.inspect().contains("workers: 2"));
    pool.terminate();
    assert_eq!(pool.inspect(), cloister::TERMINATED);
}
