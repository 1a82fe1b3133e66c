//! Named supervision registry
//!
//! A [`Supervisor`] owns supervised actors and pools under string names.
//! Every entry it creates is supervised, so a crashing entry is rebuilt in
//! place and stays reachable under its name. Dropping the supervisor
//! destroys everything it registered.

use crate::error::Result;
use crate::pool::Pool;
use crate::proxy::ActorRef;
use crate::registry::{EntryKind, NameRegistry, Registrable};
use crate::system::{ActorBehavior, ActorSystem};
use cloister_config::ShellStrategy;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

impl<T: ActorBehavior> Registrable for ActorRef<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> EntryKind {
        EntryKind::Actor
    }

    fn type_name(&self) -> &'static str {
        ActorRef::type_name(self)
    }

    fn terminate(&self) {
        self.destroy();
    }
}

impl<T: ActorBehavior> Registrable for Pool<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kind(&self) -> EntryKind {
        EntryKind::Pool
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn terminate(&self) {
        Pool::terminate(self);
    }
}

/// Options for [`Supervisor::pool`]
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub name: String,
    /// Worker count; zero is raised to one
    pub size: usize,
    /// Worker strategy; the system default when `None`
    pub strategy: Option<ShellStrategy>,
}

impl PoolOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 1,
            strategy: None,
        }
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn strategy(mut self, strategy: ShellStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Registry of named supervised actors and pools
pub struct Supervisor {
    system: ActorSystem,
    registry: NameRegistry,
}

impl Supervisor {
    pub fn new(system: &ActorSystem) -> Self {
        Self {
            system: system.clone(),
            registry: NameRegistry::new(),
        }
    }

    fn register(&self, name: String, entry: Box<dyn Registrable>) {
        if let Some(old) = self.registry.insert(name.clone(), entry) {
            warn!(name = %name, old_type = old.type_name(), "Replacing supervised entry; terminating the previous one");
            old.terminate();
        }
    }

    /// Spawn a supervised actor with the default strategy and register it under `name`
    ///
    /// Entries otherwise live until the supervisor is terminated or dropped.
    /// Registering a name that is already taken replaces the entry and
    /// terminates the previous actor or pool, so no orphan keeps running
    /// outside the registry. Use [`release`](Self::release) to drop a single
    /// entry explicitly.
    pub fn supervise_as<T, F>(&self, name: impl Into<String>, factory: F) -> Result<ActorRef<T>>
    where
        T: ActorBehavior,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let strategy = self.system.config().default_strategy;
        self.supervise_with(name, strategy, factory)
    }

    /// Like [`supervise_as`](Self::supervise_as) with an explicit strategy
    pub fn supervise_with<T, F>(
        &self,
        name: impl Into<String>,
        strategy: ShellStrategy,
        factory: F,
    ) -> Result<ActorRef<T>>
    where
        T: ActorBehavior,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let name = name.into();
        let actor = self
            .system
            .actor(factory)
            .supervised()
            .strategy(strategy)
            .spawn()?;
        debug!(name = %name, actor_id = %actor.id(), "Supervising actor");
        self.register(name, Box::new(actor.clone()));
        Ok(actor)
    }

    /// Build a pool of supervised workers and register it under `options.name`
    pub fn pool<T, F>(&self, factory: F, options: PoolOptions) -> Result<Pool<T>>
    where
        T: ActorBehavior,
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        let strategy = options
            .strategy
            .unwrap_or(self.system.config().default_strategy);
        let pool = Pool::new(&self.system, Arc::new(factory), options.size, strategy)?;
        debug!(name = %options.name, size = options.size.max(1), "Supervising pool");
        self.register(options.name, Box::new(pool.clone()));
        Ok(pool)
    }

    /// Typed lookup of a supervised actor
    pub fn actor<T: ActorBehavior>(&self, name: &str) -> Option<ActorRef<T>> {
        self.registry.get::<ActorRef<T>>(name)
    }

    /// Typed lookup of a supervised pool
    pub fn pool_of<T: ActorBehavior>(&self, name: &str) -> Option<Pool<T>> {
        self.registry.get::<Pool<T>>(name)
    }

    pub fn kind(&self, name: &str) -> Option<EntryKind> {
        self.registry.kind(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and terminate one entry; returns whether the name was registered
    pub fn release(&self, name: &str) -> bool {
        match self.registry.remove(name) {
            Some(entry) => {
                entry.terminate();
                true
            }
            None => false,
        }
    }

    /// Terminate every registered entry
    pub fn terminate(&self) {
        for (name, entry) in self.registry.drain() {
            debug!(name = %name, kind = ?entry.kind(), "Terminating supervised entry");
            entry.terminate();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("system", &self.system.system_id())
            .field("registry", &self.registry)
            .finish()
    }
}
