//! Actor Registry
//!
//! Actor identities and the name-keyed registry backing supervisors.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique actor identifier, stable across rebuilds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorId {
    id: Uuid,
}

impl ActorId {
    /// Create new actor ID
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Get UUID
    pub fn uuid(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.id.simple())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier of one raw instance; changes every time the instance is rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId {
    id: Uuid,
}

impl InstanceId {
    pub(crate) fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn uuid(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.id.simple())
    }
}

/// Kind of a supervisor registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Actor,
    Pool,
}

/// Type-erased registry entry
pub(crate) trait Registrable: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn kind(&self) -> EntryKind;
    fn type_name(&self) -> &'static str;
    fn terminate(&self);
}

/// Name-keyed registry of supervised actors and pools
#[derive(Default)]
pub(crate) struct NameRegistry {
    entries: RwLock<HashMap<String, Box<dyn Registrable>>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry, returning whatever was registered under the name before
    pub fn insert(
        &self,
        name: impl Into<String>,
        entry: Box<dyn Registrable>,
    ) -> Option<Box<dyn Registrable>> {
        let name = name.into();
        tracing::debug!(name = %name, kind = ?entry.kind(), "Registering supervised entry");
        self.entries.write().insert(name, entry)
    }

    /// Typed lookup; `None` when the name is unknown or holds another type
    pub fn get<E: Clone + 'static>(&self, name: &str) -> Option<E> {
        self.entries
            .read()
            .get(name)
            .and_then(|entry| entry.as_any().downcast_ref::<E>().cloned())
    }

    pub fn kind(&self, name: &str) -> Option<EntryKind> {
        self.entries.read().get(name).map(|entry| entry.kind())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Remove every entry; callers terminate them outside the registry lock
    pub fn drain(&self) -> Vec<(String, Box<dyn Registrable>)> {
        self.entries.write().drain().collect()
    }

    pub fn remove(&self, name: &str) -> Option<Box<dyn Registrable>> {
        self.entries.write().remove(name)
    }
}

impl fmt::Debug for NameRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameRegistry")
            .field("names", &self.names())
            .finish()
    }
}
