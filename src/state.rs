//! # State Store
//!
//! The single in-process record of which sandboxes and containers exist.
//!
//! ```text
//!             ┌──────────────── Mutex<StateInner> ────────────────┐
//!             │ sandboxes : id → Arc<Sandbox>                      │
//!             │ containers: id → Arc<Container>                    │
//!             │ members   : sandbox id → {container id, …}         │
//!             └────────────────────────────────────────────────────┘
//! ```
//!
//! The lock is held for the map update only. Callers receive `Arc` clones
//! and `Vec` snapshots, so no collaborator call ever runs under the lock and
//! no iterator over the live maps escapes.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::sandbox::Sandbox;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct StateInner {
    sandboxes: HashMap<String, Arc<Sandbox>>,
    containers: HashMap<String, Arc<Container>>,
    members: HashMap<String, BTreeSet<String>>,
}

/// Lock-guarded sandbox and container maps.
#[derive(Debug, Default)]
pub struct StateStore {
    inner: Mutex<StateInner>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        // Every update is a single map operation, so a poisoned guard still
        // protects consistent maps.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a sandbox, replacing any previous entry with the same id.
    pub fn add_sandbox(&self, sandbox: Arc<Sandbox>) {
        let mut inner = self.lock();
        inner.members.entry(sandbox.id().to_string()).or_default();
        inner.sandboxes.insert(sandbox.id().to_string(), sandbox);
    }

    pub fn get_sandbox(&self, id: &str) -> Option<Arc<Sandbox>> {
        self.lock().sandboxes.get(id).cloned()
    }

    pub fn has_sandbox(&self, id: &str) -> bool {
        self.lock().sandboxes.contains_key(id)
    }

    /// Unregisters a sandbox. Member containers must be removed first.
    pub fn remove_sandbox(&self, id: &str) -> Option<Arc<Sandbox>> {
        let mut inner = self.lock();
        inner.members.remove(id);
        inner.sandboxes.remove(id)
    }

    /// Registers a container under its owning sandbox.
    ///
    /// An unknown owning sandbox is an invariant violation, reported as
    /// [`Error::Internal`].
    pub fn add_container(&self, container: Arc<Container>) -> Result<()> {
        let mut inner = self.lock();
        let sandbox_id = container.sandbox_id().to_string();
        if !inner.sandboxes.contains_key(&sandbox_id) {
            return Err(Error::Internal(format!(
                "container {} references unknown sandbox {}",
                container.id(),
                sandbox_id
            )));
        }
        inner
            .members
            .entry(sandbox_id)
            .or_default()
            .insert(container.id().to_string());
        inner
            .containers
            .insert(container.id().to_string(), container);
        Ok(())
    }

    pub fn get_container(&self, id: &str) -> Option<Arc<Container>> {
        self.lock().containers.get(id).cloned()
    }

    /// Removes a container from the global map and its sandbox's members.
    pub fn remove_container(&self, container: &Container) -> Option<Arc<Container>> {
        let mut inner = self.lock();
        if let Some(members) = inner.members.get_mut(container.sandbox_id()) {
            members.remove(container.id());
        }
        inner.containers.remove(container.id())
    }

    /// Snapshot of a sandbox's member containers, ordered by id.
    pub fn sandbox_containers(&self, sandbox_id: &str) -> Vec<Arc<Container>> {
        let inner = self.lock();
        inner
            .members
            .get(sandbox_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.containers.get(id).cloned())
            .collect()
    }

    /// Snapshot of every sandbox.
    pub fn sandboxes(&self) -> Vec<Arc<Sandbox>> {
        self.lock().sandboxes.values().cloned().collect()
    }

    /// Snapshot of every user container.
    pub fn containers(&self) -> Vec<Arc<Container>> {
        self.lock().containers.values().cloned().collect()
    }

    /// Number of sandboxes and containers.
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.sandboxes.len(), inner.containers.len())
    }
}
