//! Name registrar: exclusive name → id reservations.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Holds at most one owner id per name.
#[derive(Debug, Default)]
pub struct NameRegistrar {
    names: RwLock<HashMap<String, String>>,
}

impl NameRegistrar {
    /// Creates an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` for `id`.
    ///
    /// Reserving a name the same id already holds succeeds. A name held by
    /// another id fails with [`Error::NameConflict`] naming the owner.
    pub fn reserve(&self, name: &str, id: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Validation("name cannot be empty".to_string()));
        }
        let mut names = self
            .names
            .write()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        match names.get(name) {
            Some(owner) if owner == id => Ok(()),
            Some(owner) => Err(Error::NameConflict {
                name: name.to_string(),
                owner: owner.clone(),
            }),
            None => {
                names.insert(name.to_string(), id.to_string());
                Ok(())
            }
        }
    }

    /// Drops the reservation for `name`, if any.
    pub fn release(&self, name: &str) {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Returns the id holding `name`.
    pub fn get(&self, name: &str) -> Result<String> {
        let names = self
            .names
            .read()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        names
            .get(name)
            .cloned()
            .ok_or_else(|| Error::IdNotFound(name.to_string()))
    }

    /// Returns all names currently held by `id`.
    pub fn names_of(&self, id: &str) -> Vec<String> {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        let mut held: Vec<String> = names
            .iter()
            .filter(|(_, owner)| owner.as_str() == id)
            .map(|(name, _)| name.clone())
            .collect();
        held.sort();
        held
    }

    /// Number of reserved names.
    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing is reserved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
