//! Truncated-id index.
//!
//! Resolves any unambiguous prefix of a registered id to the full id. Ids
//! are kept in a `BTreeSet`, so all ids sharing a prefix are contiguous and
//! a lookup is a range scan that stops at the second match.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::RwLock;

/// Prefix-resolvable set of ids.
#[derive(Debug, Default)]
pub struct TruncIndex {
    ids: RwLock<BTreeSet<String>>,
}

impl TruncIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an id.
    ///
    /// Fails with [`Error::IdConflict`] when the id is already present.
    pub fn add(&self, id: &str) -> Result<()> {
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(Error::Validation(format!("illegal id {:?}", id)));
        }
        let mut ids = self
            .ids
            .write()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        if !ids.insert(id.to_string()) {
            return Err(Error::IdConflict(id.to_string()));
        }
        Ok(())
    }

    /// Unregisters an id. Fails with [`Error::IdNotFound`] if it is absent.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut ids = self
            .ids
            .write()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        if !ids.remove(id) {
            return Err(Error::IdNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Resolves a prefix to the single id it identifies.
    ///
    /// A full id always resolves to itself, even when it is also a prefix of
    /// another registered id.
    pub fn get(&self, prefix: &str) -> Result<String> {
        if prefix.is_empty() {
            return Err(Error::IdNotFound(prefix.to_string()));
        }
        let ids = self
            .ids
            .read()
            .map_err(|_| Error::Internal("lock poisoned".to_string()))?;
        if ids.contains(prefix) {
            return Ok(prefix.to_string());
        }

        let mut matches = ids
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|id| id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id.clone()),
            (Some(_), Some(_)) => Err(Error::AmbiguousId(prefix.to_string())),
            (None, _) => Err(Error::IdNotFound(prefix.to_string())),
        }
    }

    /// Returns true if the exact id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .read()
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.ids.read().map(|ids| ids.len()).unwrap_or(0)
    }

    /// Returns true if no id is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_wins_over_longer_ids() {
        let index = TruncIndex::new();
        index.add("abc").unwrap();
        index.add("abcdef").unwrap();

        assert_eq!(index.get("abc").unwrap(), "abc");
        assert!(matches!(index.get("ab"), Err(Error::AmbiguousId(_))));
        assert_eq!(index.get("abcd").unwrap(), "abcdef");
    }

    #[test]
    fn test_rejects_whitespace_ids() {
        let index = TruncIndex::new();
        assert!(index.add("has space").is_err());
        assert!(index.add("").is_err());
        assert!(index.is_empty());
    }
}
