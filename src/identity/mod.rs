//! # Identity Registry
//!
//! Generates ids and owns the four identity structures every lifecycle
//! operation goes through:
//!
//! ```text
//! ┌───────────────────────── IdentityRegistry ─────────────────────────┐
//! │  pod names   (NameRegistrar)   "web"        → <sandbox id>          │
//! │  pod ids     (TruncIndex)      "3f9a…"      → <sandbox id>          │
//! │  ctr names   (NameRegistrar)   "web-infra"  → <sandbox id>          │
//! │                                "web-app-0"  → <container id>        │
//! │  ctr ids     (TruncIndex)      <sandbox id>, <container id>, …      │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The infra container is registered under the sandbox id in both container
//! structures. Each structure has its own lock, held only for the map update.
//!
//! ## Naming
//!
//! User containers are named `{sandbox}-{container}-{attempt}`; the infra
//! container is `{sandbox}-infra` with no attempt suffix. Reconciliation
//! relies on that shape to tell infra containers apart when annotations are
//! missing.

mod registrar;
mod truncindex;

pub use registrar::NameRegistrar;
pub use truncindex::TruncIndex;

use crate::constants::{ID_LENGTH, INFRA_CONTAINER_SUFFIX, SHORT_ID_LENGTH};
use crate::error::{Error, Result};
use rand::TryRngCore;
use rand::rngs::OsRng;
use tracing::{debug, warn};

/// Generates a 64 character lowercase hex id from the OS random source.
///
/// Ids whose short form is all digits are discarded so that the short form
/// can never be mistaken for a number.
pub fn generate_id() -> Result<String> {
    loop {
        let mut bytes = [0u8; ID_LENGTH / 2];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::Internal(format!("failed to read random bytes: {}", e)))?;
        let id = hex::encode(bytes);
        if id[..SHORT_ID_LENGTH].bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        return Ok(id);
    }
}

/// Returns the first [`SHORT_ID_LENGTH`] characters of an id.
pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LENGTH).unwrap_or(id)
}

/// Name of a user container: `{sandbox}-{container}-{attempt}`.
pub fn container_name(sandbox_name: &str, name: &str, attempt: u32) -> String {
    format!("{}-{}-{}", sandbox_name, name, attempt)
}

/// Name of a sandbox's infra container: `{sandbox}-infra`.
pub fn infra_container_name(sandbox_name: &str) -> String {
    format!("{}-{}", sandbox_name, INFRA_CONTAINER_SUFFIX)
}

/// Returns true if `name` has the infra container shape for `sandbox_name`.
pub fn is_infra_container_name(sandbox_name: &str, name: &str) -> bool {
    name == infra_container_name(sandbox_name)
}

/// Pod and container name registrars plus their id indexes.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    pod_names: NameRegistrar,
    pod_ids: TruncIndex,
    ctr_names: NameRegistrar,
    ctr_ids: TruncIndex,
}

impl IdentityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a sandbox name for `id` and returns the final name.
    pub fn reserve_pod_name(&self, id: &str, name: &str) -> Result<String> {
        self.pod_names.reserve(name, id).inspect_err(|e| {
            warn!("failed to reserve pod name {}: {}", name, e);
        })?;
        debug!("reserved pod name {} for {}", name, short_id(id));
        Ok(name.to_string())
    }

    /// Releases a sandbox name. Safe to call on unreserved names.
    pub fn release_pod_name(&self, name: &str) {
        self.pod_names.release(name);
    }

    /// Claims a container name for `id` and returns the final name.
    pub fn reserve_container_name(&self, id: &str, name: &str) -> Result<String> {
        self.ctr_names.reserve(name, id).inspect_err(|e| {
            warn!("failed to reserve container name {}: {}", name, e);
        })?;
        debug!("reserved container name {} for {}", name, short_id(id));
        Ok(name.to_string())
    }

    /// Releases a container name. Safe to call on unreserved names.
    pub fn release_container_name(&self, name: &str) {
        self.ctr_names.release(name);
    }

    /// Sandbox name registrar.
    pub fn pod_names(&self) -> &NameRegistrar {
        &self.pod_names
    }

    /// Sandbox id index.
    pub fn pod_ids(&self) -> &TruncIndex {
        &self.pod_ids
    }

    /// Container name registrar.
    pub fn container_names(&self) -> &NameRegistrar {
        &self.ctr_names
    }

    /// Container id index.
    pub fn container_ids(&self) -> &TruncIndex {
        &self.ctr_ids
    }

    /// Resolves a sandbox id prefix.
    pub fn lookup_pod(&self, prefix: &str) -> Result<String> {
        self.pod_ids.get(prefix)
    }

    /// Resolves a container id prefix.
    pub fn lookup_container(&self, prefix: &str) -> Result<String> {
        self.ctr_ids.get(prefix)
    }
}
