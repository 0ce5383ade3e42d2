//! # Lifecycle Server
//!
//! [`Server`] owns the identity registry and the state store, and drives the
//! storage, runtime, network and security collaborators for every lifecycle
//! operation:
//!
//! | Operation              | Module             |
//! |------------------------|--------------------|
//! | `run_pod_sandbox`      | `sandbox_run`      |
//! | `stop_pod_sandbox`     | `sandbox_stop`     |
//! | `remove_pod_sandbox`   | `sandbox_stop`     |
//! | `create_container`     | `container_create` |
//! | `start_container`      | `container_start`  |
//! | `stop_container`       | `container_stop`   |
//! | `remove_container`     | `container_stop`   |
//! | status, list, version  | `status`           |
//! | startup reconciliation | `restore`          |
//!
//! ## Concurrency
//!
//! Requests run concurrently on the tokio runtime. Within one request the
//! steps run strictly in order. Identity structures and the state store each
//! take their own short lock for the in-memory update only; collaborator
//! calls happen with no lock held.
//!
//! ## Failure handling
//!
//! Multi-step requests record an undo action per completed step in a
//! [`Rollback`](rollback::Rollback). Validation and conflict errors are
//! returned before anything needs undoing.

mod container_create;
mod container_start;
mod container_stop;
pub mod dns;
mod restore;
pub mod rollback;
mod sandbox_run;
mod sandbox_stop;
mod status;

pub use restore::RestoreSummary;

use crate::config::Config;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::identity::IdentityRegistry;
use crate::network::{CniPlugin, NetworkPlugin};
use crate::platform::Platform;
use crate::reaper::ReapGate;
use crate::runtime::OciRuntime;
use crate::runtimes;
use crate::sandbox::Sandbox;
use crate::security::SecurityContext;
use crate::state::StateStore;
use crate::storage::{DirectoryStore, RuntimeStorage};
use std::sync::Arc;
use tracing::{debug, info};

/// The node-local lifecycle daemon.
pub struct Server {
    config: Config,
    identity: IdentityRegistry,
    state: StateStore,
    storage: Arc<dyn RuntimeStorage>,
    runtime: Arc<dyn OciRuntime>,
    network: Arc<dyn NetworkPlugin>,
    security: SecurityContext,
    restored: RestoreSummary,
}

impl Server {
    /// Builds the production collaborators from `config` and reconciles
    /// with the records found in storage.
    pub async fn new(config: Config, gate: ReapGate) -> Result<Self> {
        let platform = Platform::detect();
        debug!(
            kernel = ?platform.kernel_version,
            capabilities = ?platform.capabilities,
            "detected platform"
        );
        let storage = Arc::new(DirectoryStore::with_paths(
            config.storage.root.clone(),
            config.storage.run_root.clone(),
        )?);
        let runtime = runtimes::from_config(&config, gate.clone());
        let network = Arc::new(CniPlugin::new(
            config.network.network_dir.clone(),
            config.network.plugin_dirs.clone(),
            gate,
        ));
        let security = SecurityContext::from_config(&config, &platform)?;
        Self::with_components(config, storage, runtime, network, security).await
    }

    /// Builds a server over explicit collaborators and reconciles with the
    /// records found in `storage`.
    pub async fn with_components(
        config: Config,
        storage: Arc<dyn RuntimeStorage>,
        runtime: Arc<dyn OciRuntime>,
        network: Arc<dyn NetworkPlugin>,
        security: SecurityContext,
    ) -> Result<Self> {
        let mut server = Self {
            config,
            identity: IdentityRegistry::new(),
            state: StateStore::new(),
            storage,
            runtime,
            network,
            security,
            restored: RestoreSummary::default(),
        };
        server.restored = server.restore().await;
        let (sandboxes, containers) = server.state.counts();
        info!(
            runtime = server.runtime.name(),
            network = server.network.name(),
            sandboxes,
            containers,
            "server ready"
        );
        Ok(server)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identity(&self) -> &IdentityRegistry {
        &self.identity
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn storage(&self) -> &Arc<dyn RuntimeStorage> {
        &self.storage
    }

    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    /// What startup reconciliation recovered.
    pub fn restored(&self) -> RestoreSummary {
        self.restored
    }

    /// Address reported for host-network sandboxes.
    pub fn bind_address(&self) -> &str {
        &self.config.network.bind_address
    }

    /// Resolves a sandbox id or unique id prefix.
    ///
    /// Sandboxes whose id has already left the index (a run that failed after
    /// registration) still resolve by their full id.
    pub(crate) fn resolve_sandbox(&self, reference: &str) -> Result<Arc<Sandbox>> {
        if reference.is_empty() {
            return Err(Error::Validation(
                "PodSandboxId should not be empty".to_string(),
            ));
        }
        let id = match self.identity.lookup_pod(reference) {
            Ok(id) => id,
            Err(Error::IdNotFound(_)) if self.state.has_sandbox(reference) => {
                reference.to_string()
            }
            Err(Error::IdNotFound(_)) => {
                return Err(Error::SandboxNotFound(format!(
                    "PodSandbox with ID starting with {} not found",
                    reference
                )));
            }
            Err(e) => return Err(e),
        };
        self.state
            .get_sandbox(&id)
            .ok_or_else(|| Error::SandboxNotFound(format!("specified sandbox not found: {}", id)))
    }

    /// Resolves a container id or unique id prefix.
    pub(crate) fn resolve_container(&self, reference: &str) -> Result<Arc<Container>> {
        if reference.is_empty() {
            return Err(Error::Validation("ContainerId should not be empty".to_string()));
        }
        let id = match self.identity.lookup_container(reference) {
            Ok(id) => id,
            Err(Error::IdNotFound(_)) if self.state.get_container(reference).is_some() => {
                reference.to_string()
            }
            Err(Error::IdNotFound(_)) => {
                return Err(Error::ContainerNotFound(format!(
                    "container with ID starting with {} not found",
                    reference
                )));
            }
            Err(e) => return Err(e),
        };
        self.state
            .get_container(&id)
            .ok_or_else(|| Error::ContainerNotFound(format!("specified container not found: {}", id)))
    }

    /// Releases a pod name only if `id` still owns it.
    pub(crate) fn release_pod_name_of(&self, name: &str, id: &str) {
        if self
            .identity
            .pod_names()
            .get(name)
            .is_ok_and(|owner| owner == id)
        {
            self.identity.release_pod_name(name);
        }
    }

    /// Releases a container name only if `id` still owns it.
    pub(crate) fn release_container_name_of(&self, name: &str, id: &str) {
        if self
            .identity
            .container_names()
            .get(name)
            .is_ok_and(|owner| owner == id)
        {
            self.identity.release_container_name(name);
        }
    }
}
