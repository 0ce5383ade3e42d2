//! In-memory pod sandbox objects.
//!
//! A sandbox is registered in the [`StateStore`](crate::state::StateStore)
//! before its infra container exists, so readers must handle
//! [`Sandbox::infra_container`] returning `None`.

use crate::container::Container;
use crate::cri::{PodSandboxMetadata, PodSandboxState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// A pod sandbox tracked by the daemon.
#[derive(Debug)]
pub struct Sandbox {
    id: String,
    name: String,
    log_dir: PathBuf,
    labels: HashMap<String, String>,
    annotations: HashMap<String, String>,
    process_label: String,
    mount_label: String,
    metadata: PodSandboxMetadata,
    host_network: bool,
    created_at: DateTime<Utc>,
    infra: OnceLock<Arc<Container>>,
    ip: Mutex<Option<String>>,
}

impl Sandbox {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metadata: PodSandboxMetadata,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            log_dir: log_dir.into(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            process_label: String::new(),
            mount_label: String::new(),
            metadata,
            host_network: false,
            created_at: Utc::now(),
            infra: OnceLock::new(),
            ip: Mutex::new(None),
        }
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_annotations(mut self, annotations: HashMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Sets the SELinux process and mount labels; empty strings mean none.
    pub fn with_security_labels(mut self, process_label: String, mount_label: String) -> Self {
        self.process_label = process_label;
        self.mount_label = mount_label;
        self
    }

    pub fn with_host_network(mut self, host_network: bool) -> Self {
        self.host_network = host_network;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.annotations
    }

    pub fn process_label(&self) -> &str {
        &self.process_label
    }

    pub fn mount_label(&self) -> &str {
        &self.mount_label
    }

    pub fn metadata(&self) -> &PodSandboxMetadata {
        &self.metadata
    }

    pub fn host_network(&self) -> bool {
        self.host_network
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The infra container, once attached.
    pub fn infra_container(&self) -> Option<&Arc<Container>> {
        self.infra.get()
    }

    /// Attaches the infra container. Returns false if one was already set.
    pub fn set_infra_container(&self, container: Arc<Container>) -> bool {
        self.infra.set(container).is_ok()
    }

    /// Pod address assigned by the network setup.
    pub fn ip(&self) -> Option<String> {
        self.ip.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_ip(&self, ip: impl Into<String>) {
        *self.ip.lock().unwrap_or_else(PoisonError::into_inner) = Some(ip.into());
    }

    /// Ready while the infra container's process is running.
    pub fn state(&self) -> PodSandboxState {
        match self.infra_container() {
            Some(infra) if infra.is_running() => PodSandboxState::SandboxReady,
            _ => PodSandboxState::SandboxNotReady,
        }
    }
}
