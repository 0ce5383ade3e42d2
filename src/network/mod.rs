//! Pod networking collaborator.
//!
//! Sandboxes that do not share the host network get an interface inside the
//! infra container's network namespace from a [`NetworkPlugin`]. The
//! production plugin is [`CniPlugin`].

pub mod cni;

pub use cni::CniPlugin;

use crate::error::Result;
use crate::sandbox::Sandbox;
use async_trait::async_trait;
use std::path::PathBuf;

/// Identity of a pod as seen by the network plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodNetwork {
    /// Pod name (`metadata.name`).
    pub name: String,
    /// Pod namespace (`metadata.namespace`).
    pub namespace: String,
    /// Sandbox id, used as the CNI container id.
    pub id: String,
    /// Infra container id.
    pub infra_container_id: String,
    /// Network namespace of the infra process; empty once it has exited.
    pub netns: PathBuf,
}

impl PodNetwork {
    /// Describes `sandbox` for the plugin; the infra container must be
    /// attached. A stopped infra container yields an empty `netns`, which is
    /// enough for tear-down.
    pub fn for_sandbox(sandbox: &Sandbox) -> Result<Self> {
        let infra = sandbox.infra_container().ok_or_else(|| {
            crate::Error::Internal(format!("sandbox {} has no infra container", sandbox.id()))
        })?;
        Ok(Self {
            name: sandbox.metadata().name.clone(),
            namespace: sandbox.metadata().namespace.clone(),
            id: sandbox.id().to_string(),
            infra_container_id: infra.id().to_string(),
            netns: infra.netns_path().unwrap_or_default(),
        })
    }
}

/// Attaches and detaches pods to the node network.
#[async_trait]
pub trait NetworkPlugin: Send + Sync {
    /// Returns the plugin name.
    fn name(&self) -> &str;

    /// Configures the pod's network namespace and returns its IP address.
    async fn set_up_pod(&self, pod: &PodNetwork) -> Result<String>;

    /// Removes the pod from the network.
    async fn tear_down_pod(&self, pod: &PodNetwork) -> Result<()>;

    /// IP address assigned by the last successful set-up, if any.
    async fn pod_network_status(&self, pod: &PodNetwork) -> Result<Option<String>>;
}
