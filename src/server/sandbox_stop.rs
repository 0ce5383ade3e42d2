//! `stop_pod_sandbox` and `remove_pod_sandbox`.

use super::Server;
use crate::constants::DEFAULT_STOP_TIMEOUT;
use crate::error::{Error, Result};
use crate::network::PodNetwork;
use crate::sandbox::Sandbox;
use tracing::{debug, info, warn};

impl Server {
    /// Stops every container of a sandbox, detaches it from the network and
    /// stops the infra container. Stopping a stopped sandbox succeeds.
    pub async fn stop_pod_sandbox(&self, sandbox_ref: &str) -> Result<()> {
        debug!("StopPodSandboxRequest {}", sandbox_ref);
        let sandbox = self.resolve_sandbox(sandbox_ref)?;
        self.stop_sandbox(&sandbox).await?;
        info!(sandbox = %sandbox.id(), "stopped pod sandbox");
        Ok(())
    }

    /// Stops and removes a sandbox with all of its containers and releases
    /// every identity and label it held.
    pub async fn remove_pod_sandbox(&self, sandbox_ref: &str) -> Result<()> {
        debug!("RemovePodSandboxRequest {}", sandbox_ref);
        let sandbox = self.resolve_sandbox(sandbox_ref)?;
        let id = sandbox.id().to_string();

        self.stop_sandbox(&sandbox).await?;

        for container in self.state.sandbox_containers(&id) {
            if container.id() == id {
                continue;
            }
            if let Err(e) = self.runtime.delete_container(&container).await {
                warn!("failed to delete container {} in runtime: {}", container.id(), e);
            }
            self.state.remove_container(&container);
            if let Err(e) = self.identity.container_ids().delete(container.id()) {
                debug!("container id {} already unindexed: {}", container.id(), e);
            }
            self.release_container_name_of(container.name(), container.id());
            match self.storage.delete_container(container.id()) {
                Ok(()) | Err(Error::RecordNotFound(_)) => {}
                Err(e) => warn!(
                    "failed to delete storage for container {}: {}",
                    container.id(),
                    e
                ),
            }
        }

        if let Some(infra) = sandbox.infra_container() {
            if let Err(e) = self.runtime.delete_container(infra).await {
                warn!("failed to delete infra container {} in runtime: {}", id, e);
            }
            self.release_container_name_of(infra.name(), &id);
        }
        if let Err(e) = self.identity.container_ids().delete(&id) {
            debug!("infra id {} already unindexed: {}", id, e);
        }
        if !sandbox.process_label().is_empty() {
            self.security.selinux.release_label(sandbox.process_label());
        }
        match self.storage.remove_pod_sandbox(&id) {
            Ok(()) | Err(Error::RecordNotFound(_)) => {}
            Err(e) => warn!("failed to remove storage for sandbox {}: {}", id, e),
        }

        self.state.remove_sandbox(&id);
        if let Err(e) = self.identity.pod_ids().delete(&id) {
            debug!("pod id {} already unindexed: {}", id, e);
        }
        self.release_pod_name_of(sandbox.name(), &id);

        info!(sandbox = %id, name = %sandbox.name(), "removed pod sandbox");
        Ok(())
    }

    async fn stop_sandbox(&self, sandbox: &Sandbox) -> Result<()> {
        for container in self.state.sandbox_containers(sandbox.id()) {
            if container.id() == sandbox.id() {
                continue;
            }
            self.stop_tracked_container(&container, DEFAULT_STOP_TIMEOUT)
                .await
                .map_err(|e| Error::StopFailed {
                    id: container.id().to_string(),
                    reason: format!(
                        "failed to stop container {} in pod sandbox {}: {}",
                        container.name(),
                        sandbox.id(),
                        e
                    ),
                })?;
        }

        let Some(infra) = sandbox.infra_container() else {
            return Ok(());
        };
        if !sandbox.host_network() {
            let pod = PodNetwork::for_sandbox(sandbox)?;
            if let Err(e) = self.network.tear_down_pod(&pod).await {
                warn!(
                    "failed to destroy network for pod sandbox {}({}): {}",
                    sandbox.name(),
                    sandbox.id(),
                    e
                );
            }
        }

        self.stop_tracked_container(infra, DEFAULT_STOP_TIMEOUT)
            .await
            .map_err(|e| Error::StopFailed {
                id: sandbox.id().to_string(),
                reason: format!(
                    "failed to stop infra container of pod sandbox {}: {}",
                    sandbox.id(),
                    e
                ),
            })
    }
}
