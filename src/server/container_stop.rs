//! `stop_container` and `remove_container`.

use super::Server;
use crate::constants::DEFAULT_STOP_TIMEOUT;
use crate::container::Container;
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

impl Server {
    /// Stops a container within `timeout` and unmounts its root filesystem.
    pub async fn stop_container(&self, container_ref: &str, timeout: Duration) -> Result<()> {
        debug!("StopContainerRequest {} {:?}", container_ref, timeout);
        let container = self.resolve_container(container_ref)?;
        self.stop_tracked_container(&container, timeout).await?;
        info!(container = %container.id(), "stopped container");
        Ok(())
    }

    /// Removes a container, stopping it first if needed. Every step
    /// tolerates state already cleaned up by an earlier attempt.
    pub async fn remove_container(&self, container_ref: &str) -> Result<()> {
        debug!("RemoveContainerRequest {}", container_ref);
        let container = self.resolve_container(container_ref)?;
        let id = container.id().to_string();

        self.refresh_status(&container).await;
        if container.is_running() {
            self.stop_tracked_container(&container, DEFAULT_STOP_TIMEOUT)
                .await?;
        }

        if let Err(e) = self.runtime.delete_container(&container).await {
            warn!("failed to delete container {} in runtime: {}", id, e);
        }
        self.state.remove_container(&container);
        if let Err(e) = self.identity.container_ids().delete(&id) {
            debug!("container id {} already unindexed: {}", id, e);
        }
        self.release_container_name_of(container.name(), &id);
        match self.storage.delete_container(&id) {
            Ok(()) | Err(Error::RecordNotFound(_)) => {}
            Err(e) => warn!("failed to delete storage for container {}: {}", id, e),
        }

        info!(container = %id, "removed container");
        Ok(())
    }

    /// Stops a tracked container through the runtime, then unmounts it.
    pub(crate) async fn stop_tracked_container(
        &self,
        container: &Container,
        timeout: Duration,
    ) -> Result<()> {
        match self.runtime.stop_container(container, timeout).await {
            Ok(()) => {}
            Err(Error::StatusFailed { reason, .. }) => {
                warn!(
                    "runtime has no state for container {}, treating it as stopped: {}",
                    container.id(),
                    reason
                );
                container.mark_stopped(None);
            }
            Err(e) => return Err(e),
        }
        match self.storage.stop_container(container.id()) {
            Ok(()) | Err(Error::RecordNotFound(_)) => {}
            Err(e) => warn!("failed to unmount container {}: {}", container.id(), e),
        }
        Ok(())
    }

    /// Refreshes cached state from the runtime, logging failures.
    pub(crate) async fn refresh_status(&self, container: &Container) {
        if let Err(e) = self.runtime.update_status(container).await {
            debug!("failed to refresh status of {}: {}", container.id(), e);
        }
    }
}
