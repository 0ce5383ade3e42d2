//! `start_container`.

use super::Server;
use crate::constants::SPEC_FILE;
use crate::error::{Error, Result};
use crate::spec::SpecGenerator;
use tracing::{debug, info};

impl Server {
    /// Starts a created container. Starting a running container is a no-op.
    pub async fn start_container(&self, container_ref: &str) -> Result<()> {
        debug!("StartContainerRequest {}", container_ref);
        let container = self.resolve_container(container_ref)?;
        let id = container.id().to_string();
        let shown = format!("{}({})", container.name(), id);

        if container.is_running() {
            debug!("container {} is already running", shown);
            return Ok(());
        }

        let work_dir = self.storage.work_dir(container.name())?;
        let run_dir = self.storage.run_dir(container.name())?;
        let mount_point = self.storage.start_container(&id).map_err(|e| Error::StartFailed {
            id: id.clone(),
            reason: format!("failed to mount container {}: {}", shown, e),
        })?;

        let mut g = SpecGenerator::from_file(&work_dir.join(SPEC_FILE))?;
        g.set_root_path(mount_point.to_string_lossy());
        g.save_to_file(&work_dir.join(SPEC_FILE))?;
        g.save_to_file(&run_dir.join(SPEC_FILE))?;

        self.runtime
            .start_container(&container)
            .await
            .map_err(|e| Error::StartFailed {
                id: id.clone(),
                reason: format!("failed to start container {}: {}", shown, e),
            })?;
        self.runtime.update_status(&container).await?;

        info!(container = %shown, "started container");
        Ok(())
    }
}
