//! Status, listing and version queries.

use super::Server;
use crate::constants::RUNTIME_API_VERSION;
use crate::container::Container;
use crate::cri::{
    ContainerFilter, ContainerStatusInfo, PodSandboxFilter, PodSandboxStatus, VersionInfo,
    labels_match,
};
use crate::error::{Error, Result};
use crate::sandbox::Sandbox;
use std::sync::Arc;
use tracing::debug;

impl Server {
    /// Current status of a sandbox. The infra container's state is refreshed
    /// from the runtime when possible.
    pub async fn pod_sandbox_status(&self, sandbox_ref: &str) -> Result<PodSandboxStatus> {
        debug!("PodSandboxStatusRequest {}", sandbox_ref);
        let sandbox = self.resolve_sandbox(sandbox_ref)?;
        if let Some(infra) = sandbox.infra_container() {
            self.refresh_status(infra).await;
        }
        Ok(sandbox_status(&sandbox))
    }

    /// Current status of a container, refreshed from the runtime when
    /// possible.
    pub async fn container_status(&self, container_ref: &str) -> Result<ContainerStatusInfo> {
        debug!("ContainerStatusRequest {}", container_ref);
        let container = self.resolve_container(container_ref)?;
        self.refresh_status(&container).await;
        Ok(container_status(&container))
    }

    /// Sandboxes matching `filter`, ordered by creation time.
    pub fn list_pod_sandboxes(&self, filter: &PodSandboxFilter) -> Result<Vec<PodSandboxStatus>> {
        let candidates = match filter.id.as_deref() {
            Some(reference) => match self.resolve_sandbox(reference) {
                Ok(sandbox) => vec![sandbox],
                Err(e) if e.is_not_found() => return Ok(Vec::new()),
                Err(e) => return Err(e),
            },
            None => self.state.sandboxes(),
        };

        let mut matched: Vec<Arc<Sandbox>> = candidates
            .into_iter()
            .filter(|sb| filter.state.is_none_or(|state| sb.state() == state))
            .filter(|sb| labels_match(&filter.label_selector, sb.labels()))
            .collect();
        matched.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then(a.id().cmp(b.id())));
        Ok(matched.iter().map(|sb| sandbox_status(sb)).collect())
    }

    /// Containers matching `filter`, ordered by creation time.
    pub fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerStatusInfo>> {
        let candidates = match filter.id.as_deref() {
            Some(reference) => match self.resolve_container(reference) {
                Ok(container) => vec![container],
                Err(e) if e.is_not_found() => return Ok(Vec::new()),
                Err(e) => return Err(e),
            },
            None => self.state.containers(),
        };

        let sandbox_id = match filter.pod_sandbox_id.as_deref() {
            Some(reference) => match self.resolve_sandbox(reference) {
                Ok(sandbox) => Some(sandbox.id().to_string()),
                Err(e) if e.is_not_found() => return Ok(Vec::new()),
                Err(e) => return Err(e),
            },
            None => None,
        };

        let mut matched: Vec<Arc<Container>> = candidates
            .into_iter()
            .filter(|c| sandbox_id.as_deref().is_none_or(|id| c.sandbox_id() == id))
            .filter(|c| filter.state.is_none_or(|state| c.status() == state))
            .filter(|c| labels_match(&filter.label_selector, c.labels()))
            .collect();
        matched.sort_by_key(|c| (c.runtime_state().created_at, c.id().to_string()));
        Ok(matched.iter().map(|c| container_status(c)).collect())
    }

    /// Daemon and runtime versions.
    pub async fn version(&self) -> Result<VersionInfo> {
        let runtime_version = self.runtime.version().await.map_err(|e| Error::StatusFailed {
            id: self.runtime.name().to_string(),
            reason: format!("failed to query runtime version: {}", e),
        })?;
        Ok(VersionInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            runtime_name: self.runtime.name().to_string(),
            runtime_version,
            runtime_api_version: RUNTIME_API_VERSION.to_string(),
        })
    }
}

fn sandbox_status(sandbox: &Sandbox) -> PodSandboxStatus {
    PodSandboxStatus {
        id: sandbox.id().to_string(),
        metadata: sandbox.metadata().clone(),
        state: sandbox.state(),
        created_at: sandbox.created_at(),
        ip: sandbox.ip().unwrap_or_default(),
        host_network: sandbox.host_network(),
        labels: sandbox.labels().clone(),
        annotations: sandbox.annotations().clone(),
    }
}

fn container_status(container: &Container) -> ContainerStatusInfo {
    let state = container.runtime_state();
    ContainerStatusInfo {
        id: container.id().to_string(),
        name: container.name().to_string(),
        sandbox_id: container.sandbox_id().to_string(),
        metadata: container.metadata().cloned(),
        state: state.status,
        pid: state.pid,
        created_at: state.created_at,
        started_at: state.started_at,
        finished_at: state.finished_at,
        exit_code: state.exit_code,
        image: container.image().map(|image| image.image.clone()),
        log_path: container.log_path().to_string_lossy().into_owned(),
        labels: container.labels().clone(),
        annotations: container.annotations().clone(),
    }
}
