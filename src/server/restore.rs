//! Startup reconciliation.
//!
//! Rebuilds the identity registry and the state store from the records left
//! in storage by a previous run. The `io.magikcri.*` annotations of each
//! record's `config.json` are the only input. A record that cannot be loaded
//! is logged and skipped, and whatever it had reserved is released again.

use super::Server;
use super::rollback::Rollback;
use crate::constants::{
    ANNOTATION_ANNOTATIONS, ANNOTATION_CONTAINER_NAME, ANNOTATION_HOST_NETWORK, ANNOTATION_IMAGE,
    ANNOTATION_LABELS, ANNOTATION_LOG_PATH, ANNOTATION_METADATA, ANNOTATION_NAME,
    ANNOTATION_SANDBOX_ID, ANNOTATION_TTY, INFRA_LOG_FILE, SPEC_FILE,
};
use crate::container::Container;
use crate::cri::{ContainerMetadata, ImageSpec, PodSandboxMetadata};
use crate::error::{Error, Result};
use crate::network::PodNetwork;
use crate::sandbox::Sandbox;
use crate::spec::load_spec;
use crate::storage::RuntimeContainerMetadata;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records recovered by startup reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub sandboxes: usize,
    pub containers: usize,
    /// Records that failed to load.
    pub skipped: usize,
}

/// Reads a required annotation.
fn annotation<'a>(annotations: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str> {
    annotations
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::Spec {
            path: PathBuf::from(SPEC_FILE),
            reason: format!("missing annotation {}", key),
        })
}

/// Reads and decodes a JSON-valued annotation.
fn json_annotation<T: DeserializeOwned>(
    annotations: &BTreeMap<String, String>,
    key: &str,
) -> Result<T> {
    Ok(serde_json::from_str(annotation(annotations, key)?)?)
}

impl Server {
    pub(crate) async fn restore(&self) -> RestoreSummary {
        let mut summary = RestoreSummary::default();
        let ids = match self.storage.containers() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("could not read containers and sandboxes: {}", e);
                return summary;
            }
        };

        let mut pods = Vec::new();
        let mut members = Vec::new();
        for id in ids {
            match self.storage.container_metadata(&id) {
                Ok(metadata) if metadata.pod => pods.push((id, metadata)),
                Ok(metadata) => members.push((id, metadata)),
                Err(e) => {
                    warn!("error parsing metadata for {}: {}, ignoring", id, e);
                    summary.skipped += 1;
                }
            }
        }

        for (id, metadata) in &pods {
            match self.restore_sandbox(id, metadata).await {
                Ok(()) => {
                    debug!(sandbox = %id, "restored pod sandbox");
                    summary.sandboxes += 1;
                }
                Err(e) => {
                    warn!("could not restore sandbox {}: {}", id, e);
                    summary.skipped += 1;
                }
            }
        }

        for (id, _) in &members {
            match self.restore_container(id).await {
                Ok(()) => {
                    debug!(container = %id, "restored container");
                    summary.containers += 1;
                }
                Err(e) => {
                    warn!("could not restore container {}: {}", id, e);
                    summary.skipped += 1;
                }
            }
        }

        if summary != RestoreSummary::default() {
            info!(
                sandboxes = summary.sandboxes,
                containers = summary.containers,
                skipped = summary.skipped,
                "reconciled with storage"
            );
        }
        summary
    }

    async fn restore_sandbox(&self, id: &str, stored: &RuntimeContainerMetadata) -> Result<()> {
        let spec = load_spec(&self.storage.work_dir(id)?.join(SPEC_FILE))?;
        let a = &spec.annotations;

        let metadata: PodSandboxMetadata = json_annotation(a, ANNOTATION_METADATA)?;
        let labels: HashMap<String, String> = json_annotation(a, ANNOTATION_LABELS)?;
        let annotations: HashMap<String, String> = json_annotation(a, ANNOTATION_ANNOTATIONS)?;
        let name = annotation(a, ANNOTATION_NAME)?.to_string();
        let infra_name = annotation(a, ANNOTATION_CONTAINER_NAME)?.to_string();
        let log_dir = PathBuf::from(annotation(a, ANNOTATION_LOG_PATH)?);
        let host_network = a
            .get(ANNOTATION_HOST_NETWORK)
            .is_some_and(|v| v == "true");

        let mut rollback = Rollback::new(format!("restore pod sandbox {}", id));

        let process_label = spec.process.selinux_label.clone().unwrap_or_default();
        let (process_label, derived_mount_label) = if process_label.is_empty() {
            (String::new(), String::new())
        } else {
            self.security.selinux.init_labels(Some(&process_label))?
        };
        if !process_label.is_empty() {
            let label = process_label.clone();
            rollback.push("reserve selinux label", move || {
                self.security.selinux.release_label(&label);
                Ok(())
            });
        }
        let mount_label = if stored.mount_label.is_empty() {
            derived_mount_label
        } else {
            stored.mount_label.clone()
        };

        self.identity.reserve_pod_name(id, &name)?;
        {
            let name = name.clone();
            rollback.push("reserve pod name", move || {
                self.identity.release_pod_name(&name);
                Ok(())
            });
        }
        self.identity.reserve_container_name(id, &infra_name)?;
        {
            let infra_name = infra_name.clone();
            rollback.push("reserve infra name", move || {
                self.identity.release_container_name(&infra_name);
                Ok(())
            });
        }

        let sandbox = Arc::new(
            Sandbox::new(id, name, metadata, log_dir.clone())
                .with_labels(labels.clone())
                .with_annotations(annotations)
                .with_security_labels(process_label, mount_label)
                .with_host_network(host_network),
        );

        let infra = Arc::new(
            Container::new(
                id,
                infra_name,
                self.storage.run_dir(id)?,
                log_dir.join(INFRA_LOG_FILE),
                id,
            )
            .with_labels(labels),
        );
        if let Err(e) = self.runtime.update_status(&infra).await {
            warn!("error updating status for infra container {}: {}", id, e);
            infra.mark_stopped(None);
        }
        sandbox.set_infra_container(infra);
        if host_network {
            sandbox.set_ip(self.bind_address());
        } else {
            match self.network.pod_network_status(&PodNetwork::for_sandbox(&sandbox)?).await {
                Ok(Some(ip)) => sandbox.set_ip(ip),
                Ok(None) => {}
                Err(e) => debug!("no network status for sandbox {}: {}", id, e),
            }
        }

        self.identity.pod_ids().add(id)?;
        rollback.push("index pod id", move || self.identity.pod_ids().delete(id));
        self.identity.container_ids().add(id)?;

        rollback.commit();
        self.state.add_sandbox(sandbox);
        Ok(())
    }

    async fn restore_container(&self, id: &str) -> Result<()> {
        let spec = load_spec(&self.storage.work_dir(id)?.join(SPEC_FILE))?;
        let a = &spec.annotations;

        let name = annotation(a, ANNOTATION_NAME)?.to_string();
        let sandbox_id = annotation(a, ANNOTATION_SANDBOX_ID)?.to_string();
        let metadata: ContainerMetadata = json_annotation(a, ANNOTATION_METADATA)?;
        let labels: HashMap<String, String> = json_annotation(a, ANNOTATION_LABELS)?;
        let annotations: HashMap<String, String> = json_annotation(a, ANNOTATION_ANNOTATIONS)?;
        let log_path = PathBuf::from(annotation(a, ANNOTATION_LOG_PATH)?);
        let tty = a.get(ANNOTATION_TTY).is_some_and(|v| v == "true");
        let image = a.get(ANNOTATION_IMAGE).cloned().unwrap_or_default();

        let mut rollback = Rollback::new(format!("restore container {}", id));
        self.identity.reserve_container_name(id, &name)?;
        {
            let name = name.clone();
            rollback.push("reserve container name", move || {
                self.identity.release_container_name(&name);
                Ok(())
            });
        }

        if !self.state.has_sandbox(&sandbox_id) {
            return Err(Error::SandboxNotFound(format!(
                "container {} belongs to unknown sandbox {}",
                id, sandbox_id
            )));
        }

        let container = Arc::new(
            Container::new(id, name, self.storage.run_dir(id)?, log_path, sandbox_id)
                .with_labels(labels)
                .with_annotations(annotations)
                .with_image(ImageSpec::new(image))
                .with_metadata(metadata)
                .with_tty(tty),
        );
        if let Err(e) = self.runtime.update_status(&container).await {
            warn!("error updating status for container {}: {}", id, e);
            container.mark_stopped(None);
        }

        self.state.add_container(container.clone())?;
        {
            let container = container.clone();
            rollback.push("register container", move || {
                self.state.remove_container(&container);
                Ok(())
            });
        }
        self.identity.container_ids().add(id)?;

        rollback.commit();
        Ok(())
    }
}
