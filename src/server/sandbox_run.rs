//! `run_pod_sandbox`: reserve identities, persist the infra container's
//! bundle, then create, network and start it.

use super::Server;
use super::dns::write_resolv_conf;
use super::rollback::Rollback;
use crate::constants::{
    ANNOTATION_ANNOTATIONS, ANNOTATION_CONTAINER_ID, ANNOTATION_CONTAINER_NAME,
    ANNOTATION_CONTAINER_TYPE, ANNOTATION_HOST_NETWORK, ANNOTATION_LABELS, ANNOTATION_LOG_PATH,
    ANNOTATION_METADATA, ANNOTATION_NAME, ANNOTATION_SANDBOX_ID, CONTAINER_TYPE_SANDBOX,
    INFRA_LOG_FILE, RESOLV_CONF_FILE,
};
use crate::container::Container;
use crate::cri::PodSandboxConfig;
use crate::error::{Error, Result};
use crate::identity::{generate_id, infra_container_name};
use crate::network::PodNetwork;
use crate::sandbox::Sandbox;
use crate::security::sysctls_from_annotations;
use crate::spec::SpecGenerator;
use crate::storage::RuntimeContainerMetadata;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

impl Server {
    /// Creates and starts a pod sandbox and returns its id.
    pub async fn run_pod_sandbox(&self, req: &PodSandboxConfig) -> Result<String> {
        debug!("RunPodSandboxRequest {:?}", req);
        req.validate()?;

        let metadata = &req.metadata;
        let ns_options = req.linux.namespace_options;
        let host_network = req.host_network();

        // Identities
        let id = generate_id()?;
        let name = self.identity.reserve_pod_name(&id, &metadata.name)?;
        let mut rollback = Rollback::new(format!("run pod sandbox {}", name));
        {
            let name = name.clone();
            rollback.push("reserve pod name", move || {
                self.identity.release_pod_name(&name);
                Ok(())
            });
        }

        let infra_name = self
            .identity
            .reserve_container_name(&id, &infra_container_name(&name))?;
        {
            let infra_name = infra_name.clone();
            rollback.push("reserve infra name", move || {
                self.identity.release_container_name(&infra_name);
                Ok(())
            });
        }

        self.identity.pod_ids().add(&id)?;
        {
            let id = id.clone();
            rollback.push("index pod id", move || self.identity.pod_ids().delete(&id));
        }
        self.identity.container_ids().add(&id)?;
        {
            let id = id.clone();
            rollback.push("index infra id", move || {
                self.identity.container_ids().delete(&id)
            });
        }

        // Storage record
        let storage_metadata = RuntimeContainerMetadata {
            pod: true,
            pod_name: name.clone(),
            pod_id: id.clone(),
            image_name: self.config.image.pause_image.clone(),
            container_name: infra_name.clone(),
            metadata_name: metadata.name.clone(),
            uid: metadata.uid.clone(),
            namespace: metadata.namespace.clone(),
            attempt: metadata.attempt,
            mount_label: String::new(),
        };
        let info = match self.storage.create_pod_sandbox(&storage_metadata, &id) {
            Ok(info) => info,
            Err(Error::DuplicateName(_)) => return Err(Error::SandboxAlreadyExists(name)),
            Err(e) => return Err(e),
        };
        {
            let id = id.clone();
            let storage = self.storage.clone();
            rollback.push("create storage record", move || storage.remove_pod_sandbox(&id));
        }

        // Spec
        let mut g = SpecGenerator::new();
        g.set_root_readonly(true);
        g.set_process_args(vec![self.config.image.pause_command.clone()]);
        if !req.hostname.is_empty() {
            g.set_hostname(req.hostname.clone());
        }

        let log_dir = if req.log_directory.is_empty() {
            self.config.storage.log_dir.join(&id)
        } else {
            PathBuf::from(&req.log_directory)
        };

        let resolv_path = info.run_dir.join(RESOLV_CONF_FILE);
        write_resolv_conf(
            req.dns_config.as_ref(),
            &self.config.network.host_resolv_conf,
            &resolv_path,
        )?;
        g.add_bind_mount(&resolv_path.to_string_lossy(), "/etc/resolv.conf", &["ro"]);

        // Bookkeeping keys are written last so pod annotations cannot shadow them.
        for (key, value) in &req.annotations {
            g.add_annotation(key.clone(), value.clone());
        }
        g.add_annotation(ANNOTATION_METADATA, serde_json::to_string(metadata)?);
        g.add_annotation(ANNOTATION_LABELS, serde_json::to_string(&req.labels)?);
        g.add_annotation(ANNOTATION_ANNOTATIONS, serde_json::to_string(&req.annotations)?);
        g.add_annotation(ANNOTATION_LOG_PATH, log_dir.to_string_lossy());
        g.add_annotation(ANNOTATION_NAME, name.clone());
        g.add_annotation(ANNOTATION_CONTAINER_TYPE, CONTAINER_TYPE_SANDBOX);
        g.add_annotation(ANNOTATION_SANDBOX_ID, id.clone());
        g.add_annotation(ANNOTATION_CONTAINER_NAME, infra_name.clone());
        g.add_annotation(ANNOTATION_CONTAINER_ID, id.clone());
        g.add_annotation(ANNOTATION_HOST_NETWORK, host_network.to_string());

        let (safe, unsafe_) = sysctls_from_annotations(&req.annotations)?;
        for sysctl in safe.into_iter().chain(unsafe_) {
            g.add_linux_sysctl(sysctl.name, sysctl.value);
        }

        if !req.linux.cgroup_parent.is_empty() {
            g.set_linux_cgroups_path(req.linux.cgroup_parent.clone());
        }

        if ns_options.host_network {
            g.remove_linux_namespace("network")?;
        }
        if ns_options.host_pid {
            g.remove_linux_namespace("pid")?;
        }
        if ns_options.host_ipc {
            g.remove_linux_namespace("ipc")?;
        }

        // MAC labels
        let (process_label, mount_label) = if ns_options.host_pid && ns_options.host_ipc {
            (String::new(), String::new())
        } else {
            let explicit = req
                .linux
                .selinux_options
                .as_ref()
                .map(|opt| opt.to_label())
                .transpose()?;
            self.security.selinux.init_labels(explicit.as_deref())?
        };
        if !process_label.is_empty() {
            let label = process_label.clone();
            rollback.push("allocate selinux label", move || {
                self.security.selinux.release_label(&label);
                Ok(())
            });
            g.set_process_selinux_label(&process_label);
        }
        let mut stored = self.storage.container_metadata(&id)?;
        stored.mount_label = mount_label.clone();
        self.storage.set_container_metadata(&id, &stored)?;

        // Registration. From here on a failure leaves the sandbox tracked
        // until it is removed.
        let sandbox = Arc::new(
            Sandbox::new(id.clone(), name.clone(), metadata.clone(), log_dir.clone())
                .with_labels(req.labels.clone())
                .with_annotations(req.annotations.clone())
                .with_security_labels(process_label, mount_label)
                .with_host_network(host_network),
        );
        self.state.add_sandbox(sandbox.clone());

        let mount_point = self.storage.start_container(&id).map_err(|e| Error::Storage {
            operation: "mount".to_string(),
            id: id.clone(),
            reason: format!(
                "failed to mount container {} in pod sandbox {}({}): {}",
                infra_name, name, id, e
            ),
        })?;
        g.set_root_path(mount_point.to_string_lossy());
        g.save_to_file(&info.spec_path())?;
        g.save_to_file(&info.run_spec_path())?;

        let infra = Arc::new(
            Container::new(
                id.clone(),
                infra_name.clone(),
                info.run_dir.clone(),
                log_dir.join(INFRA_LOG_FILE),
                id.clone(),
            )
            .with_labels(req.labels.clone()),
        );
        sandbox.set_infra_container(infra.clone());

        // Runtime and network
        self.runtime.create_container(&infra).await?;
        self.runtime.update_status(&infra).await?;

        let ip = if host_network {
            self.bind_address().to_string()
        } else {
            let pod = PodNetwork::for_sandbox(&sandbox)?;
            self.network
                .set_up_pod(&pod)
                .await
                .map_err(|e| Error::Network {
                    id: id.clone(),
                    reason: format!(
                        "failed to create network for container {} in sandbox {}: {}",
                        infra_name, id, e
                    ),
                })?
        };
        sandbox.set_ip(ip.clone());

        self.runtime.start_container(&infra).await?;
        self.runtime.update_status(&infra).await?;

        rollback.commit();
        info!(sandbox = %id, name = %name, ip = %ip, "pod sandbox running");
        Ok(id)
    }
}
