//! `create_container`: build a member container's bundle and hand it to the
//! runtime, joining the infra container's ipc and network namespaces.

use super::Server;
use super::rollback::Rollback;
use crate::constants::{
    ANNOTATION_ANNOTATIONS, ANNOTATION_CONTAINER_TYPE, ANNOTATION_IMAGE, ANNOTATION_LABELS,
    ANNOTATION_LOG_PATH, ANNOTATION_METADATA, ANNOTATION_NAME, ANNOTATION_SANDBOX_ID,
    ANNOTATION_SANDBOX_NAME, ANNOTATION_TTY, CONTAINER_TYPE_CONTAINER,
    SECCOMP_CONTAINER_ANNOTATION_PREFIX, SECCOMP_LOCALHOST_PREFIX, SECCOMP_POD_ANNOTATION,
    SECCOMP_RUNTIME_DEFAULT, SECCOMP_UNCONFINED,
};
use crate::container::{Container, namespace_path};
use crate::cri::{ContainerConfig, ContainerMetadata, LinuxContainerResources};
use crate::error::{Error, Result};
use crate::identity::{container_name, generate_id};
use crate::sandbox::Sandbox;
use crate::security::apparmor;
use crate::spec::SpecGenerator;
use crate::storage::RuntimeContainerMetadata;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Namespaces joined from the infra process: (spec type, `/proc` entry).
const SHARED_NAMESPACES: [(&str, &str); 2] = [("ipc", "ipc"), ("network", "net")];

impl Server {
    /// Creates a container inside the sandbox named by `sandbox_ref` (id or
    /// unique id prefix) and returns the container id.
    pub async fn create_container(
        &self,
        sandbox_ref: &str,
        config: &ContainerConfig,
    ) -> Result<String> {
        debug!("CreateContainerRequest {} {:?}", sandbox_ref, config);
        if sandbox_ref.is_empty() {
            return Err(Error::Validation(
                "PodSandboxId should not be empty".to_string(),
            ));
        }
        config.validate()?;

        let sandbox = self.resolve_sandbox(sandbox_ref)?;
        let seccomp = self.resolve_seccomp(&config.metadata.name, sandbox.annotations())?;
        let infra = sandbox.infra_container().cloned().ok_or_else(|| {
            Error::SandboxNotFound(format!("sandbox {} has no infra container", sandbox.id()))
        })?;

        let id = generate_id()?;
        let name = self.identity.reserve_container_name(
            &id,
            &container_name(sandbox.name(), &config.metadata.name, config.metadata.attempt),
        )?;
        let mut rollback = Rollback::new(format!("create container {}", name));
        {
            let (id, name) = (id.clone(), name.clone());
            let storage = self.storage.clone();
            rollback.push("reserve container name", move || {
                self.identity.release_container_name(&name);
                match storage.delete_container(&id) {
                    Ok(()) | Err(Error::RecordNotFound(_)) => {}
                    Err(e) => warn!("failed to clean up container directory of {}: {}", id, e),
                }
                Ok(())
            });
        }

        let log_path = container_log_path(sandbox.log_dir(), config);
        let mut g = self.container_spec(&sandbox, &infra, config)?;

        g.add_annotation(ANNOTATION_NAME, name.clone());
        g.add_annotation(ANNOTATION_SANDBOX_ID, sandbox.id());
        g.add_annotation(ANNOTATION_SANDBOX_NAME, sandbox.name());
        g.add_annotation(ANNOTATION_CONTAINER_TYPE, CONTAINER_TYPE_CONTAINER);
        g.add_annotation(ANNOTATION_LOG_PATH, log_path.to_string_lossy());
        g.add_annotation(ANNOTATION_TTY, config.tty.to_string());
        g.add_annotation(ANNOTATION_IMAGE, config.image.image.clone());
        g.add_annotation(ANNOTATION_METADATA, serde_json::to_string(&config.metadata)?);
        g.add_annotation(ANNOTATION_LABELS, serde_json::to_string(&config.labels)?);
        g.add_annotation(
            ANNOTATION_ANNOTATIONS,
            serde_json::to_string(&config.annotations)?,
        );

        match seccomp {
            SeccompChoice::Unconfined => g.clear_linux_seccomp(),
            SeccompChoice::RuntimeDefault => {
                g.set_linux_seccomp(self.security.seccomp_profile.to_oci())
            }
        }

        // Storage and bundle
        let storage_metadata = RuntimeContainerMetadata {
            pod: false,
            pod_name: sandbox.name().to_string(),
            pod_id: sandbox.id().to_string(),
            image_name: config.image.image.clone(),
            container_name: name.clone(),
            metadata_name: config.metadata.name.clone(),
            uid: sandbox.metadata().uid.clone(),
            namespace: sandbox.metadata().namespace.clone(),
            attempt: config.metadata.attempt,
            mount_label: sandbox.mount_label().to_string(),
        };
        let info = self.storage.create_container(&storage_metadata, &id)?;
        let mount_point = self.storage.start_container(&id).map_err(|e| Error::Storage {
            operation: "mount".to_string(),
            id: id.clone(),
            reason: format!("failed to mount container {}({}): {}", name, id, e),
        })?;
        g.set_root_path(mount_point.to_string_lossy());
        g.save_to_file(&info.spec_path())?;
        g.save_to_file(&info.run_spec_path())?;

        self.identity.container_ids().add(&id)?;
        {
            let id = id.clone();
            rollback.push("index container id", move || {
                self.identity.container_ids().delete(&id)
            });
        }

        let container = Arc::new(
            Container::new(
                id.clone(),
                name.clone(),
                info.run_dir.clone(),
                log_path,
                sandbox.id(),
            )
            .with_labels(config.labels.clone())
            .with_annotations(config.annotations.clone())
            .with_image(config.image.clone())
            .with_metadata(config.metadata.clone())
            .with_tty(config.tty),
        );
        self.state.add_container(container.clone())?;
        {
            let container = container.clone();
            rollback.push("register container", move || {
                self.state.remove_container(&container);
                Ok(())
            });
        }

        // Runtime
        self.runtime.create_container(&container).await?;
        self.runtime.update_status(&container).await?;

        rollback.commit();
        info!(
            sandbox = %sandbox.id(),
            container = %name,
            "created container {}",
            id
        );
        Ok(id)
    }

    /// Process, mount, security and namespace settings of a member container.
    fn container_spec(
        &self,
        sandbox: &Sandbox,
        infra: &Container,
        config: &ContainerConfig,
    ) -> Result<SpecGenerator> {
        let mut g = SpecGenerator::new();

        g.set_process_args(config.process_args());
        g.set_process_cwd(if config.working_dir.is_empty() {
            "/"
        } else {
            config.working_dir.as_str()
        });
        for env in config.envs.iter().filter(|env| !env.key.is_empty()) {
            g.add_process_env(&env.key, &env.value);
        }

        for mount in &config.mounts {
            if mount.selinux_relabel && !sandbox.mount_label().is_empty() {
                match self.security.selinux.relabel(
                    Path::new(&mount.host_path),
                    sandbox.mount_label(),
                    true,
                ) {
                    Ok(()) => {}
                    Err(Error::Unsupported(reason)) => {
                        debug!("skipping relabel of {}: {}", mount.host_path, reason)
                    }
                    Err(e) => return Err(e),
                }
            }
            let options: &[&str] = if mount.readonly { &["ro"] } else { &["rw"] };
            g.add_bind_mount(&mount.host_path, &mount.container_path, options);
        }

        for (key, value) in &config.annotations {
            g.add_annotation(key.clone(), value.clone());
        }

        if self.security.apparmor_enabled
            && let Some(profile) = apparmor::resolve_profile(
                sandbox.annotations(),
                &config.metadata.name,
                &self.security.apparmor_profile,
            )
        {
            g.set_process_apparmor_profile(profile);
        }

        let linux = config.linux.clone().unwrap_or_default();
        let security = &linux.security_context;
        if security.privileged {
            g.setup_privileged(true);
        }
        if security.readonly_rootfs {
            g.set_root_readonly(true);
        }
        if config.tty {
            g.set_process_terminal(true);
        }

        if let Some(resources) = &linux.resources {
            apply_resources(&mut g, resources)?;
        }

        if let Some(caps) = &security.capabilities {
            for cap in &caps.add_capabilities {
                g.add_process_capability(cap)?;
            }
            for cap in &caps.drop_capabilities {
                g.drop_process_capability(cap)?;
            }
        }

        g.set_process_selinux_label(sandbox.process_label());
        g.set_linux_mount_label(sandbox.mount_label());

        if let Some(uid) = security.run_as_user {
            let uid = to_id("RunAsUser", uid)?;
            g.set_process_uid(uid);
            g.set_process_gid(uid);
        }
        for gid in &security.supplemental_groups {
            g.add_process_additional_gid(to_id("SupplementalGroups", *gid)?);
        }

        let pid = infra.pid().ok_or_else(|| Error::CreateFailed {
            id: infra.id().to_string(),
            reason: format!(
                "infra container {} of sandbox {} has no running process",
                infra.name(),
                sandbox.id()
            ),
        })?;
        for (ns_type, proc_entry) in SHARED_NAMESPACES {
            g.add_or_replace_linux_namespace(
                ns_type,
                namespace_path(pid, proc_entry).to_string_lossy(),
            )?;
        }

        Ok(g)
    }

    /// Picks the seccomp profile named by annotations: the container's own
    /// key, then the pod key, then `unconfined`.
    fn resolve_seccomp(
        &self,
        container_name: &str,
        sandbox_annotations: &HashMap<String, String>,
    ) -> Result<SeccompChoice> {
        let profile = sandbox_annotations
            .get(&format!("{}{}", SECCOMP_CONTAINER_ANNOTATION_PREFIX, container_name))
            .or_else(|| sandbox_annotations.get(SECCOMP_POD_ANNOTATION))
            .map(String::as_str)
            .unwrap_or(SECCOMP_UNCONFINED);

        let choice = match profile {
            SECCOMP_UNCONFINED => SeccompChoice::Unconfined,
            SECCOMP_RUNTIME_DEFAULT => SeccompChoice::RuntimeDefault,
            p if p.starts_with(SECCOMP_LOCALHOST_PREFIX) => {
                return Err(Error::Unsupported(format!(
                    "seccomp profile {:?}: node-local profiles are not supported",
                    p
                )));
            }
            p => {
                return Err(Error::Validation(format!(
                    "unknown seccomp profile option: {:?}",
                    p
                )));
            }
        };

        if !self.security.seccomp_enabled {
            if choice != SeccompChoice::Unconfined {
                return Err(Error::Unsupported(
                    "seccomp is not enabled in your kernel, cannot run with a profile".to_string(),
                ));
            }
            warn!("seccomp is not enabled in your kernel, running container without profile");
        }
        Ok(choice)
    }
}

/// Seccomp setting applied to a member container's spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeccompChoice {
    Unconfined,
    RuntimeDefault,
}

/// Log file of a member container. Relative paths are resolved against the
/// sandbox log directory; an empty path becomes `<name>_<attempt>.log`.
fn container_log_path(log_dir: &Path, config: &ContainerConfig) -> PathBuf {
    if config.log_path.is_empty() {
        let ContainerMetadata { name, attempt } = &config.metadata;
        return log_dir.join(format!("{}_{}.log", name, attempt));
    }
    log_dir.join(&config.log_path)
}

/// Applies each non-zero limit; zero inherits the runtime default.
fn apply_resources(g: &mut SpecGenerator, resources: &LinuxContainerResources) -> Result<()> {
    if resources.cpu_period != 0 {
        g.set_linux_resources_cpu_period(to_unsigned("CpuPeriod", resources.cpu_period)?);
    }
    if resources.cpu_quota != 0 {
        g.set_linux_resources_cpu_quota(resources.cpu_quota);
    }
    if resources.cpu_shares != 0 {
        g.set_linux_resources_cpu_shares(to_unsigned("CpuShares", resources.cpu_shares)?);
    }
    if resources.memory_limit_in_bytes != 0 {
        g.set_linux_resources_memory_limit(resources.memory_limit_in_bytes);
    }
    if resources.oom_score_adj != 0 {
        let score = i32::try_from(resources.oom_score_adj).map_err(|_| {
            Error::Validation(format!("OomScoreAdj {} out of range", resources.oom_score_adj))
        })?;
        g.set_process_oom_score_adj(score);
    }
    Ok(())
}

fn to_unsigned(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Validation(format!("{} must not be negative", field)))
}

fn to_id(field: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Validation(format!("{} {} out of range", field, value)))
}
