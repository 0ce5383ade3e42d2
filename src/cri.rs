//! Typed lifecycle requests and responses.
//!
//! Every field documents what its zero value means. In particular the
//! resource limits in [`LinuxContainerResources`] use `0` for "inherit the
//! runtime default", never for "limit to zero".
//!
//! The metadata types are serialized verbatim into the persisted spec
//! annotations and read back during reconciliation, so their serde shape is
//! part of the on-disk format.

use crate::constants::validate_name;
use crate::error::{Error, Result};
use crate::runtime::ContainerStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Metadata
// =============================================================================

/// Identity tuple of a pod sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodSandboxMetadata {
    /// Sandbox name. Required.
    pub name: String,
    /// Orchestrator-assigned uid.
    pub uid: String,
    /// Orchestrator namespace.
    pub namespace: String,
    /// Creation attempt, starting at 0.
    pub attempt: u32,
}

/// Identity tuple of a container inside a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerMetadata {
    /// Container name. Required.
    pub name: String,
    /// Creation attempt, starting at 0.
    pub attempt: u32,
}

// =============================================================================
// Pod Sandbox Config
// =============================================================================

/// Resolver configuration written to the sandbox's `resolv.conf`.
///
/// When all three lists are empty the host's `/etc/resolv.conf` is copied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub servers: Vec<String>,
    pub searches: Vec<String>,
    pub options: Vec<String>,
}

/// Namespaces shared with the host instead of created per sandbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceOptions {
    pub host_network: bool,
    pub host_pid: bool,
    pub host_ipc: bool,
}

/// Explicit SELinux context; all four parts are required when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeLinuxOption {
    pub user: String,
    pub role: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub level: String,
}

impl SeLinuxOption {
    /// Renders `user:role:type:level`, rejecting empty parts.
    pub fn to_label(&self) -> Result<String> {
        for (field, value) in [
            ("user", &self.user),
            ("role", &self.role),
            ("type", &self.type_),
            ("level", &self.level),
        ] {
            if value.is_empty() {
                return Err(Error::Validation(format!("SELinuxOption.{} is empty", field)));
            }
        }
        Ok(format!(
            "{}:{}:{}:{}",
            self.user, self.role, self.type_, self.level
        ))
    }
}

/// Linux-specific sandbox settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxPodSandboxConfig {
    /// Cgroup parent path. Empty leaves the runtime default.
    pub cgroup_parent: String,
    /// Host namespace sharing.
    pub namespace_options: NamespaceOptions,
    /// Explicit SELinux context. `None` lets the daemon allocate one.
    pub selinux_options: Option<SeLinuxOption>,
}

/// `RunPodSandbox` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodSandboxConfig {
    pub metadata: PodSandboxMetadata,
    /// Hostname inside the sandbox. Empty keeps the runtime default.
    pub hostname: String,
    /// Log directory. Empty means `<log_dir>/<sandbox id>`.
    pub log_directory: String,
    /// Resolver settings. `None` copies the host resolver file.
    pub dns_config: Option<DnsConfig>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub linux: LinuxPodSandboxConfig,
}

impl PodSandboxConfig {
    /// Checks required fields before any subsystem is touched.
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.is_empty() {
            return Err(Error::Validation(
                "PodSandboxConfig.Name should not be empty".to_string(),
            ));
        }
        validate_name(&self.metadata.name)
            .map_err(|reason| Error::Validation(format!("PodSandboxConfig.Name: {}", reason)))?;
        if let Some(selinux) = &self.linux.selinux_options {
            selinux.to_label()?;
        }
        Ok(())
    }

    /// Returns true if the sandbox uses the host network namespace.
    pub fn host_network(&self) -> bool {
        self.linux.namespace_options.host_network
    }
}

// =============================================================================
// Container Config
// =============================================================================

/// Environment variable. Entries with an empty key are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Bind mount from the host into the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mount {
    /// Destination inside the container. Required.
    pub container_path: String,
    /// Source on the host. Required.
    pub host_path: String,
    /// Mount read-only instead of read-write.
    pub readonly: bool,
    /// Relabel the source with the sandbox mount label.
    pub selinux_relabel: bool,
}

/// Capabilities added to or dropped from the default set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capability {
    pub add_capabilities: Vec<String>,
    pub drop_capabilities: Vec<String>,
}

/// Resource limits. Each field set to `0` inherits the runtime default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxContainerResources {
    pub cpu_period: i64,
    pub cpu_quota: i64,
    pub cpu_shares: i64,
    pub memory_limit_in_bytes: i64,
    pub oom_score_adj: i64,
}

/// Process security settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxContainerSecurityContext {
    pub capabilities: Option<Capability>,
    pub privileged: bool,
    pub readonly_rootfs: bool,
    /// Used as both uid and gid. `None` runs as root.
    pub run_as_user: Option<i64>,
    pub supplemental_groups: Vec<i64>,
}

/// Linux-specific container settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxContainerConfig {
    pub resources: Option<LinuxContainerResources>,
    pub security_context: LinuxContainerSecurityContext,
}

/// Image reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSpec {
    pub image: String,
}

impl ImageSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

/// `CreateContainer` request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub metadata: ContainerMetadata,
    pub image: ImageSpec,
    /// Entrypoint. When both `command` and `args` are empty the process
    /// runs `/bin/sh`.
    pub command: Vec<String>,
    pub args: Vec<String>,
    /// Working directory. Empty means `/`.
    pub working_dir: String,
    pub envs: Vec<KeyValue>,
    pub mounts: Vec<Mount>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    /// Log file path, relative to the sandbox log directory.
    pub log_path: String,
    pub tty: bool,
    pub linux: Option<LinuxContainerConfig>,
}

impl ContainerConfig {
    /// Checks required fields before any subsystem is touched.
    pub fn validate(&self) -> Result<()> {
        if self.metadata.name.is_empty() {
            return Err(Error::Validation(
                "CreateContainerRequest.ContainerConfig.Name is empty".to_string(),
            ));
        }
        validate_name(&self.metadata.name).map_err(|reason| {
            Error::Validation(format!("CreateContainerRequest.ContainerConfig.Name: {}", reason))
        })?;
        if self.image.image.is_empty() {
            return Err(Error::Validation(
                "CreateContainerRequest.ContainerConfig.Image.Image is empty".to_string(),
            ));
        }
        for mount in &self.mounts {
            if mount.container_path.is_empty() {
                return Err(Error::Validation("Mount.ContainerPath is empty".to_string()));
            }
            if mount.host_path.is_empty() {
                return Err(Error::Validation("Mount.HostPath is empty".to_string()));
            }
        }
        Ok(())
    }

    /// Process arguments with the `/bin/sh` fallback applied.
    pub fn process_args(&self) -> Vec<String> {
        if self.command.is_empty() && self.args.is_empty() {
            return vec![crate::constants::DEFAULT_SHELL.to_string()];
        }
        self.command.iter().chain(&self.args).cloned().collect()
    }
}

// =============================================================================
// Status and Listing
// =============================================================================

/// Readiness of a sandbox, derived from its infra container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PodSandboxState {
    SandboxReady,
    SandboxNotReady,
}

/// Snapshot returned by `pod_sandbox_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSandboxStatus {
    pub id: String,
    pub metadata: PodSandboxMetadata,
    pub state: PodSandboxState,
    pub created_at: DateTime<Utc>,
    /// Pod address; empty until the network has been set up.
    pub ip: String,
    pub host_network: bool,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

/// Snapshot returned by `container_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatusInfo {
    pub id: String,
    pub name: String,
    pub sandbox_id: String,
    pub metadata: Option<ContainerMetadata>,
    pub state: ContainerStatus,
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub image: Option<String>,
    pub log_path: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

/// Filter for `list_pod_sandboxes`. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct PodSandboxFilter {
    /// Id or unique id prefix.
    pub id: Option<String>,
    pub state: Option<PodSandboxState>,
    /// Every pair must be present in the sandbox labels.
    pub label_selector: HashMap<String, String>,
}

/// Filter for `list_containers`. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    /// Id or unique id prefix.
    pub id: Option<String>,
    pub state: Option<ContainerStatus>,
    /// Sandbox id or unique sandbox id prefix.
    pub pod_sandbox_id: Option<String>,
    /// Every pair must be present in the container labels.
    pub label_selector: HashMap<String, String>,
}

/// Returns true if every selector pair is present in `labels`.
pub fn labels_match(selector: &HashMap<String, String>, labels: &HashMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|l| l == v))
}

/// Response of `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub runtime_name: String,
    pub runtime_version: String,
    pub runtime_api_version: String,
}
