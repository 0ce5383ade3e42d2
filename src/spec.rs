//! # OCI Runtime Spec Generation
//!
//! Types for the subset of the OCI runtime `config.json` the daemon writes,
//! and [`SpecGenerator`], a mutable builder over them.
//!
//! The generator starts from a default Linux container spec (pid, network,
//! ipc, uts and mount namespaces; proc/dev/sys mounts; the default
//! capability set) and exposes one setter per field the orchestrators touch.
//! Specs are written atomically (temp file + rename) so a crash never leaves
//! a truncated `config.json` for reconciliation to trip over.
//!
//! ```rust,ignore
//! let mut g = SpecGenerator::new();
//! g.set_root_readonly(true);
//! g.set_process_args(vec!["/pause".to_string()]);
//! g.remove_linux_namespace("network")?;
//! g.save_to_file(&dir.join("config.json"))?;
//! ```

use crate::constants::{DEFAULT_PATH_ENV, OCI_RUNTIME_SPEC_VERSION};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

// =============================================================================
// OCI Runtime Spec Types
// =============================================================================

/// OCI runtime spec (`config.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Spec {
    pub oci_version: String,
    pub process: Process,
    pub root: Root,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub mounts: Vec<Mount>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linux: Option<Linux>,
}

/// Container process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Process {
    pub terminal: bool,
    pub user: User,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<LinuxCapabilities>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rlimits: Vec<PosixRlimit>,
    pub no_new_privileges: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apparmor_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oom_score_adj: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selinux_label: Option<String>,
}

/// Process user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub uid: u32,
    pub gid: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_gids: Vec<u32>,
}

/// Process capability sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxCapabilities {
    pub bounding: Vec<String>,
    pub effective: Vec<String>,
    pub inheritable: Vec<String>,
    pub permitted: Vec<String>,
    pub ambient: Vec<String>,
}

/// Process resource limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosixRlimit {
    #[serde(rename = "type")]
    pub typ: String,
    pub hard: u64,
    pub soft: u64,
}

/// Root filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Root {
    pub path: String,
    pub readonly: bool,
}

/// Filesystem mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mount {
    pub destination: String,
    #[serde(rename = "type")]
    pub typ: String,
    pub source: String,
    pub options: Vec<String>,
}

/// Linux-specific configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Linux {
    pub namespaces: Vec<LinuxNamespace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<LinuxResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroups_path: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sysctl: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccomp: Option<LinuxSeccomp>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub masked_paths: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub readonly_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_label: Option<String>,
}

/// Namespace entry; `path` joins an existing namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxNamespace {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Cgroup resource limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxResources {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<LinuxDeviceCgroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<LinuxMemory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<LinuxCpu>,
}

/// Device cgroup rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxDeviceCgroup {
    pub allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
}

/// Memory limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxMemory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

/// CPU limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxCpu {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
}

/// Seccomp filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinuxSeccomp {
    pub default_action: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub syscalls: Vec<LinuxSyscall>,
}

/// Seccomp rule for a group of syscalls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxSyscall {
    pub names: Vec<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<LinuxSeccompArg>,
}

/// Seccomp argument comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinuxSeccompArg {
    pub index: u32,
    pub value: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_two: Option<u64>,
    pub op: String,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Capabilities granted to unprivileged containers.
pub const DEFAULT_CAPABILITIES: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_FSETID",
    "CAP_FOWNER",
    "CAP_MKNOD",
    "CAP_NET_RAW",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETFCAP",
    "CAP_SETPCAP",
    "CAP_NET_BIND_SERVICE",
    "CAP_SYS_CHROOT",
    "CAP_KILL",
    "CAP_AUDIT_WRITE",
];

/// Every capability the kernel knows about.
pub const ALL_CAPABILITIES: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_KILL",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_LINUX_IMMUTABLE",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_ADMIN",
    "CAP_NET_RAW",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_SYS_MODULE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_CHROOT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_PACCT",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_NICE",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_MKNOD",
    "CAP_LEASE",
    "CAP_AUDIT_WRITE",
    "CAP_AUDIT_CONTROL",
    "CAP_SETFCAP",
    "CAP_MAC_OVERRIDE",
    "CAP_MAC_ADMIN",
    "CAP_SYSLOG",
    "CAP_WAKE_ALARM",
    "CAP_BLOCK_SUSPEND",
    "CAP_AUDIT_READ",
    "CAP_PERFMON",
    "CAP_BPF",
    "CAP_CHECKPOINT_RESTORE",
];

/// Normalizes `net_admin` / `NET_ADMIN` / `CAP_NET_ADMIN` to the canonical
/// name, rejecting unknown capabilities.
pub fn normalize_capability(cap: &str) -> Result<String> {
    let upper = cap.to_ascii_uppercase();
    let name = if upper.starts_with("CAP_") {
        upper
    } else {
        format!("CAP_{}", upper)
    };
    if ALL_CAPABILITIES.contains(&name.as_str()) {
        Ok(name)
    } else {
        Err(Error::Validation(format!("invalid capability {:?}", cap)))
    }
}

/// Namespace types accepted in `linux.namespaces`.
const NAMESPACE_TYPES: &[&str] = &["pid", "network", "mount", "ipc", "uts", "user", "cgroup"];

fn check_namespace_type(ns: &str) -> Result<()> {
    if NAMESPACE_TYPES.contains(&ns) {
        Ok(())
    } else {
        Err(Error::Validation(format!("unknown namespace type {:?}", ns)))
    }
}

// =============================================================================
// Spec Generator
// =============================================================================

/// Mutable builder over a [`Spec`].
#[derive(Debug, Clone)]
pub struct SpecGenerator {
    spec: Spec,
}

impl Default for SpecGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecGenerator {
    /// Generator over the default Linux container spec.
    pub fn new() -> Self {
        let caps: Vec<String> = DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect();
        let spec = Spec {
            oci_version: OCI_RUNTIME_SPEC_VERSION.to_string(),
            process: Process {
                terminal: false,
                user: User::default(),
                args: vec!["sh".to_string()],
                env: vec![DEFAULT_PATH_ENV.to_string(), "TERM=xterm".to_string()],
                cwd: "/".to_string(),
                capabilities: Some(LinuxCapabilities {
                    bounding: caps.clone(),
                    effective: caps.clone(),
                    inheritable: caps.clone(),
                    permitted: caps,
                    ambient: Vec::new(),
                }),
                rlimits: vec![PosixRlimit {
                    typ: "RLIMIT_NOFILE".to_string(),
                    hard: 1024,
                    soft: 1024,
                }],
                no_new_privileges: true,
                ..Default::default()
            },
            root: Root {
                path: "rootfs".to_string(),
                readonly: false,
            },
            hostname: None,
            mounts: default_mounts(),
            annotations: BTreeMap::new(),
            linux: Some(Linux {
                namespaces: ["pid", "network", "ipc", "uts", "mount"]
                    .iter()
                    .map(|ns| LinuxNamespace {
                        typ: ns.to_string(),
                        path: None,
                    })
                    .collect(),
                resources: Some(LinuxResources {
                    devices: vec![LinuxDeviceCgroup {
                        allow: false,
                        access: Some("rwm".to_string()),
                    }],
                    ..Default::default()
                }),
                masked_paths: [
                    "/proc/kcore",
                    "/proc/latency_stats",
                    "/proc/timer_list",
                    "/proc/timer_stats",
                    "/proc/sched_debug",
                    "/sys/firmware",
                ]
                .iter()
                .map(|p| p.to_string())
                .collect(),
                readonly_paths: [
                    "/proc/asound",
                    "/proc/bus",
                    "/proc/fs",
                    "/proc/irq",
                    "/proc/sys",
                    "/proc/sysrq-trigger",
                ]
                .iter()
                .map(|p| p.to_string())
                .collect(),
                ..Default::default()
            }),
        };
        Self { spec }
    }

    /// Generator over an existing spec.
    pub fn from_spec(spec: Spec) -> Self {
        Self { spec }
    }

    /// Loads a spec from a `config.json`.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::from_spec(load_spec(path)?))
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn spec_mut(&mut self) -> &mut Spec {
        &mut self.spec
    }

    pub fn into_spec(self) -> Spec {
        self.spec
    }

    fn linux(&mut self) -> &mut Linux {
        self.spec.linux.get_or_insert_with(Linux::default)
    }

    fn resources(&mut self) -> &mut LinuxResources {
        self.linux()
            .resources
            .get_or_insert_with(LinuxResources::default)
    }

    fn capabilities(&mut self) -> &mut LinuxCapabilities {
        self.spec
            .process
            .capabilities
            .get_or_insert_with(LinuxCapabilities::default)
    }

    // =========================================================================
    // Root and Process
    // =========================================================================

    pub fn set_root_path(&mut self, path: impl Into<String>) {
        self.spec.root.path = path.into();
    }

    pub fn set_root_readonly(&mut self, readonly: bool) {
        self.spec.root.readonly = readonly;
    }

    pub fn set_hostname(&mut self, hostname: impl Into<String>) {
        self.spec.hostname = Some(hostname.into());
    }

    pub fn set_process_args(&mut self, args: Vec<String>) {
        self.spec.process.args = args;
    }

    pub fn set_process_cwd(&mut self, cwd: impl Into<String>) {
        self.spec.process.cwd = cwd.into();
    }

    /// Adds `KEY=value`, replacing an existing entry for the same key.
    pub fn add_process_env(&mut self, key: &str, value: &str) {
        let prefix = format!("{}=", key);
        let entry = format!("{}{}", prefix, value);
        match self
            .spec
            .process
            .env
            .iter_mut()
            .find(|e| e.starts_with(&prefix))
        {
            Some(existing) => *existing = entry,
            None => self.spec.process.env.push(entry),
        }
    }

    pub fn set_process_terminal(&mut self, terminal: bool) {
        self.spec.process.terminal = terminal;
    }

    pub fn set_process_uid(&mut self, uid: u32) {
        self.spec.process.user.uid = uid;
    }

    pub fn set_process_gid(&mut self, gid: u32) {
        self.spec.process.user.gid = gid;
    }

    pub fn add_process_additional_gid(&mut self, gid: u32) {
        let gids = &mut self.spec.process.user.additional_gids;
        if !gids.contains(&gid) {
            gids.push(gid);
        }
    }

    pub fn set_process_apparmor_profile(&mut self, profile: impl Into<String>) {
        self.spec.process.apparmor_profile = Some(profile.into());
    }

    /// Sets the SELinux process label; an empty label clears it.
    pub fn set_process_selinux_label(&mut self, label: &str) {
        self.spec.process.selinux_label = (!label.is_empty()).then(|| label.to_string());
    }

    pub fn set_process_oom_score_adj(&mut self, score: i32) {
        self.spec.process.oom_score_adj = Some(score);
    }

    /// Adds a capability to every capability set.
    pub fn add_process_capability(&mut self, cap: &str) -> Result<()> {
        let cap = normalize_capability(cap)?;
        let caps = self.capabilities();
        for set in [
            &mut caps.bounding,
            &mut caps.effective,
            &mut caps.inheritable,
            &mut caps.permitted,
        ] {
            if !set.contains(&cap) {
                set.push(cap.clone());
            }
        }
        Ok(())
    }

    /// Removes a capability from every capability set.
    pub fn drop_process_capability(&mut self, cap: &str) -> Result<()> {
        let cap = normalize_capability(cap)?;
        let caps = self.capabilities();
        for set in [
            &mut caps.bounding,
            &mut caps.effective,
            &mut caps.inheritable,
            &mut caps.permitted,
            &mut caps.ambient,
        ] {
            set.retain(|c| c != &cap);
        }
        Ok(())
    }

    /// Grants full privileges: every capability, no seccomp, no masked or
    /// read-only paths, access to all devices.
    pub fn setup_privileged(&mut self, privileged: bool) {
        if !privileged {
            return;
        }
        let all: Vec<String> = ALL_CAPABILITIES.iter().map(|c| c.to_string()).collect();
        self.spec.process.capabilities = Some(LinuxCapabilities {
            bounding: all.clone(),
            effective: all.clone(),
            inheritable: all.clone(),
            permitted: all,
            ambient: Vec::new(),
        });
        self.spec.process.no_new_privileges = false;
        self.spec.process.apparmor_profile = None;
        let linux = self.linux();
        linux.seccomp = None;
        linux.masked_paths.clear();
        linux.readonly_paths.clear();
        self.resources().devices = vec![LinuxDeviceCgroup {
            allow: true,
            access: Some("rwm".to_string()),
        }];
    }

    // =========================================================================
    // Mounts and Annotations
    // =========================================================================

    /// Adds a bind mount, replacing any mount at the same destination.
    pub fn add_bind_mount(&mut self, source: &str, destination: &str, options: &[&str]) {
        let mut opts = vec!["rbind".to_string()];
        opts.extend(options.iter().map(|o| o.to_string()));
        self.spec.mounts.retain(|m| m.destination != destination);
        self.spec.mounts.push(Mount {
            destination: destination.to_string(),
            typ: "bind".to_string(),
            source: source.to_string(),
            options: opts,
        });
    }

    pub fn add_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.spec.annotations.insert(key.into(), value.into());
    }

    // =========================================================================
    // Linux
    // =========================================================================

    pub fn add_linux_sysctl(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.linux().sysctl.insert(name.into(), value.into());
    }

    pub fn set_linux_cgroups_path(&mut self, path: impl Into<String>) {
        self.linux().cgroups_path = Some(path.into());
    }

    /// Sets the SELinux mount label; an empty label clears it.
    pub fn set_linux_mount_label(&mut self, label: &str) {
        self.linux().mount_label = (!label.is_empty()).then(|| label.to_string());
    }

    /// Drops a namespace so the container shares the host's.
    pub fn remove_linux_namespace(&mut self, ns: &str) -> Result<()> {
        check_namespace_type(ns)?;
        self.linux().namespaces.retain(|n| n.typ != ns);
        Ok(())
    }

    /// Joins the namespace at `path`, adding the entry if missing.
    pub fn add_or_replace_linux_namespace(&mut self, ns: &str, path: impl Into<String>) -> Result<()> {
        check_namespace_type(ns)?;
        let path = Some(path.into());
        let namespaces = &mut self.linux().namespaces;
        match namespaces.iter_mut().find(|n| n.typ == ns) {
            Some(existing) => existing.path = path,
            None => namespaces.push(LinuxNamespace {
                typ: ns.to_string(),
                path,
            }),
        }
        Ok(())
    }

    pub fn set_linux_resources_cpu_period(&mut self, period: u64) {
        self.resources().cpu.get_or_insert_with(LinuxCpu::default).period = Some(period);
    }

    pub fn set_linux_resources_cpu_quota(&mut self, quota: i64) {
        self.resources().cpu.get_or_insert_with(LinuxCpu::default).quota = Some(quota);
    }

    pub fn set_linux_resources_cpu_shares(&mut self, shares: u64) {
        self.resources().cpu.get_or_insert_with(LinuxCpu::default).shares = Some(shares);
    }

    pub fn set_linux_resources_memory_limit(&mut self, limit: i64) {
        self.resources()
            .memory
            .get_or_insert_with(LinuxMemory::default)
            .limit = Some(limit);
    }

    pub fn set_linux_seccomp(&mut self, seccomp: LinuxSeccomp) {
        self.linux().seccomp = Some(seccomp);
    }

    /// Removes the seccomp section entirely.
    pub fn clear_linux_seccomp(&mut self) {
        if let Some(linux) = self.spec.linux.as_mut() {
            linux.seccomp = None;
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Writes the spec as pretty JSON, atomically.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.spec).map_err(|e| Error::Spec {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        write_atomic(path, &data).map_err(|e| Error::Spec {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Reads and parses a `config.json`.
pub fn load_spec(path: &Path) -> Result<Spec> {
    let data = fs::read(path).map_err(|e| Error::Spec {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_slice(&data).map_err(|e| Error::Spec {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Writes `data` to a sibling temp file, syncs it, then renames it over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = dir.join(format!(".tmp.{}", uuid::Uuid::new_v4()));
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Default mounts of every container.
fn default_mounts() -> Vec<Mount> {
    let mount = |destination: &str, typ: &str, source: &str, options: &[&str]| Mount {
        destination: destination.to_string(),
        typ: typ.to_string(),
        source: source.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
    };
    vec![
        mount("/proc", "proc", "proc", &[]),
        mount(
            "/dev",
            "tmpfs",
            "tmpfs",
            &["nosuid", "strictatime", "mode=755", "size=65536k"],
        ),
        mount(
            "/dev/pts",
            "devpts",
            "devpts",
            &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620", "gid=5"],
        ),
        mount(
            "/dev/shm",
            "tmpfs",
            "shm",
            &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"],
        ),
        mount("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
        mount("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
    ]
}
