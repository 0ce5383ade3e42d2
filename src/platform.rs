//! Platform detection and capability enumeration.
//!
//! Probed once at startup to decide which isolation features the daemon
//! turns on. The daemon itself only runs on Linux; on other hosts every
//! capability is reported missing.

use crate::security::{apparmor, seccomp, selinux::SeLinux};
use std::collections::HashSet;
use std::path::Path;

/// Detected platform information.
#[derive(Debug, Clone)]
pub struct Platform {
    /// Kernel release (if detectable).
    pub kernel_version: Option<String>,
    /// Available capabilities.
    pub capabilities: HashSet<Capability>,
}

/// Host features that affect how sandboxes are isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Linux namespaces (pid, net, mnt, etc.)
    Namespaces,
    /// Linux control groups (v1 or v2)
    Cgroups,
    /// Seccomp filter mode
    Seccomp,
    /// SELinux with selinuxfs mounted
    SeLinux,
    /// AppArmor module enabled and parser installed
    AppArmor,
}

impl Platform {
    /// Detects the current platform and its capabilities.
    pub fn detect() -> Self {
        Self {
            kernel_version: Self::detect_kernel_version(),
            capabilities: Self::detect_capabilities(),
        }
    }

    /// Platform with an explicit capability set.
    pub fn with_capabilities(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            kernel_version: None,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// Returns true if the capability was detected.
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Reads the kernel release from procfs.
    fn detect_kernel_version() -> Option<String> {
        std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn detect_capabilities() -> HashSet<Capability> {
        let mut caps = HashSet::new();
        if !cfg!(target_os = "linux") {
            return caps;
        }

        if Path::new("/proc/self/ns/pid").exists() {
            caps.insert(Capability::Namespaces);
        }
        if Path::new("/sys/fs/cgroup").exists() {
            caps.insert(Capability::Cgroups);
        }
        if seccomp::is_enabled() {
            caps.insert(Capability::Seccomp);
        }
        if SeLinux::detect().is_enabled() {
            caps.insert(Capability::SeLinux);
        }
        if apparmor::is_enabled() {
            caps.insert(Capability::AppArmor);
        }
        caps
    }
}
