//! Seccomp support detection and profile loading.
//!
//! Profiles use the Docker JSON format (`defaultAction`, `archMap`,
//! `syscalls[].names`) and are converted into the OCI `linux.seccomp`
//! section by [`SeccompProfile::to_oci`].

use crate::error::{Error, Result};
use crate::spec::{LinuxSeccomp, LinuxSeccompArg, LinuxSyscall};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SECCOMP_MODE_FILTER: libc::c_ulong = 2;

/// Returns true when the kernel supports seccomp filter mode.
pub fn is_enabled() -> bool {
    // SAFETY: PR_GET_SECCOMP takes no pointers.
    let get = unsafe { libc::prctl(libc::PR_GET_SECCOMP, 0, 0, 0, 0) };
    if get < 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINVAL) {
        return false;
    }
    // SAFETY: a NULL filter makes a supporting kernel fail with EFAULT before
    // installing anything; a kernel without filter support fails with EINVAL.
    let set = unsafe {
        libc::prctl(
            libc::PR_SET_SECCOMP,
            SECCOMP_MODE_FILTER,
            std::ptr::null::<libc::c_void>(),
            0,
            0,
        )
    };
    !(set < 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINVAL))
}

/// Docker-format seccomp profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeccompProfile {
    pub default_action: String,
    pub architectures: Vec<String>,
    pub arch_map: Vec<ArchMap>,
    pub syscalls: Vec<SyscallRule>,
}

/// Architecture with the sub-architectures it implies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchMap {
    pub architecture: String,
    pub sub_architectures: Vec<String>,
}

/// Rule for one syscall (`name`) or several (`names`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyscallRule {
    pub name: String,
    pub names: Vec<String>,
    pub action: String,
    pub args: Vec<SyscallArg>,
}

/// Argument comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyscallArg {
    pub index: u32,
    pub value: u64,
    pub value_two: u64,
    pub op: String,
}

impl SeccompProfile {
    /// Reads a profile file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            Error::Security(format!(
                "opening seccomp profile ({}) failed: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&data)
    }

    /// Parses profile JSON.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let profile: Self = serde_json::from_slice(data)
            .map_err(|e| Error::Security(format!("decoding seccomp profile failed: {}", e)))?;
        if profile.default_action.is_empty() {
            return Err(Error::Security(
                "seccomp profile has no defaultAction".to_string(),
            ));
        }
        Ok(profile)
    }

    /// Built-in profile used when no profile file is installed: allow by
    /// default, deny syscalls that reach outside the container.
    pub fn builtin() -> Self {
        let denied = [
            "acct",
            "add_key",
            "bpf",
            "clock_adjtime",
            "clock_settime",
            "create_module",
            "delete_module",
            "finit_module",
            "get_kernel_syms",
            "init_module",
            "ioperm",
            "iopl",
            "kcmp",
            "kexec_file_load",
            "kexec_load",
            "keyctl",
            "lookup_dcookie",
            "nfsservctl",
            "open_by_handle_at",
            "perf_event_open",
            "personality",
            "pivot_root",
            "query_module",
            "quotactl",
            "reboot",
            "request_key",
            "setns",
            "settimeofday",
            "stime",
            "swapoff",
            "swapon",
            "sysfs",
            "_sysctl",
            "umount",
            "umount2",
            "unshare",
            "uselib",
            "userfaultfd",
            "ustat",
            "vm86",
            "vm86old",
        ];
        Self {
            default_action: "SCMP_ACT_ALLOW".to_string(),
            architectures: Vec::new(),
            arch_map: vec![
                ArchMap {
                    architecture: "SCMP_ARCH_X86_64".to_string(),
                    sub_architectures: vec![
                        "SCMP_ARCH_X86".to_string(),
                        "SCMP_ARCH_X32".to_string(),
                    ],
                },
                ArchMap {
                    architecture: "SCMP_ARCH_AARCH64".to_string(),
                    sub_architectures: vec!["SCMP_ARCH_ARM".to_string()],
                },
            ],
            syscalls: vec![SyscallRule {
                name: String::new(),
                names: denied.iter().map(|s| s.to_string()).collect(),
                action: "SCMP_ACT_ERRNO".to_string(),
                args: Vec::new(),
            }],
        }
    }

    /// Converts into the OCI `linux.seccomp` section.
    pub fn to_oci(&self) -> LinuxSeccomp {
        let mut architectures = self.architectures.clone();
        for arch in &self.arch_map {
            architectures.push(arch.architecture.clone());
            architectures.extend(arch.sub_architectures.iter().cloned());
        }
        architectures.dedup();

        let syscalls = self
            .syscalls
            .iter()
            .map(|rule| {
                let mut names = rule.names.clone();
                if !rule.name.is_empty() && !names.contains(&rule.name) {
                    names.insert(0, rule.name.clone());
                }
                LinuxSyscall {
                    names,
                    action: rule.action.clone(),
                    args: rule
                        .args
                        .iter()
                        .map(|arg| LinuxSeccompArg {
                            index: arg.index,
                            value: arg.value,
                            value_two: (arg.value_two != 0).then_some(arg.value_two),
                            op: arg.op.clone(),
                        })
                        .collect(),
                }
            })
            .filter(|s| !s.names.is_empty())
            .collect();

        LinuxSeccomp {
            default_action: self.default_action.clone(),
            architectures,
            syscalls,
        }
    }
}
