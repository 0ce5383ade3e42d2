//! # Mandatory Access Control and Syscall Filtering
//!
//! | Subsystem | Applied to          | Source of the setting                        |
//! |-----------|---------------------|----------------------------------------------|
//! | SELinux   | sandbox + members   | allocated per sandbox, or explicit option    |
//! | AppArmor  | each container      | `container.apparmor.security.beta…/<name>`   |
//! | Seccomp   | each container      | container annotation, pod annotation, none   |
//! | Sysctls   | sandbox             | `security.alpha.kubernetes.io/[unsafe-]sysctls` |
//!
//! [`SecurityContext`] bundles what the host supports with the daemon's
//! default profiles; the orchestrators only consult it, never the host.

pub mod apparmor;
pub mod seccomp;
pub mod selinux;
pub mod sysctl;

pub use seccomp::SeccompProfile;
pub use selinux::SeLinux;
pub use sysctl::{Sysctl, sysctls_from_annotations};

use crate::config::Config;
use crate::platform::{Capability, Platform};
use tracing::{info, warn};

/// Host MAC and seccomp support plus the daemon's default profiles.
#[derive(Debug)]
pub struct SecurityContext {
    pub selinux: SeLinux,
    pub apparmor_enabled: bool,
    pub apparmor_profile: String,
    pub seccomp_enabled: bool,
    pub seccomp_profile: SeccompProfile,
}

impl SecurityContext {
    /// Combines the detected platform with the configured profiles.
    ///
    /// A missing seccomp profile file falls back to
    /// [`SeccompProfile::builtin`]; a file that exists but does not parse is
    /// an error.
    pub fn from_config(config: &Config, platform: &Platform) -> crate::Result<Self> {
        let selinux = SeLinux::new(config.runtime.selinux && platform.has(Capability::SeLinux));
        let seccomp_path = &config.runtime.seccomp_profile;
        let seccomp_profile = if seccomp_path.exists() {
            SeccompProfile::load(seccomp_path)?
        } else {
            warn!(
                "seccomp profile {} not found, using built-in default",
                seccomp_path.display()
            );
            SeccompProfile::builtin()
        };

        let ctx = Self {
            selinux,
            apparmor_enabled: platform.has(Capability::AppArmor),
            apparmor_profile: config.runtime.apparmor_profile.clone(),
            seccomp_enabled: platform.has(Capability::Seccomp),
            seccomp_profile,
        };
        info!(
            selinux = ctx.selinux.is_enabled(),
            apparmor = ctx.apparmor_enabled,
            seccomp = ctx.seccomp_enabled,
            "security subsystems detected"
        );
        Ok(ctx)
    }

    /// Everything disabled; seccomp uses the built-in profile.
    pub fn disabled() -> Self {
        Self {
            selinux: SeLinux::new(false),
            apparmor_enabled: false,
            apparmor_profile: crate::constants::DEFAULT_APPARMOR_PROFILE.to_string(),
            seccomp_enabled: false,
            seccomp_profile: SeccompProfile::builtin(),
        }
    }
}
