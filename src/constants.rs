//! # Daemon Constants
//!
//! Annotation keys, default paths and fixed values shared by the
//! orchestrators, the persisted spec layout and startup reconciliation.
//!
//! ## Persisted Annotation Namespace
//!
//! Every `config.json` written by the daemon carries the `io.magikcri.*`
//! annotations below. They are the only input reconciliation uses to
//! rebuild in-memory sandboxes and containers, so renaming a key breaks
//! restores of records written by older daemons.
//!
//! ## Cross-References
//!
//! - [`crate::server`]: writes the annotations during creation
//! - [`crate::server::restore`]: reads them back at startup
//! - [`crate::config`]: uses the default paths

use std::time::Duration;

// =============================================================================
// Annotation Keys
// =============================================================================

/// Final container or sandbox name.
pub const ANNOTATION_NAME: &str = "io.magikcri.name";

/// Owning sandbox id.
pub const ANNOTATION_SANDBOX_ID: &str = "io.magikcri.sandbox_id";

/// Owning sandbox's infra container name.
pub const ANNOTATION_SANDBOX_NAME: &str = "io.magikcri.sandbox_name";

/// Either [`CONTAINER_TYPE_SANDBOX`] or [`CONTAINER_TYPE_CONTAINER`].
pub const ANNOTATION_CONTAINER_TYPE: &str = "io.magikcri.container_type";

/// Infra container name, written on sandbox specs only.
pub const ANNOTATION_CONTAINER_NAME: &str = "io.magikcri.container_name";

/// Infra container id, written on sandbox specs only.
pub const ANNOTATION_CONTAINER_ID: &str = "io.magikcri.container_id";

/// Log directory (sandbox) or log file (container).
pub const ANNOTATION_LOG_PATH: &str = "io.magikcri.log_path";

/// `"true"` or `"false"`.
pub const ANNOTATION_TTY: &str = "io.magikcri.tty";

/// Image reference the container was created from.
pub const ANNOTATION_IMAGE: &str = "io.magikcri.image";

/// JSON-serialized request metadata.
pub const ANNOTATION_METADATA: &str = "io.magikcri.metadata";

/// JSON-serialized labels.
pub const ANNOTATION_LABELS: &str = "io.magikcri.labels";

/// JSON-serialized user annotations.
pub const ANNOTATION_ANNOTATIONS: &str = "io.magikcri.annotations";

/// `"true"` when the sandbox shares the host network namespace.
pub const ANNOTATION_HOST_NETWORK: &str = "io.magikcri.host_network";

/// Marks a spec as belonging to a pod sandbox.
pub const CONTAINER_TYPE_SANDBOX: &str = "sandbox";

/// Marks a spec as belonging to a user container.
pub const CONTAINER_TYPE_CONTAINER: &str = "container";

// =============================================================================
// Security Annotations
// =============================================================================

/// Pod-wide seccomp profile annotation.
pub const SECCOMP_POD_ANNOTATION: &str = "security.alpha.kubernetes.io/seccomp/pod";

/// Per-container seccomp annotation prefix; the container name is appended.
pub const SECCOMP_CONTAINER_ANNOTATION_PREFIX: &str =
    "security.alpha.kubernetes.io/seccomp/container/";

/// Seccomp profile that disables filtering.
pub const SECCOMP_UNCONFINED: &str = "unconfined";

/// Seccomp profile that selects the daemon's loaded default.
pub const SECCOMP_RUNTIME_DEFAULT: &str = "runtime/default";

/// Prefix of node-local seccomp profile references.
pub const SECCOMP_LOCALHOST_PREFIX: &str = "localhost/";

/// Per-container AppArmor annotation prefix; the container name is appended.
pub const APPARMOR_CONTAINER_ANNOTATION_PREFIX: &str =
    "container.apparmor.security.beta.kubernetes.io/";

/// AppArmor value that selects the daemon's default profile.
pub const APPARMOR_RUNTIME_DEFAULT: &str = "runtime/default";

/// Prefix of named AppArmor profiles.
pub const APPARMOR_PROFILE_PREFIX: &str = "localhost/";

/// Comma separated `name=value` list of safe sysctls.
pub const SYSCTLS_ANNOTATION: &str = "security.alpha.kubernetes.io/sysctls";

/// Comma separated `name=value` list of unsafe sysctls.
pub const UNSAFE_SYSCTLS_ANNOTATION: &str = "security.alpha.kubernetes.io/unsafe-sysctls";

// =============================================================================
// Naming
// =============================================================================

/// Suffix of every sandbox's infra container name.
pub const INFRA_CONTAINER_SUFFIX: &str = "infra";

/// Number of hex characters in a generated id.
pub const ID_LENGTH: usize = 64;

/// Length of the short form of an id, which must not be all digits.
pub const SHORT_ID_LENGTH: usize = 12;

// =============================================================================
// Defaults
// =============================================================================

/// Default durable storage root.
pub const DEFAULT_ROOT: &str = "/var/lib/magikcri";

/// Default ephemeral run root.
pub const DEFAULT_RUN_ROOT: &str = "/var/run/magikcri";

/// Default parent of per-sandbox log directories.
pub const DEFAULT_LOG_DIR: &str = "/var/log/magikcri/pods";

/// Default OCI runtime binary.
pub const DEFAULT_RUNTIME_PATH: &str = "/usr/bin/runc";

/// Default state root passed to the OCI runtime via `--root`.
pub const DEFAULT_RUNTIME_ROOT: &str = "/run/magikcri/runc";

/// Image used for infra containers.
pub const DEFAULT_PAUSE_IMAGE: &str = "kubernetes/pause";

/// Command run by infra containers.
pub const DEFAULT_PAUSE_COMMAND: &str = "/pause";

/// Default seccomp profile file for `runtime/default`.
pub const DEFAULT_SECCOMP_PROFILE: &str = "/etc/magikcri/seccomp.json";

/// Default AppArmor profile name for `runtime/default`.
pub const DEFAULT_APPARMOR_PROFILE: &str = "magikcri-default";

/// Default CNI network configuration directory.
pub const DEFAULT_CNI_CONFIG_DIR: &str = "/etc/cni/net.d/";

/// Default CNI plugin binary directory.
pub const DEFAULT_CNI_PLUGIN_DIR: &str = "/opt/cni/bin/";

/// Default configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/magikcri/magikcri.toml";

/// Name of the spec file in every record directory.
pub const SPEC_FILE: &str = "config.json";

/// Name of the generated DNS file in a sandbox run directory.
pub const RESOLV_CONF_FILE: &str = "resolv.conf";

/// Output file of the infra container inside the sandbox log directory.
pub const INFRA_LOG_FILE: &str = "infra.log";

/// Address reported for host-network sandboxes when none is configured.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Host resolver configuration.
pub const HOST_RESOLV_CONF: &str = "/etc/resolv.conf";

/// Version of the runtime API the daemon implements.
pub const RUNTIME_API_VERSION: &str = "v1alpha1";

/// OCI runtime spec version written to `config.json`.
pub const OCI_RUNTIME_SPEC_VERSION: &str = "1.0.0";

/// Default PATH for container processes.
pub const DEFAULT_PATH_ENV: &str =
    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Process run when a container has neither command nor args.
pub const DEFAULT_SHELL: &str = "/bin/sh";

// =============================================================================
// Timeouts
// =============================================================================

/// Grace period between SIGTERM and SIGKILL when stopping a container.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between state polls while waiting for a container to stop.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Validation
// =============================================================================

/// Maximum length of a sandbox or container name.
pub const MAX_NAME_LEN: usize = 253;

/// Validates a sandbox or container metadata name.
///
/// Names end up in storage record names and in filesystem paths, so path
/// separators and NUL bytes are rejected.
pub fn validate_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("name cannot be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("name exceeds maximum length");
    }
    if name.contains('/') || name.contains('\0') {
        return Err("name contains invalid characters");
    }
    if name == "." || name == ".." {
        return Err("name cannot be a relative path component");
    }
    Ok(())
}
