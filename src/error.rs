//! Error types for the lifecycle daemon.
//!
//! Every fallible operation in the crate returns [`Result`]. Variants are
//! grouped the way callers need to react to them:
//!
//! | Group        | Raised                                   | Compensation |
//! |--------------|------------------------------------------|--------------|
//! | Validation   | before any subsystem is touched          | none         |
//! | Conflict     | when a name or id is already reserved    | none         |
//! | Not found    | unresolvable sandbox/container reference | none         |
//! | Subsystem    | storage, runtime, network, MAC failures  | unwound      |
//! | Unsupported  | feature missing on this host             | unwound      |

use std::path::PathBuf;

/// Result type alias for daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the identity, state, orchestration and collaborator layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// A required request field is missing or malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    // =========================================================================
    // Conflict Errors
    // =========================================================================
    /// The name is already reserved by another id.
    #[error("conflict, name {name} already reserved for {owner}")]
    NameConflict { name: String, owner: String },

    /// The id is already present in an index.
    #[error("id {0} already exists")]
    IdConflict(String),

    /// Storage already holds a pod sandbox with this name.
    #[error("pod sandbox with name {0:?} already exists")]
    SandboxAlreadyExists(String),

    /// Storage already holds a record with this name.
    #[error("duplicate name {0:?} in storage")]
    DuplicateName(String),

    // =========================================================================
    // Not Found Errors
    // =========================================================================
    /// No tracked sandbox matches the reference.
    #[error("pod sandbox not found: {0}")]
    SandboxNotFound(String),

    /// No tracked container matches the reference.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// No indexed id starts with the prefix.
    #[error("no such id: {0}")]
    IdNotFound(String),

    /// More than one indexed id starts with the prefix.
    #[error("multiple ids match the prefix: {0}")]
    AmbiguousId(String),

    /// No storage record matches the id or name.
    #[error("storage record not found: {0}")]
    RecordNotFound(String),

    // =========================================================================
    // Subsystem Errors
    // =========================================================================
    /// Storage operation failed.
    #[error("storage {operation} failed for {id}: {reason}")]
    Storage {
        operation: String,
        id: String,
        reason: String,
    },

    /// Storage root could not be prepared.
    #[error("failed to initialize storage at {path}: {reason}")]
    StorageInitFailed { path: PathBuf, reason: String },

    /// Runtime create failed.
    #[error("failed to create container {id}: {reason}")]
    CreateFailed { id: String, reason: String },

    /// Runtime start failed.
    #[error("failed to start container {id}: {reason}")]
    StartFailed { id: String, reason: String },

    /// Runtime stop or signal delivery failed.
    #[error("failed to stop container {id}: {reason}")]
    StopFailed { id: String, reason: String },

    /// Runtime delete failed.
    #[error("failed to delete container {id}: {reason}")]
    DeleteFailed { id: String, reason: String },

    /// Runtime state query failed.
    #[error("failed to query state of container {id}: {reason}")]
    StatusFailed { id: String, reason: String },

    /// Network plugin failed.
    #[error("network setup failed for pod sandbox {id}: {reason}")]
    Network { id: String, reason: String },

    /// SELinux, AppArmor, seccomp or sysctl handling failed.
    #[error("security configuration failed: {0}")]
    Security(String),

    /// The runtime spec could not be built, read or written.
    #[error("runtime spec error at {path}: {reason}")]
    Spec { path: PathBuf, reason: String },

    // =========================================================================
    // Capability Errors
    // =========================================================================
    /// Operation or profile kind is not supported on this host.
    #[error("unsupported: {0}")]
    Unsupported(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file could not be read or parsed.
    #[error("invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Invariant violation inside the daemon.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true for errors raised before any subsystem was touched.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true for name, id and duplicate-record conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::NameConflict { .. }
                | Self::IdConflict(_)
                | Self::SandboxAlreadyExists(_)
                | Self::DuplicateName(_)
        )
    }

    /// Returns true when a reference could not be resolved.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SandboxNotFound(_)
                | Self::ContainerNotFound(_)
                | Self::IdNotFound(_)
                | Self::RecordNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
