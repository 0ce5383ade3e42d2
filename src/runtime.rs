//! OCI runtime collaborator interface.
//!
//! The orchestrators never spawn container processes themselves. They hand a
//! [`Container`] whose bundle directory holds a `config.json` to an
//! [`OciRuntime`] and read back the observed state:
//!
//! ```text
//!   create_container ──► update_status ──► start_container ──► update_status
//!                                                │
//!                          stop_container ◄──────┘   (TERM, poll, KILL)
//!                                │
//!                          delete_container
//! ```
//!
//! Observed state is cached on the [`Container`]; [`OciRuntime::container_status`]
//! returns that cache without touching the runtime.
//!
//! # OCI Runtime Spec Reference
//!
//! See: https://github.com/opencontainers/runtime-spec/blob/main/runtime.md

use crate::constants::STOP_POLL_INTERVAL;
use crate::container::{Container, ContainerRuntimeState};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Container State (OCI Runtime Spec)
// =============================================================================

/// OCI Runtime Spec container status.
///
/// Ref: https://github.com/opencontainers/runtime-spec/blob/main/runtime.md#state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container is being created.
    Creating,
    /// Container has been created but not started.
    Created,
    /// Container is running.
    Running,
    /// Container is frozen.
    Paused,
    /// Container has stopped.
    Stopped,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// State document printed by `<runtime> state <id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciState {
    /// OCI version of the state schema.
    #[serde(default)]
    pub oci_version: String,
    /// Container ID.
    pub id: String,
    /// Container status.
    pub status: ContainerStatus,
    /// Process ID of the container; `0` once it has exited.
    #[serde(default)]
    pub pid: u32,
    /// Absolute path to the bundle directory.
    #[serde(default)]
    pub bundle: String,
    /// Creation time reported by the runtime.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Annotations from the container config.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

// =============================================================================
// Signals
// =============================================================================

/// Signal sent to a container's init process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGTERM (graceful shutdown).
    Term,
    /// SIGKILL (force kill).
    Kill,
}

impl Signal {
    /// Returns the signal number.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Term => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }

    /// Signal name without the `SIG` prefix, as runtime CLIs expect it.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Term => "TERM",
            Self::Kill => "KILL",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SIG{}", self.short_name())
    }
}

// =============================================================================
// OCI Runtime Trait
// =============================================================================

/// Container execution backend.
///
/// Implementations operate on the bundle at [`Container::bundle_dir`] and
/// key runtime state by [`Container::id`].
#[async_trait]
pub trait OciRuntime: Send + Sync {
    /// Returns the runtime name.
    fn name(&self) -> &str;

    /// Returns the runtime's version string.
    async fn version(&self) -> Result<String>;

    /// Creates the container from its bundle without starting the process.
    async fn create_container(&self, container: &Container) -> Result<()>;

    /// Starts a created container.
    async fn start_container(&self, container: &Container) -> Result<()>;

    /// Queries the runtime for the container's current state.
    async fn state(&self, container: &Container) -> Result<OciState>;

    /// Sends a signal to the container's init process.
    async fn kill_container(&self, container: &Container, signal: Signal) -> Result<()>;

    /// Removes the runtime's record of a stopped container.
    async fn delete_container(&self, container: &Container) -> Result<()>;

    /// Refreshes the cached state on `container` from the runtime.
    async fn update_status(&self, container: &Container) -> Result<()> {
        let state = self.state(container).await?;
        debug!(
            "container {} is {} (pid {})",
            container.id(),
            state.status,
            state.pid
        );
        container.apply_oci_state(&state);
        Ok(())
    }

    /// Returns the last observed state without querying the runtime.
    fn container_status(&self, container: &Container) -> ContainerRuntimeState {
        container.runtime_state()
    }

    /// Stops a container: SIGTERM, wait up to `timeout`, then SIGKILL.
    ///
    /// A container that is not running is left untouched.
    async fn stop_container(&self, container: &Container, timeout: Duration) -> Result<()> {
        self.update_status(container).await?;
        if !container.is_running() {
            return Ok(());
        }

        self.kill_container(container, Signal::Term).await?;
        if self.wait_stopped(container, timeout).await? {
            info!("Stopped container {}", container.id());
            return Ok(());
        }

        warn!(
            "container {} did not stop within {:?}, sending {}",
            container.id(),
            timeout,
            Signal::Kill
        );
        self.kill_container(container, Signal::Kill).await?;
        if self.wait_stopped(container, timeout).await? {
            info!("Killed container {}", container.id());
            return Ok(());
        }
        Err(Error::StopFailed {
            id: container.id().to_string(),
            reason: format!("still running after {}", Signal::Kill),
        })
    }

    /// Polls until the container is no longer running or `timeout` elapses.
    async fn wait_stopped(&self, container: &Container, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.update_status(container).await?;
            if !container.is_running() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
    }
}
