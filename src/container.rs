//! In-memory container objects.
//!
//! Identity fields are immutable once built. Observed runtime state lives
//! behind a small mutex and is only written by [`Container::apply_oci_state`]
//! and the stop/remove paths.

use crate::cri::{ContainerMetadata, ImageSpec};
use crate::error::{Error, Result};
use crate::runtime::{ContainerStatus, OciState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Path of a namespace handle of a running process.
pub fn namespace_path(pid: u32, ns: &str) -> PathBuf {
    PathBuf::from(format!("/proc/{}/ns/{}", pid, ns))
}

/// Observed runtime state of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRuntimeState {
    pub status: ContainerStatus,
    /// Init process id while the container has one.
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

/// A container tracked by the daemon, infra or user.
#[derive(Debug)]
pub struct Container {
    id: String,
    name: String,
    bundle_dir: PathBuf,
    log_path: PathBuf,
    labels: HashMap<String, String>,
    annotations: HashMap<String, String>,
    image: Option<ImageSpec>,
    metadata: Option<ContainerMetadata>,
    sandbox_id: String,
    tty: bool,
    state: Mutex<ContainerRuntimeState>,
}

impl Container {
    /// Creates a container in the `Creating` state.
    ///
    /// `bundle_dir` is the run directory holding the runtime copy of
    /// `config.json`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        bundle_dir: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
        sandbox_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bundle_dir: bundle_dir.into(),
            log_path: log_path.into(),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            image: None,
            metadata: None,
            sandbox_id: sandbox_id.into(),
            tty: false,
            state: Mutex::new(ContainerRuntimeState {
                status: ContainerStatus::Creating,
                pid: None,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
                exit_code: None,
            }),
        }
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_annotations(mut self, annotations: HashMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_image(mut self, image: ImageSpec) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_metadata(mut self, metadata: ContainerMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.annotations
    }

    pub fn image(&self) -> Option<&ImageSpec> {
        self.image.as_ref()
    }

    /// Request metadata; `None` for infra containers.
    pub fn metadata(&self) -> Option<&ContainerMetadata> {
        self.metadata.as_ref()
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    pub fn tty(&self) -> bool {
        self.tty
    }

    /// Snapshot of the last observed state.
    pub fn runtime_state(&self) -> ContainerRuntimeState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn status(&self) -> ContainerStatus {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.status(),
            ContainerStatus::Running | ContainerStatus::Paused
        )
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).pid
    }

    /// Records a state document returned by the runtime.
    pub fn apply_oci_state(&self, oci: &OciState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        state.status = oci.status;
        match oci.status {
            ContainerStatus::Creating | ContainerStatus::Created => {
                state.pid = (oci.pid > 0).then_some(oci.pid);
                if let Some(created) = oci.created {
                    state.created_at = created;
                }
            }
            ContainerStatus::Running | ContainerStatus::Paused => {
                state.pid = (oci.pid > 0).then_some(oci.pid);
                if state.started_at.is_none() {
                    state.started_at = Some(now);
                }
            }
            ContainerStatus::Stopped => {
                state.pid = None;
                if state.finished_at.is_none() {
                    state.finished_at = Some(now);
                }
            }
        }
    }

    /// Marks the container stopped after its runtime record disappeared.
    pub fn mark_stopped(&self, exit_code: Option<i32>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.status = ContainerStatus::Stopped;
        state.pid = None;
        if state.finished_at.is_none() {
            state.finished_at = Some(Utc::now());
        }
        if exit_code.is_some() {
            state.exit_code = exit_code;
        }
    }

    /// Path of one of the init process's namespace handles.
    pub fn namespace_path(&self, ns: &str) -> Result<PathBuf> {
        let pid = self.pid().ok_or_else(|| {
            Error::Internal(format!(
                "container {} has no init process, cannot resolve {} namespace",
                self.id, ns
            ))
        })?;
        Ok(namespace_path(pid, ns))
    }

    /// Network namespace path of the init process.
    pub fn netns_path(&self) -> Result<PathBuf> {
        self.namespace_path("net")
    }
}
