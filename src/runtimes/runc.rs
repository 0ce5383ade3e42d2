//! # runc-compatible OCI runtime
//!
//! Implements [`OciRuntime`] by invoking an OCI runtime binary with the
//! `runc` command-line interface (`runc`, `crun`, `youki` all qualify).
//!
//! ## Invocation
//!
//! | Operation | Command                                                  |
//! |-----------|----------------------------------------------------------|
//! | create    | `<rt> --root R --log L create --bundle B --pid-file P ID` |
//! | start     | `<rt> --root R --log L start ID`                          |
//! | state     | `<rt> --root R state ID` (JSON on stdout)                 |
//! | kill      | `<rt> --root R --log L kill ID TERM`                      |
//! | delete    | `<rt> --root R --log L delete --force ID`                 |
//!
//! ## Output handling
//!
//! The container's init process inherits the stdio of `create`. Piping it
//! back would block until the container exits, so `create` writes to the
//! container's log file instead. Failures are explained from the runtime's
//! JSON log (`--log-format json`), falling back to stderr.
//!
//! Every invocation holds the [`ReapGate`] so the orphan reaper cannot
//! collect the command before it is awaited here.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::reaper::ReapGate;
use crate::runtime::{OciRuntime, OciState, Signal};
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

/// Runtime log written next to the bundle's `config.json`.
const RUNTIME_LOG: &str = "runtime.log";

/// Init pid written by `create`.
const PID_FILE: &str = "pid";

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default)]
    level: String,
    #[serde(default)]
    msg: String,
}

/// External OCI runtime driven through its CLI.
#[derive(Debug, Clone)]
pub struct RuncRuntime {
    path: PathBuf,
    root: PathBuf,
    gate: ReapGate,
}

impl RuncRuntime {
    /// Creates a runtime client for the binary at `path` keeping its state
    /// under `root`.
    pub fn new(path: PathBuf, root: PathBuf, gate: ReapGate) -> Self {
        Self { path, root, gate }
    }

    /// Runtime binary.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn base_args(&self, log: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--root".into(), self.root.clone().into()];
        if let Some(log) = log {
            args.push("--log".into());
            args.push(log.into());
            args.push("--log-format".into());
            args.push("json".into());
        }
        args
    }

    /// Runs a command with piped output and returns stdout.
    async fn run(
        &self,
        container: Option<&Container>,
        args: &[&str],
    ) -> std::result::Result<Vec<u8>, String> {
        let log = container.map(|c| c.bundle_dir().join(RUNTIME_LOG));
        let mut full = self.base_args(log.as_deref());
        full.extend(args.iter().map(OsString::from));
        debug!("{} {:?}", self.path.display(), full);

        let _exec = self.gate.exec().await;
        let output = tokio::process::Command::new(&self.path)
            .args(&full)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("executing {} failed: {}", self.path.display(), e))?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        Err(failure_reason(
            log.as_deref(),
            &output.stderr,
            &output.status.to_string(),
        ))
    }
}

/// Last error recorded in the runtime's JSON log, else stderr.
fn failure_reason(log: Option<&Path>, stderr: &[u8], status: &str) -> String {
    let from_log = log
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| {
            content
                .lines()
                .filter_map(|line| serde_json::from_str::<LogEntry>(line).ok())
                .filter(|entry| entry.level == "error" && !entry.msg.is_empty())
                .last()
                .map(|entry| entry.msg)
        });
    from_log.unwrap_or_else(|| {
        let stderr = String::from_utf8_lossy(stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            format!("runtime {}", status)
        } else {
            stderr.to_string()
        }
    })
}

fn is_missing(reason: &str) -> bool {
    reason.contains("does not exist") || reason.contains("not found")
}

#[async_trait]
impl OciRuntime for RuncRuntime {
    fn name(&self) -> &str {
        "runc"
    }

    async fn version(&self) -> Result<String> {
        let stdout = self
            .run(None, &["--version"])
            .await
            .map_err(Error::Internal)?;
        let text = String::from_utf8_lossy(&stdout);
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn create_container(&self, container: &Container) -> Result<()> {
        let create_err = |reason: String| Error::CreateFailed {
            id: container.id().to_string(),
            reason,
        };
        if container.tty() {
            return Err(Error::Unsupported(format!(
                "terminal for container {} requires a console socket",
                container.name()
            )));
        }

        let bundle = container.bundle_dir();
        let log = bundle.join(RUNTIME_LOG);
        let mut args = self.base_args(Some(&log));
        args.push("create".into());
        args.push("--bundle".into());
        args.push(bundle.into());
        args.push("--pid-file".into());
        args.push(bundle.join(PID_FILE).into());
        args.push(container.id().into());

        let log_path = container.log_path();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| create_err(format!("creating log directory failed: {}", e)))?;
        }
        let stdout = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(|e| create_err(format!("opening {} failed: {}", log_path.display(), e)))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| create_err(format!("duplicating log handle failed: {}", e)))?;

        debug!("{} {:?}", self.path.display(), args);
        let status = {
            let _exec = self.gate.exec().await;
            tokio::process::Command::new(&self.path)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::from(stdout))
                .stderr(Stdio::from(stderr))
                .status()
                .await
                .map_err(|e| create_err(format!("executing {} failed: {}", self.path.display(), e)))?
        };
        if !status.success() {
            return Err(create_err(failure_reason(
                Some(&log),
                &[],
                &status.to_string(),
            )));
        }
        info!("Created container {} ({})", container.name(), container.id());
        Ok(())
    }

    async fn start_container(&self, container: &Container) -> Result<()> {
        self.run(Some(container), &["start", container.id()])
            .await
            .map_err(|reason| Error::StartFailed {
                id: container.id().to_string(),
                reason,
            })?;
        info!("Started container {} ({})", container.name(), container.id());
        Ok(())
    }

    async fn state(&self, container: &Container) -> Result<OciState> {
        let stdout = self
            .run(None, &["state", container.id()])
            .await
            .map_err(|reason| Error::StatusFailed {
                id: container.id().to_string(),
                reason,
            })?;
        serde_json::from_slice(&stdout).map_err(|e| Error::StatusFailed {
            id: container.id().to_string(),
            reason: format!("invalid state output: {}", e),
        })
    }

    async fn kill_container(&self, container: &Container, signal: Signal) -> Result<()> {
        self.run(
            Some(container),
            &["kill", container.id(), signal.short_name()],
        )
        .await
        .map(|_| ())
        .map_err(|reason| Error::StopFailed {
            id: container.id().to_string(),
            reason,
        })
    }

    async fn delete_container(&self, container: &Container) -> Result<()> {
        match self
            .run(
                Some(container),
                &["delete", "--force", container.id()],
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(reason) if is_missing(&reason) => {
                debug!("container {} already gone from runtime", container.id());
                Ok(())
            }
            Err(reason) => Err(Error::DeleteFailed {
                id: container.id().to_string(),
                reason,
            }),
        }
    }
}
