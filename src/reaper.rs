//! Orphan reaping.
//!
//! Container processes re-parent to the daemon once the runtime's own
//! helper exits, so the daemon marks itself a child subreaper and collects
//! zombies after every `SIGCHLD`.
//!
//! `waitpid(-1)` would also collect the runtime and CNI commands the daemon
//! spawns and awaits itself. Those run while holding a shared [`ExecGuard`];
//! the reaper takes the gate exclusively, so it only sweeps when no such
//! command is in flight. A `SIGCHLD` that arrives mid-command is picked up by
//! the next sweep.

use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared gate between command execution and the reaper.
#[derive(Debug, Clone, Default)]
pub struct ReapGate {
    lock: Arc<RwLock<()>>,
}

/// Held for the lifetime of one spawned command.
#[derive(Debug)]
pub struct ExecGuard {
    _guard: OwnedRwLockReadGuard<()>,
}

impl ReapGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks reaping until the returned guard is dropped.
    pub async fn exec(&self) -> ExecGuard {
        ExecGuard {
            _guard: self.lock.clone().read_owned().await,
        }
    }

    /// Reaps every exited child once no command is in flight.
    pub async fn sweep(&self) -> usize {
        let _exclusive = self.lock.write().await;
        reap_children()
    }
}

/// Makes the calling process the subreaper for its descendants.
pub fn set_subreaper() -> std::io::Result<()> {
    // SAFETY: PR_SET_CHILD_SUBREAPER takes a plain integer argument.
    let rc = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Starts the background reaper task.
pub fn spawn_reaper(gate: ReapGate) -> std::io::Result<JoinHandle<()>> {
    let mut sigchld = signal(SignalKind::child())?;
    info!("Starting reaper");
    Ok(tokio::spawn(async move {
        while sigchld.recv().await.is_some() {
            let reaped = gate.sweep().await;
            if reaped > 0 {
                debug!(reaped, "reaped orphaned processes");
            }
        }
    }))
}

/// Collects every exited child without blocking.
fn reap_children() -> usize {
    let mut reaped = 0;
    loop {
        let mut status: libc::c_int = 0;
        // SAFETY: status is a valid out-pointer for the duration of the call.
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ECHILD) {
                warn!("waitpid failed: {}", err);
            }
            break;
        }
        if pid == 0 {
            break;
        }
        reaped += 1;
        if libc::WIFEXITED(status) {
            debug!(pid, code = libc::WEXITSTATUS(status), "reaped process");
        } else if libc::WIFSIGNALED(status) {
            debug!(pid, signal = libc::WTERMSIG(status), "reaped process");
        } else {
            debug!(pid, "reaped process");
        }
    }
    reaped
}
