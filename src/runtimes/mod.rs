//! OCI runtime implementations.
//!
//! The daemon talks to exactly one runtime, chosen by configuration. Each
//! implementation handles single-container operations without pod awareness;
//! pod semantics come from the namespace paths written into each bundle.

pub mod runc;

pub use self::runc::RuncRuntime;

use crate::config::Config;
use crate::reaper::ReapGate;
use crate::runtime::OciRuntime;
use std::sync::Arc;
use tracing::info;

/// Builds the configured runtime.
pub fn from_config(config: &Config, gate: ReapGate) -> Arc<dyn OciRuntime> {
    let runtime = RuncRuntime::new(
        config.runtime.runtime_path.clone(),
        config.runtime.runtime_root.clone(),
        gate,
    );
    info!("using OCI runtime {}", runtime.path().display());
    Arc::new(runtime)
}
