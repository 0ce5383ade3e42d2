//! # magikcri
//!
//! **Node-Local Pod Sandbox and Container Lifecycle Daemon**
//!
//! This crate implements the core of a Kubernetes-style container runtime
//! interface: it admits pod sandboxes and their member containers, turns each
//! request into an OCI bundle, and hands the bundle to an OCI runtime. Pod
//! networking is delegated to CNI plugins; mandatory access control uses
//! SELinux labels, AppArmor profiles and seccomp filters when the host
//! supports them.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              Server                                 │
//! │   run_pod_sandbox │ create_container │ start/stop/remove │ status   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐          ┌──────────────────────────┐     │
//! │  │   IdentityRegistry   │          │        StateStore        │     │
//! │  │  NameRegistrar ×2    │          │  sandboxes │ containers  │     │
//! │  │  TruncIndex ×2       │          │  membership              │     │
//! │  └──────────────────────┘          └──────────────────────────┘     │
//! │                  Rollback (per request compensation)                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                          Collaborators                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌─────────┐  │
//! │  │RuntimeStorage│  │  OciRuntime  │  │NetworkPlugin │  │Security │  │
//! │  │DirectoryStore│  │ RuncRuntime  │  │  CniPlugin   │  │ Context │  │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └─────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Sandbox Lifecycle
//!
//! ```text
//!   run_pod_sandbox ──► Ready ──► stop_pod_sandbox ──► NotReady
//!                                                        │
//!                                   remove_pod_sandbox ◄─┘
//! ```
//!
//! A sandbox is Ready while its infra container runs. Member containers join
//! the infra container's IPC and network namespaces.
//!
//! # Restart Recovery
//!
//! Every sandbox and container is persisted as a storage record plus an OCI
//! `config.json` carrying `io.magikcri.*` annotations. [`Server::new`] rebuilds
//! all in-memory state from those annotations before it returns.
//!
//! # Example
//!
//! ```rust,ignore
//! use magikcri::{Config, ReapGate, Server};
//! use magikcri::cri::{PodSandboxConfig, PodSandboxMetadata};
//!
//! #[tokio::main]
//! async fn main() -> magikcri::Result<()> {
//!     let server = Server::new(Config::default(), ReapGate::new()).await?;
//!     let config = PodSandboxConfig {
//!         metadata: PodSandboxMetadata {
//!             name: "web".into(),
//!             namespace: "default".into(),
//!             uid: "u1".into(),
//!             attempt: 0,
//!         },
//!         ..Default::default()
//!     };
//!     let id = server.run_pod_sandbox(&config).await?;
//!     println!("sandbox {}", id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod container;
pub mod cri;
pub mod error;
pub mod identity;
pub mod network;
pub mod platform;
pub mod reaper;
pub mod runtime;
pub mod sandbox;
pub mod security;
pub mod server;
pub mod spec;
pub mod state;
pub mod storage;

pub mod runtimes;

// Re-exports
pub use config::Config;
pub use constants::*;
pub use container::Container;
pub use error::{Error, Result};
pub use identity::{IdentityRegistry, NameRegistrar, TruncIndex};
pub use network::{CniPlugin, NetworkPlugin, PodNetwork};
pub use platform::{Capability, Platform};
pub use reaper::ReapGate;
pub use runtime::{ContainerStatus, OciRuntime, OciState, Signal};
pub use runtimes::RuncRuntime;
pub use sandbox::Sandbox;
pub use security::SecurityContext;
pub use server::{RestoreSummary, Server};
pub use state::StateStore;
pub use storage::{ContainerInfo, DirectoryStore, RuntimeContainerMetadata, RuntimeStorage};
