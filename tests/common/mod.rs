//! Shared fixtures: an in-memory OCI runtime, a recording network plugin and
//! a server over a temporary storage root.

#![allow(dead_code)]

use async_trait::async_trait;
use magikcri::cri::{
    ContainerConfig, ContainerMetadata, ImageSpec, PodSandboxConfig, PodSandboxMetadata,
};
use magikcri::security::SecurityContext;
use magikcri::{
    Config, Container, ContainerStatus, DirectoryStore, Error, NetworkPlugin, OciRuntime,
    OciState, PodNetwork, Result, Server, Signal,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// =============================================================================
// Mock Runtime
// =============================================================================

/// Keeps container states in memory; processes never exist.
#[derive(Default)]
pub struct MockRuntime {
    states: Mutex<HashMap<String, OciState>>,
    next_pid: AtomicU32,
    pub starts: AtomicUsize,
    pub fail_create: AtomicBool,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(1000),
            ..Default::default()
        })
    }

    pub fn status_of(&self, id: &str) -> Option<ContainerStatus> {
        self.states.lock().unwrap().get(id).map(|s| s.status)
    }

    /// Simulates the container's process exiting on its own.
    pub fn exit(&self, id: &str) {
        if let Some(state) = self.states.lock().unwrap().get_mut(id) {
            state.status = ContainerStatus::Stopped;
            state.pid = 0;
        }
    }

    fn missing(id: &str) -> Error {
        Error::StatusFailed {
            id: id.to_string(),
            reason: "container does not exist".to_string(),
        }
    }
}

#[async_trait]
impl OciRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    async fn version(&self) -> Result<String> {
        Ok("mock version 1.0.0".to_string())
    }

    async fn create_container(&self, container: &Container) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::CreateFailed {
                id: container.id().to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.states.lock().unwrap().insert(
            container.id().to_string(),
            OciState {
                oci_version: "1.0.0".to_string(),
                id: container.id().to_string(),
                status: ContainerStatus::Created,
                pid,
                bundle: container.bundle_dir().display().to_string(),
                created: None,
                annotations: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn start_container(&self, container: &Container) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(container.id())
            .ok_or_else(|| Self::missing(container.id()))?;
        state.status = ContainerStatus::Running;
        Ok(())
    }

    async fn state(&self, container: &Container) -> Result<OciState> {
        self.states
            .lock()
            .unwrap()
            .get(container.id())
            .cloned()
            .ok_or_else(|| Self::missing(container.id()))
    }

    async fn kill_container(&self, container: &Container, _signal: Signal) -> Result<()> {
        self.exit(container.id());
        Ok(())
    }

    async fn delete_container(&self, container: &Container) -> Result<()> {
        self.states.lock().unwrap().remove(container.id());
        Ok(())
    }
}

// =============================================================================
// Mock Network
// =============================================================================

/// Hands out a fixed address and counts calls.
#[derive(Default)]
pub struct MockNetwork {
    pub set_ups: AtomicUsize,
    pub tear_downs: AtomicUsize,
    pub fail_set_up: AtomicBool,
}

pub const POD_IP: &str = "10.88.0.7";

#[async_trait]
impl NetworkPlugin for MockNetwork {
    fn name(&self) -> &str {
        "mock"
    }

    async fn set_up_pod(&self, pod: &PodNetwork) -> Result<String> {
        self.set_ups.fetch_add(1, Ordering::SeqCst);
        if self.fail_set_up.load(Ordering::SeqCst) {
            return Err(Error::Network {
                id: pod.id.clone(),
                reason: "no addresses left".to_string(),
            });
        }
        Ok(POD_IP.to_string())
    }

    async fn tear_down_pod(&self, _pod: &PodNetwork) -> Result<()> {
        self.tear_downs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pod_network_status(&self, _pod: &PodNetwork) -> Result<Option<String>> {
        Ok(None)
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub runtime: Arc<MockRuntime>,
    pub network: Arc<MockNetwork>,
    pub server: Server,
}

pub fn test_config(dir: &TempDir) -> Config {
    let host_resolv = dir.path().join("host-resolv.conf");
    if !host_resolv.exists() {
        std::fs::write(&host_resolv, "nameserver 192.0.2.53\n").unwrap();
    }
    let mut config = Config::default();
    config.storage.root = dir.path().join("root");
    config.storage.run_root = dir.path().join("run");
    config.storage.log_dir = dir.path().join("logs");
    config.network.host_resolv_conf = host_resolv;
    config
}

/// Builds a server over `dir`, sharing `runtime` so that a second server on
/// the same directory sees the containers the first one created.
pub async fn server_with(
    dir: &TempDir,
    runtime: Arc<MockRuntime>,
    network: Arc<MockNetwork>,
    security: SecurityContext,
) -> Server {
    let config = test_config(dir);
    let storage = Arc::new(
        DirectoryStore::with_paths(config.storage.root.clone(), config.storage.run_root.clone())
            .unwrap(),
    );
    Server::with_components(config, storage, runtime, network, security)
        .await
        .unwrap()
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_security(SecurityContext::disabled()).await
    }

    pub async fn with_security(security: SecurityContext) -> Self {
        let dir = TempDir::new().unwrap();
        let runtime = MockRuntime::new();
        let network = Arc::new(MockNetwork::default());
        let server = server_with(&dir, runtime.clone(), network.clone(), security).await;
        Self {
            dir,
            runtime,
            network,
            server,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

pub fn pod_config(name: &str) -> PodSandboxConfig {
    PodSandboxConfig {
        metadata: PodSandboxMetadata {
            name: name.to_string(),
            uid: "u1".to_string(),
            namespace: "default".to_string(),
            attempt: 0,
        },
        labels: HashMap::from([("app".to_string(), name.to_string())]),
        annotations: HashMap::from([("owner".to_string(), "team-a".to_string())]),
        ..Default::default()
    }
}

pub fn host_network_pod_config(name: &str) -> PodSandboxConfig {
    let mut config = pod_config(name);
    config.linux.namespace_options.host_network = true;
    config
}

pub fn container_config(name: &str) -> ContainerConfig {
    ContainerConfig {
        metadata: ContainerMetadata {
            name: name.to_string(),
            attempt: 0,
        },
        image: ImageSpec::new("docker.io/library/busybox:latest"),
        command: vec!["sleep".to_string()],
        args: vec!["3600".to_string()],
        labels: HashMap::from([("tier".to_string(), "backend".to_string())]),
        ..Default::default()
    }
}
