//! CNI network plugin.
//!
//! Implements the CNI exec protocol: the network configuration is written to
//! the plugin's stdin, the request is described by `CNI_*` environment
//! variables, and the result (or a CNI error object) is read from stdout.
//!
//! ## Configuration
//!
//! The first file in lexical order in the network directory with a `.conf`,
//! `.json` or `.conflist` extension is used. Single-plugin files are treated
//! as a list of one. The directory is re-read on every request, so networks
//! installed after the daemon started are picked up.
//!
//! ## Ordering
//!
//! `ADD` runs the plugins in list order, feeding each one the previous
//! plugin's result as `prevResult`. `DEL` runs them in reverse.

use super::{NetworkPlugin, PodNetwork};
use crate::error::{Error, Result};
use crate::reaper::ReapGate;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Interface created inside the pod's network namespace.
const POD_INTERFACE: &str = "eth0";

const CONFIG_EXTENSIONS: &[&str] = &["conf", "conflist", "json"];

/// A network configuration list.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkList {
    pub name: String,
    pub cni_version: String,
    pub plugins: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawList {
    name: String,
    #[serde(default)]
    cni_version: String,
    plugins: Vec<Value>,
}

/// Error object printed by a failing plugin.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PluginError {
    code: u32,
    msg: String,
    details: String,
}

impl NetworkList {
    /// Parses a `.conflist` file or a single-plugin `.conf`/`.json` file.
    pub fn parse(path: &Path, data: &[u8]) -> Result<Self> {
        let invalid = |reason: String| Error::Config {
            path: path.to_path_buf(),
            reason,
        };
        if path.extension().is_some_and(|ext| ext == "conflist") {
            let raw: RawList = serde_json::from_slice(data).map_err(|e| invalid(e.to_string()))?;
            if raw.plugins.is_empty() {
                return Err(invalid("network list has no plugins".to_string()));
            }
            return Ok(Self {
                name: raw.name,
                cni_version: raw.cni_version,
                plugins: raw.plugins,
            });
        }

        let plugin: Value = serde_json::from_slice(data).map_err(|e| invalid(e.to_string()))?;
        let name = plugin
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("network config has no name".to_string()))?
            .to_string();
        let cni_version = plugin
            .get("cniVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            name,
            cni_version,
            plugins: vec![plugin],
        })
    }
}

/// Extracts the pod address from a plugin result, without the prefix length.
///
/// Understands both the 0.3+ `ips` list and the 0.2 `ip4` object.
pub fn result_ip(result: &Value) -> Option<String> {
    let address = result
        .get("ips")
        .and_then(Value::as_array)
        .and_then(|ips| ips.iter().find_map(|ip| ip.get("address")?.as_str()))
        .or_else(|| result.get("ip4")?.get("ip")?.as_str())?;
    let ip = address.split('/').next().unwrap_or(address);
    (!ip.is_empty()).then(|| ip.to_string())
}

/// CNI exec-protocol client.
#[derive(Debug)]
pub struct CniPlugin {
    network_dir: PathBuf,
    plugin_dirs: Vec<PathBuf>,
    gate: ReapGate,
    addresses: Mutex<HashMap<String, String>>,
}

impl CniPlugin {
    pub fn new(network_dir: PathBuf, plugin_dirs: Vec<PathBuf>, gate: ReapGate) -> Self {
        Self {
            network_dir,
            plugin_dirs,
            gate,
            addresses: Mutex::new(HashMap::new()),
        }
    }

    /// Loads the default network from the configuration directory.
    pub fn load_network(&self) -> Result<NetworkList> {
        let entries = std::fs::read_dir(&self.network_dir).map_err(|e| Error::Config {
            path: self.network_dir.clone(),
            reason: e.to_string(),
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| CONFIG_EXTENSIONS.contains(&ext))
            })
            .collect();
        files.sort();

        let path = files.into_iter().next().ok_or_else(|| Error::Config {
            path: self.network_dir.clone(),
            reason: "no CNI network configuration found".to_string(),
        })?;
        let data = std::fs::read(&path).map_err(|e| Error::Config {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        NetworkList::parse(&path, &data)
    }

    fn find_plugin(&self, plugin_type: &str) -> Option<PathBuf> {
        self.plugin_dirs
            .iter()
            .map(|dir| dir.join(plugin_type))
            .find(|path| path.is_file())
    }

    fn cni_path(&self) -> String {
        self.plugin_dirs
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Runs one plugin binary and returns its parsed stdout for `ADD`.
    async fn exec_plugin(
        &self,
        command: &str,
        network: &NetworkList,
        plugin: &Value,
        prev_result: Option<&Value>,
        pod: &PodNetwork,
    ) -> Result<Option<Value>> {
        let network_err = |reason: String| Error::Network {
            id: pod.id.clone(),
            reason,
        };

        let plugin_type = plugin
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| network_err(format!("plugin in network {} has no type", network.name)))?;
        let binary = self.find_plugin(plugin_type).ok_or_else(|| {
            network_err(format!(
                "CNI plugin {} not found in {}",
                plugin_type,
                self.cni_path()
            ))
        })?;

        let mut conf = plugin.clone();
        if let Some(obj) = conf.as_object_mut() {
            obj.insert("name".to_string(), Value::String(network.name.clone()));
            obj.insert(
                "cniVersion".to_string(),
                Value::String(network.cni_version.clone()),
            );
            if let Some(prev) = prev_result {
                obj.insert("prevResult".to_string(), prev.clone());
            }
        }
        let stdin = serde_json::to_vec(&conf)?;

        let cni_args = format!(
            "IgnoreUnknown=1;K8S_POD_NAMESPACE={};K8S_POD_NAME={};K8S_POD_INFRA_CONTAINER_ID={}",
            pod.namespace, pod.name, pod.infra_container_id
        );
        debug!(
            sandbox = %pod.id,
            plugin = plugin_type,
            "CNI {}", command
        );

        let _exec = self.gate.exec().await;
        let mut child = tokio::process::Command::new(&binary)
            .env("CNI_COMMAND", command)
            .env("CNI_CONTAINERID", &pod.id)
            .env("CNI_NETNS", &pod.netns)
            .env("CNI_IFNAME", POD_INTERFACE)
            .env("CNI_PATH", self.cni_path())
            .env("CNI_ARGS", cni_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| network_err(format!("spawning {} failed: {}", binary.display(), e)))?;

        if let Some(mut input) = child.stdin.take() {
            input
                .write_all(&stdin)
                .await
                .map_err(|e| network_err(format!("writing config to {} failed: {}", plugin_type, e)))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| network_err(format!("waiting for {} failed: {}", plugin_type, e)))?;

        if !output.status.success() {
            let reason = match serde_json::from_slice::<PluginError>(&output.stdout) {
                Ok(err) if !err.msg.is_empty() => {
                    format!("{} (code {}): {} {}", plugin_type, err.code, err.msg, err.details)
                }
                _ => format!(
                    "{} exited with {}: {}",
                    plugin_type,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            };
            return Err(network_err(reason));
        }

        if command != "ADD" {
            return Ok(None);
        }
        let result: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| network_err(format!("invalid result from {}: {}", plugin_type, e)))?;
        Ok(Some(result))
    }

    async fn del(&self, network: &NetworkList, pod: &PodNetwork) -> Result<()> {
        let mut first_err = None;
        for plugin in network.plugins.iter().rev() {
            if let Err(e) = self.exec_plugin("DEL", network, plugin, None, pod).await {
                warn!(sandbox = %pod.id, "CNI DEL failed: {}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl NetworkPlugin for CniPlugin {
    fn name(&self) -> &str {
        "cni"
    }

    async fn set_up_pod(&self, pod: &PodNetwork) -> Result<String> {
        if pod.netns.as_os_str().is_empty() {
            return Err(Error::Network {
                id: pod.id.clone(),
                reason: "infra container has no network namespace".to_string(),
            });
        }
        let network = self.load_network()?;

        let mut prev: Option<Value> = None;
        for plugin in &network.plugins {
            match self
                .exec_plugin("ADD", &network, plugin, prev.as_ref(), pod)
                .await
            {
                Ok(result) => prev = result,
                Err(e) => {
                    if let Err(del_err) = self.del(&network, pod).await {
                        warn!(sandbox = %pod.id, "cleanup after failed ADD failed: {}", del_err);
                    }
                    return Err(e);
                }
            }
        }

        let ip = prev.as_ref().and_then(result_ip).ok_or_else(|| Error::Network {
            id: pod.id.clone(),
            reason: format!("network {} returned no IP address", network.name),
        })?;
        self.addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pod.id.clone(), ip.clone());
        info!(sandbox = %pod.id, ip = %ip, "attached pod to network {}", network.name);
        Ok(ip)
    }

    async fn tear_down_pod(&self, pod: &PodNetwork) -> Result<()> {
        self.addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pod.id);
        let network = self.load_network()?;
        self.del(&network, pod).await
    }

    async fn pod_network_status(&self, pod: &PodNetwork) -> Result<Option<String>> {
        Ok(self
            .addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pod.id)
            .cloned())
    }
}
