//! Daemon configuration.
//!
//! Read from a TOML file with one table per concern. Every key is optional;
//! missing keys take the compiled-in defaults from [`crate::constants`].
//!
//! ```toml
//! [storage]
//! root = "/var/lib/magikcri"
//! run_root = "/var/run/magikcri"
//!
//! [runtime]
//! runtime_path = "/usr/bin/runc"
//! selinux = true
//!
//! [network]
//! network_dir = "/etc/cni/net.d/"
//! plugin_dirs = ["/opt/cni/bin/"]
//! ```

use crate::constants::{
    DEFAULT_APPARMOR_PROFILE, DEFAULT_BIND_ADDRESS, DEFAULT_CNI_CONFIG_DIR,
    DEFAULT_CNI_PLUGIN_DIR, DEFAULT_CONFIG_FILE, DEFAULT_LOG_DIR, DEFAULT_PAUSE_COMMAND,
    DEFAULT_PAUSE_IMAGE, DEFAULT_ROOT, DEFAULT_RUN_ROOT, DEFAULT_RUNTIME_PATH,
    DEFAULT_RUNTIME_ROOT, DEFAULT_SECCOMP_PROFILE, HOST_RESOLV_CONF,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Sections
// =============================================================================

/// Where sandbox and container state lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable state (container records, bundles, root filesystems).
    pub root: PathBuf,
    /// Volatile state, recreated on demand.
    pub run_root: PathBuf,
    /// Default parent for pod log directories.
    pub log_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.into(),
            run_root: DEFAULT_RUN_ROOT.into(),
            log_dir: DEFAULT_LOG_DIR.into(),
        }
    }
}

/// OCI runtime and security defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// OCI runtime binary.
    pub runtime_path: PathBuf,
    /// State directory passed to the runtime with `--root`.
    pub runtime_root: PathBuf,
    /// Enable SELinux labelling when the host supports it.
    pub selinux: bool,
    /// Docker-format seccomp profile applied for `runtime/default`.
    pub seccomp_profile: PathBuf,
    /// AppArmor profile applied for `runtime/default`.
    pub apparmor_profile: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtime_path: DEFAULT_RUNTIME_PATH.into(),
            runtime_root: DEFAULT_RUNTIME_ROOT.into(),
            selinux: false,
            seccomp_profile: DEFAULT_SECCOMP_PROFILE.into(),
            apparmor_profile: DEFAULT_APPARMOR_PROFILE.to_string(),
        }
    }
}

/// Infra container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub pause_image: String,
    pub pause_command: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            pause_image: DEFAULT_PAUSE_IMAGE.to_string(),
            pause_command: DEFAULT_PAUSE_COMMAND.to_string(),
        }
    }
}

/// CNI plugin locations and the host address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Directory holding CNI network configurations.
    pub network_dir: PathBuf,
    /// Directories searched for CNI plugin binaries, in order.
    pub plugin_dirs: Vec<PathBuf>,
    /// Host address, reported as the IP of host-network sandboxes.
    pub bind_address: String,
    /// Resolver file copied into sandboxes that bring no DNS settings.
    pub host_resolv_conf: PathBuf,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network_dir: DEFAULT_CNI_CONFIG_DIR.into(),
            plugin_dirs: vec![DEFAULT_CNI_PLUGIN_DIR.into()],
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            host_resolv_conf: HOST_RESOLV_CONF.into(),
        }
    }
}

// =============================================================================
// Config
// =============================================================================

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub runtime: RuntimeConfig,
    pub image: ImageConfig,
    pub network: NetworkConfig,
}

impl Config {
    /// System-wide configuration file, or `~/.config/magikcri/magikcri.toml`
    /// when that exists and the system file does not.
    pub fn default_path() -> PathBuf {
        let system = PathBuf::from(DEFAULT_CONFIG_FILE);
        if system.exists() {
            return system;
        }
        dirs::config_dir()
            .map(|dir| dir.join("magikcri").join("magikcri.toml"))
            .filter(|user| user.exists())
            .unwrap_or(system)
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&content).map_err(|reason| Error::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses TOML text.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("[runtime]\nselinux = true\n").unwrap();
        assert!(config.runtime.selinux);
        assert_eq!(config.runtime.runtime_path, PathBuf::from(DEFAULT_RUNTIME_PATH));
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(Config::parse("[runtime]\nselinux = \"maybe\"\n").is_err());
    }
}
