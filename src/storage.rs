//! # Container Record Storage
//!
//! Durable and ephemeral directories for every sandbox and container, plus
//! the metadata record reconciliation enumerates at startup.
//!
//! ## Storage Model
//!
//! ```text
//! <root>/containers/
//! └── <id>/
//!     ├── metadata.json   (StoredRecord: name, image, RuntimeContainerMetadata)
//!     ├── userdata/       (durable dir: config.json)
//!     └── rootfs/         (mount point handed to the runtime)
//!
//! <run_root>/containers/
//! └── <id>/
//!     └── userdata/       (run dir: config.json, resolv.conf)
//! ```
//!
//! Record names are unique across the store. Creating a record with a name
//! already in use fails with [`Error::DuplicateName`] before anything is
//! written to disk.
//!
//! ## Atomic Writes
//!
//! `metadata.json` is written to a temp file and renamed into place, so a
//! crash leaves either the old or the new record, never a partial one.
//!
//! ## Mounting
//!
//! Image layering is outside this store: "mounting" materializes the
//! `rootfs/` directory and marks the record mounted. Mounting an already
//! mounted record returns the same path.

use crate::constants::SPEC_FILE;
use crate::error::{Error, Result};
use crate::spec::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const CONTAINERS_DIR: &str = "containers";
const RECORD_FILE: &str = "metadata.json";
const USERDATA_DIR: &str = "userdata";
const ROOTFS_DIR: &str = "rootfs";

// =============================================================================
// Record Types
// =============================================================================

/// Daemon-level metadata attached to each storage record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeContainerMetadata {
    /// True for a pod sandbox (infra container) record.
    pub pod: bool,
    pub pod_name: String,
    pub pod_id: String,
    pub image_name: String,
    /// Final container name, used as the record name.
    pub container_name: String,
    /// Name from the request metadata.
    pub metadata_name: String,
    pub uid: String,
    pub namespace: String,
    pub attempt: u32,
    pub mount_label: String,
}

/// Directories allocated for a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    /// Durable directory.
    pub dir: PathBuf,
    /// Ephemeral run directory.
    pub run_dir: PathBuf,
}

impl ContainerInfo {
    /// Durable spec path.
    pub fn spec_path(&self) -> PathBuf {
        self.dir.join(SPEC_FILE)
    }

    /// Runtime spec path.
    pub fn run_spec_path(&self) -> PathBuf {
        self.run_dir.join(SPEC_FILE)
    }
}

/// On-disk record file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    name: String,
    created: DateTime<Utc>,
    #[serde(default)]
    mounted: bool,
    metadata: RuntimeContainerMetadata,
}

// =============================================================================
// Storage Trait
// =============================================================================

/// Storage collaborator used by the orchestrators and reconciliation.
pub trait RuntimeStorage: Send + Sync {
    /// Allocates a pod sandbox record. Duplicate names fail with
    /// [`Error::DuplicateName`].
    fn create_pod_sandbox(&self, metadata: &RuntimeContainerMetadata, id: &str)
    -> Result<ContainerInfo>;

    /// Allocates a container record. Duplicate names fail with
    /// [`Error::DuplicateName`].
    fn create_container(&self, metadata: &RuntimeContainerMetadata, id: &str)
    -> Result<ContainerInfo>;

    /// Mounts the record's root filesystem and returns the mount point.
    /// Idempotent.
    fn start_container(&self, id: &str) -> Result<PathBuf>;

    /// Unmounts the record's root filesystem. Idempotent.
    fn stop_container(&self, id: &str) -> Result<()>;

    /// Durable directory of a record, by id or name.
    fn work_dir(&self, id_or_name: &str) -> Result<PathBuf>;

    /// Run directory of a record, by id or name.
    fn run_dir(&self, id_or_name: &str) -> Result<PathBuf>;

    fn container_metadata(&self, id: &str) -> Result<RuntimeContainerMetadata>;

    fn set_container_metadata(&self, id: &str, metadata: &RuntimeContainerMetadata) -> Result<()>;

    /// Removes a container record and both of its directories.
    fn delete_container(&self, id: &str) -> Result<()>;

    /// Removes a pod sandbox record and both of its directories.
    fn remove_pod_sandbox(&self, id: &str) -> Result<()>;

    /// Ids of every record.
    fn containers(&self) -> Result<Vec<String>>;
}

// =============================================================================
// Directory Store
// =============================================================================

/// [`RuntimeStorage`] backed by plain directories.
///
/// ## Thread Safety
///
/// Name reservation and record creation for one name are serialized by an
/// internal mutex; directory I/O for distinct records runs concurrently.
pub struct DirectoryStore {
    root: PathBuf,
    run_root: PathBuf,
    /// Record name → id.
    names: Mutex<HashMap<String, String>>,
}

impl DirectoryStore {
    /// Opens the store, creating both roots and indexing existing records.
    pub fn with_paths(root: PathBuf, run_root: PathBuf) -> Result<Self> {
        for dir in [root.join(CONTAINERS_DIR), run_root.join(CONTAINERS_DIR)] {
            fs::create_dir_all(&dir).map_err(|e| Error::StorageInitFailed {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        }

        let store = Self {
            root,
            run_root,
            names: Mutex::new(HashMap::new()),
        };
        let mut names = HashMap::new();
        for id in store.containers()? {
            match store.read_record(&id) {
                Ok(record) => {
                    names.insert(record.name, record.id);
                }
                Err(e) => warn!("ignoring unreadable storage record {}: {}", id, e),
            }
        }
        info!(
            "Container storage initialized at {} ({} records)",
            store.root.display(),
            names.len()
        );
        *store.lock_names() = names;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    fn lock_names(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_dir(&self, id: &str) -> PathBuf {
        self.root.join(CONTAINERS_DIR).join(id)
    }

    fn run_record_dir(&self, id: &str) -> PathBuf {
        self.run_root.join(CONTAINERS_DIR).join(id)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.record_dir(id).join(RECORD_FILE)
    }

    fn check_id(id: &str) -> Result<()> {
        if id.is_empty()
            || id.contains('/')
            || id == "."
            || id == ".."
            || id.contains('\0')
        {
            return Err(Error::Validation(format!("invalid storage id {:?}", id)));
        }
        Ok(())
    }

    fn storage_err(operation: &str, id: &str, e: impl std::fmt::Display) -> Error {
        Error::Storage {
            operation: operation.to_string(),
            id: id.to_string(),
            reason: e.to_string(),
        }
    }

    fn read_record(&self, id: &str) -> Result<StoredRecord> {
        Self::check_id(id)?;
        let path = self.record_path(id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::RecordNotFound(id.to_string()));
            }
            Err(e) => return Err(Self::storage_err("read", id, e)),
        };
        serde_json::from_slice(&data).map_err(|e| Self::storage_err("decode", id, e))
    }

    fn write_record(&self, record: &StoredRecord) -> Result<()> {
        let data = serde_json::to_vec_pretty(record)
            .map_err(|e| Self::storage_err("encode", &record.id, e))?;
        write_atomic(&self.record_path(&record.id), &data)
            .map_err(|e| Self::storage_err("write", &record.id, e))
    }

    fn resolve(&self, id_or_name: &str) -> Result<String> {
        if let Some(id) = self.lock_names().get(id_or_name) {
            return Ok(id.clone());
        }
        Self::check_id(id_or_name)?;
        if self.record_path(id_or_name).exists() {
            Ok(id_or_name.to_string())
        } else {
            Err(Error::RecordNotFound(id_or_name.to_string()))
        }
    }

    fn create_record(&self, metadata: RuntimeContainerMetadata, id: &str) -> Result<ContainerInfo> {
        Self::check_id(id)?;
        if metadata.container_name.is_empty() {
            return Err(Error::Validation("record name cannot be empty".to_string()));
        }
        if metadata.image_name.is_empty() {
            return Err(Error::Validation("record image cannot be empty".to_string()));
        }
        if metadata.pod_id.is_empty() || metadata.pod_name.is_empty() {
            return Err(Error::Validation(
                "record must name its pod sandbox".to_string(),
            ));
        }
        let name = metadata.container_name.clone();

        {
            let mut names = self.lock_names();
            if names.contains_key(&name) {
                return Err(Error::DuplicateName(name));
            }
            if names.values().any(|existing| existing == id) || self.record_dir(id).exists() {
                return Err(Error::IdConflict(id.to_string()));
            }
            names.insert(name.clone(), id.to_string());
        }

        let info = ContainerInfo {
            id: id.to_string(),
            dir: self.record_dir(id).join(USERDATA_DIR),
            run_dir: self.run_record_dir(id).join(USERDATA_DIR),
        };
        let record = StoredRecord {
            id: id.to_string(),
            name: name.clone(),
            created: Utc::now(),
            mounted: false,
            metadata,
        };

        let result = fs::create_dir_all(&info.dir)
            .and_then(|_| fs::create_dir_all(&info.run_dir))
            .map_err(|e| Self::storage_err("create", id, e))
            .and_then(|_| self.write_record(&record));
        if let Err(e) = result {
            self.lock_names().remove(&name);
            let _ = fs::remove_dir_all(self.record_dir(id));
            let _ = fs::remove_dir_all(self.run_record_dir(id));
            return Err(e);
        }

        debug!("Created storage record {} ({})", name, id);
        Ok(info)
    }

    fn delete_record(&self, id: &str) -> Result<()> {
        let record = self.read_record(id)?;
        for dir in [self.run_record_dir(id), self.record_dir(id)] {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Self::storage_err("delete", id, e)),
            }
        }
        self.lock_names().remove(&record.name);
        debug!("Deleted storage record {} ({})", record.name, id);
        Ok(())
    }
}

impl RuntimeStorage for DirectoryStore {
    fn create_pod_sandbox(
        &self,
        metadata: &RuntimeContainerMetadata,
        id: &str,
    ) -> Result<ContainerInfo> {
        let mut metadata = metadata.clone();
        metadata.pod = true;
        self.create_record(metadata, id)
    }

    fn create_container(
        &self,
        metadata: &RuntimeContainerMetadata,
        id: &str,
    ) -> Result<ContainerInfo> {
        let mut metadata = metadata.clone();
        metadata.pod = false;
        self.create_record(metadata, id)
    }

    fn start_container(&self, id: &str) -> Result<PathBuf> {
        let mut record = self.read_record(id)?;
        let rootfs = self.record_dir(id).join(ROOTFS_DIR);
        fs::create_dir_all(&rootfs).map_err(|e| Self::storage_err("mount", id, e))?;
        if !record.mounted {
            record.mounted = true;
            self.write_record(&record)?;
            debug!("Mounted {} at {}", id, rootfs.display());
        }
        Ok(rootfs)
    }

    fn stop_container(&self, id: &str) -> Result<()> {
        let mut record = self.read_record(id)?;
        if record.mounted {
            record.mounted = false;
            self.write_record(&record)?;
            debug!("Unmounted {}", id);
        }
        Ok(())
    }

    fn work_dir(&self, id_or_name: &str) -> Result<PathBuf> {
        let id = self.resolve(id_or_name)?;
        Ok(self.record_dir(&id).join(USERDATA_DIR))
    }

    fn run_dir(&self, id_or_name: &str) -> Result<PathBuf> {
        let id = self.resolve(id_or_name)?;
        let dir = self.run_record_dir(&id).join(USERDATA_DIR);
        // The run root may be a tmpfs that was wiped by a reboot.
        fs::create_dir_all(&dir).map_err(|e| Self::storage_err("rundir", &id, e))?;
        Ok(dir)
    }

    fn container_metadata(&self, id: &str) -> Result<RuntimeContainerMetadata> {
        Ok(self.read_record(id)?.metadata)
    }

    fn set_container_metadata(&self, id: &str, metadata: &RuntimeContainerMetadata) -> Result<()> {
        let mut record = self.read_record(id)?;
        record.metadata = metadata.clone();
        self.write_record(&record)
    }

    fn delete_container(&self, id: &str) -> Result<()> {
        self.delete_record(id)
    }

    fn remove_pod_sandbox(&self, id: &str) -> Result<()> {
        let record = self.read_record(id)?;
        if !record.metadata.pod {
            return Err(Error::Validation(format!(
                "storage record {} is not a pod sandbox",
                id
            )));
        }
        self.delete_record(id)
    }

    fn containers(&self) -> Result<Vec<String>> {
        let dir = self.root.join(CONTAINERS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::storage_err("list", &dir.display().to_string(), e)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.path().join(RECORD_FILE).is_file()
                && let Some(id) = entry.file_name().to_str()
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
