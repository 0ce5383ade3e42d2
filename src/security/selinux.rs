//! SELinux label allocation and relabeling.
//!
//! Each sandbox gets a unique MCS level (`s0:cX,cY`), shared by its process
//! label and its mount label. Levels are reserved in-process so two live
//! sandboxes never share one; reconciliation re-reserves the levels of
//! restored sandboxes.

use crate::error::{Error, Result};
use rand::Rng;
use std::collections::HashSet;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

const SELINUX_FS: &str = "/sys/fs/selinux";
const XATTR_NAME: &str = "security.selinux";
const PROCESS_CONTEXT: &str = "system_u:system_r:container_t";
const FILE_CONTEXT: &str = "system_u:object_r:container_file_t";
const MCS_CATEGORIES: u32 = 1024;

/// Directories that must never be relabeled.
const PROTECTED_PATHS: &[&str] = &[
    "/", "/bin", "/boot", "/dev", "/etc", "/home", "/lib", "/lib64", "/media", "/opt", "/proc",
    "/root", "/run", "/sbin", "/srv", "/sys", "/tmp", "/usr", "/var",
];

/// SELinux state of the host plus the set of MCS levels in use.
#[derive(Debug, Default)]
pub struct SeLinux {
    enabled: bool,
    levels: Mutex<HashSet<String>>,
}

impl SeLinux {
    /// Probes the host: enabled when selinuxfs is mounted.
    pub fn detect() -> Self {
        Self::new(Path::new(SELINUX_FS).join("enforce").exists())
    }

    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            levels: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `(process_label, mount_label)` for a new sandbox.
    ///
    /// With an explicit `user:role:type:level` label its level is reserved
    /// and reused for the mount label; otherwise a fresh level is allocated.
    /// Both labels are empty when SELinux is disabled.
    pub fn init_labels(&self, process_label: Option<&str>) -> Result<(String, String)> {
        if !self.enabled {
            return Ok((String::new(), String::new()));
        }

        if let Some(label) = process_label.filter(|l| !l.is_empty()) {
            let level = label_level(label)?;
            self.reserve_level(level);
            return Ok((label.to_string(), format!("{}:{}", FILE_CONTEXT, level)));
        }

        let level = self.allocate_level();
        debug!("allocated SELinux level {}", level);
        Ok((
            format!("{}:{}", PROCESS_CONTEXT, level),
            format!("{}:{}", FILE_CONTEXT, level),
        ))
    }

    /// Marks the level of `label` as in use.
    pub fn reserve_label(&self, label: &str) -> Result<()> {
        if !self.enabled || label.is_empty() {
            return Ok(());
        }
        self.reserve_level(label_level(label)?);
        Ok(())
    }

    /// Frees the level of `label`.
    pub fn release_label(&self, label: &str) {
        if let Ok(level) = label_level(label) {
            self.levels
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(level);
        }
    }

    /// Returns true if the level of `label` is reserved.
    pub fn is_reserved(&self, label: &str) -> bool {
        label_level(label)
            .map(|level| {
                self.levels
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .contains(level)
            })
            .unwrap_or(false)
    }

    fn reserve_level(&self, level: &str) {
        self.levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(level.to_string());
    }

    fn allocate_level(&self) -> String {
        let mut rng = rand::rng();
        let mut levels = self.levels.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let a = rng.random_range(0..MCS_CATEGORIES);
            let b = rng.random_range(0..MCS_CATEGORIES);
            if a == b {
                continue;
            }
            let level = format!("s0:c{},c{}", a.min(b), a.max(b));
            if levels.insert(level.clone()) {
                return level;
            }
        }
    }

    /// Recursively applies `label` to `path`.
    ///
    /// `shared` drops the categories so every sandbox can read the content.
    /// A filesystem without xattr support fails with [`Error::Unsupported`],
    /// which callers may tolerate.
    pub fn relabel(&self, path: &Path, label: &str, shared: bool) -> Result<()> {
        if !self.enabled || label.is_empty() {
            return Ok(());
        }
        let canonical = path.canonicalize().map_err(|e| {
            Error::Security(format!("relabel of {} failed: {}", path.display(), e))
        })?;
        if PROTECTED_PATHS.iter().any(|p| canonical == Path::new(p)) {
            return Err(Error::Security(format!(
                "relabeling of system directory {} is not allowed",
                canonical.display()
            )));
        }

        let label = if shared {
            let level = label_level(label)?;
            format!("{}s0", &label[..label.len() - level.len()])
        } else {
            label.to_string()
        };
        relabel_tree(&canonical, &label)
    }
}

/// Returns the MLS/MCS level part of `user:role:type:level`.
fn label_level(label: &str) -> Result<&str> {
    let mut parts = label.splitn(4, ':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(_), Some(_), Some(level)) if !level.is_empty() => Ok(level),
        _ => Err(Error::Security(format!("invalid SELinux label {:?}", label))),
    }
}

fn relabel_tree(path: &Path, label: &str) -> Result<()> {
    set_file_label(path, label)?;
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        for entry in std::fs::read_dir(path)? {
            relabel_tree(&entry?.path(), label)?;
        }
    }
    Ok(())
}

fn set_file_label(path: &Path, label: &str) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| Error::Security(format!("invalid path {}: {}", path.display(), e)))?;
    let c_name = CString::new(XATTR_NAME)
        .map_err(|e| Error::Internal(format!("invalid xattr name: {}", e)))?;
    let value = label.as_bytes();

    // SAFETY: all pointers come from live CStrings/slices for the duration of
    // the call and the size matches the value buffer.
    let rc = unsafe {
        libc::lsetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ENOTSUP) {
        return Err(Error::Unsupported(format!(
            "labels not supported on {}",
            path.display()
        )));
    }
    Err(Error::Security(format!(
        "setting label on {} failed: {}",
        path.display(),
        err
    )))
}
