//! Tests for the directory-backed record store.
//!
//! Validates record layout, name uniqueness, mount bookkeeping, lookup by
//! id or name, and re-indexing of existing records on reopen.

use magikcri::{DirectoryStore, Error, RuntimeContainerMetadata, RuntimeStorage, SPEC_FILE};
use tempfile::TempDir;

fn open(dir: &TempDir) -> DirectoryStore {
    DirectoryStore::with_paths(dir.path().join("root"), dir.path().join("run")).unwrap()
}

fn pod_metadata(name: &str, id: &str) -> RuntimeContainerMetadata {
    RuntimeContainerMetadata {
        pod_name: name.to_string(),
        pod_id: id.to_string(),
        image_name: "registry.k8s.io/pause:3.9".to_string(),
        container_name: format!("{}-infra", name),
        metadata_name: format!("{}-infra", name),
        uid: "u1".to_string(),
        namespace: "default".to_string(),
        ..Default::default()
    }
}

fn container_metadata(pod: &str, pod_id: &str, name: &str) -> RuntimeContainerMetadata {
    RuntimeContainerMetadata {
        pod_name: pod.to_string(),
        pod_id: pod_id.to_string(),
        image_name: "docker.io/library/busybox:latest".to_string(),
        container_name: format!("{}-{}-0", pod, name),
        metadata_name: name.to_string(),
        ..Default::default()
    }
}

// =============================================================================
// Store Creation Tests
// =============================================================================

#[test]
fn test_store_creates_roots() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    assert!(dir.path().join("root/containers").is_dir());
    assert!(dir.path().join("run/containers").is_dir());
    assert_eq!(store.root(), dir.path().join("root"));
    assert_eq!(store.run_root(), dir.path().join("run"));
    assert!(store.containers().unwrap().is_empty());
}

#[test]
fn test_store_init_fails_on_file_root() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("root");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let result = DirectoryStore::with_paths(blocker, dir.path().join("run"));
    assert!(matches!(result, Err(Error::StorageInitFailed { .. })));
}

// =============================================================================
// Record Creation Tests
// =============================================================================

#[test]
fn test_create_pod_sandbox_layout() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let info = store
        .create_pod_sandbox(&pod_metadata("web", "sb1"), "sb1")
        .unwrap();

    assert_eq!(info.id, "sb1");
    assert_eq!(info.dir, dir.path().join("root/containers/sb1/userdata"));
    assert_eq!(info.run_dir, dir.path().join("run/containers/sb1/userdata"));
    assert!(info.dir.is_dir());
    assert!(info.run_dir.is_dir());
    assert!(dir.path().join("root/containers/sb1/metadata.json").is_file());
    assert_eq!(info.spec_path(), info.dir.join(SPEC_FILE));
    assert_eq!(info.run_spec_path(), info.run_dir.join(SPEC_FILE));

    let metadata = store.container_metadata("sb1").unwrap();
    assert!(metadata.pod);
    assert_eq!(metadata.pod_name, "web");
    assert_eq!(store.containers().unwrap(), vec!["sb1".to_string()]);
}

#[test]
fn test_create_container_is_not_pod() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    // Callers cannot mark a plain container as a pod record.
    let mut metadata = container_metadata("web", "sb1", "app");
    metadata.pod = true;
    store.create_container(&metadata, "c1").unwrap();

    assert!(!store.container_metadata("c1").unwrap().pod);
}

#[test]
fn test_duplicate_name_rejected_before_write() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    store
        .create_container(&container_metadata("web", "sb1", "app"), "c1")
        .unwrap();
    let err = store
        .create_container(&container_metadata("web", "sb1", "app"), "c2")
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateName(ref name) if name == "web-app-0"));
    assert!(err.is_conflict());
    assert!(!dir.path().join("root/containers/c2").exists());
}

#[test]
fn test_duplicate_id_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    store
        .create_container(&container_metadata("web", "sb1", "app"), "c1")
        .unwrap();
    let err = store
        .create_container(&container_metadata("web", "sb1", "db"), "c1")
        .unwrap_err();

    assert!(matches!(err, Error::IdConflict(_)));
    // The rejected name stays free.
    store
        .create_container(&container_metadata("web", "sb1", "db"), "c2")
        .unwrap();
}

#[test]
fn test_create_requires_image_and_pod() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let mut no_image = container_metadata("web", "sb1", "app");
    no_image.image_name.clear();
    assert!(store.create_container(&no_image, "c1").unwrap_err().is_validation());

    let mut no_pod = container_metadata("web", "sb1", "app");
    no_pod.pod_id.clear();
    assert!(store.create_container(&no_pod, "c1").unwrap_err().is_validation());

    assert!(store.containers().unwrap().is_empty());
}

#[test]
fn test_create_rejects_traversal_id() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let err = store
        .create_container(&container_metadata("web", "sb1", "app"), "../escape")
        .unwrap_err();
    assert!(err.is_validation());
    assert!(!dir.path().join("root/escape").exists());
}

// =============================================================================
// Mount Tests
// =============================================================================

#[test]
fn test_start_container_mounts_rootfs() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store
        .create_container(&container_metadata("web", "sb1", "app"), "c1")
        .unwrap();

    let rootfs = store.start_container("c1").unwrap();
    assert_eq!(rootfs, dir.path().join("root/containers/c1/rootfs"));
    assert!(rootfs.is_dir());

    // Mounting again hands back the same path.
    assert_eq!(store.start_container("c1").unwrap(), rootfs);

    store.stop_container("c1").unwrap();
    store.stop_container("c1").unwrap();
}

#[test]
fn test_mount_unknown_record() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    assert!(matches!(
        store.start_container("missing"),
        Err(Error::RecordNotFound(_))
    ));
    assert!(matches!(
        store.stop_container("missing"),
        Err(Error::RecordNotFound(_))
    ));
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_work_and_run_dir_by_id_or_name() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let info = store
        .create_container(&container_metadata("web", "sb1", "app"), "c1")
        .unwrap();

    assert_eq!(store.work_dir("c1").unwrap(), info.dir);
    assert_eq!(store.work_dir("web-app-0").unwrap(), info.dir);
    assert_eq!(store.run_dir("web-app-0").unwrap(), info.run_dir);
    assert!(matches!(
        store.work_dir("nope"),
        Err(Error::RecordNotFound(_))
    ));
}

#[test]
fn test_run_dir_recreated_after_wipe() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let info = store
        .create_container(&container_metadata("web", "sb1", "app"), "c1")
        .unwrap();

    std::fs::remove_dir_all(dir.path().join("run/containers/c1")).unwrap();
    assert_eq!(store.run_dir("c1").unwrap(), info.run_dir);
    assert!(info.run_dir.is_dir());
}

#[test]
fn test_set_container_metadata() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store
        .create_pod_sandbox(&pod_metadata("web", "sb1"), "sb1")
        .unwrap();

    let mut metadata = store.container_metadata("sb1").unwrap();
    metadata.mount_label = "system_u:object_r:container_file_t:s0:c1,c2".to_string();
    store.set_container_metadata("sb1", &metadata).unwrap();

    assert_eq!(store.container_metadata("sb1").unwrap(), metadata);
}

// =============================================================================
// Deletion Tests
// =============================================================================

#[test]
fn test_delete_container_frees_name() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store
        .create_container(&container_metadata("web", "sb1", "app"), "c1")
        .unwrap();
    store.run_dir("c1").unwrap();

    store.delete_container("c1").unwrap();
    assert!(!dir.path().join("root/containers/c1").exists());
    assert!(!dir.path().join("run/containers/c1").exists());
    assert!(matches!(
        store.delete_container("c1"),
        Err(Error::RecordNotFound(_))
    ));

    store
        .create_container(&container_metadata("web", "sb1", "app"), "c2")
        .unwrap();
}

#[test]
fn test_remove_pod_sandbox_rejects_container_record() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store
        .create_pod_sandbox(&pod_metadata("web", "sb1"), "sb1")
        .unwrap();
    store
        .create_container(&container_metadata("web", "sb1", "app"), "c1")
        .unwrap();

    assert!(store.remove_pod_sandbox("c1").unwrap_err().is_validation());
    assert!(store.work_dir("c1").is_ok());

    store.remove_pod_sandbox("sb1").unwrap();
    assert_eq!(store.containers().unwrap(), vec!["c1".to_string()]);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_indexes_existing_names() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        store
            .create_pod_sandbox(&pod_metadata("web", "sb1"), "sb1")
            .unwrap();
        store
            .create_container(&container_metadata("web", "sb1", "app"), "c1")
            .unwrap();
    }

    let store = open(&dir);
    assert_eq!(
        store.containers().unwrap(),
        vec!["c1".to_string(), "sb1".to_string()]
    );
    assert_eq!(
        store.work_dir("web-app-0").unwrap(),
        dir.path().join("root/containers/c1/userdata")
    );
    assert!(matches!(
        store.create_container(&container_metadata("web", "sb1", "app"), "c9"),
        Err(Error::DuplicateName(_))
    ));
}

#[test]
fn test_reopen_skips_unreadable_record() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        store
            .create_container(&container_metadata("web", "sb1", "app"), "c1")
            .unwrap();
    }
    std::fs::write(
        dir.path().join("root/containers/c1/metadata.json"),
        b"{ truncated",
    )
    .unwrap();
    // A directory without a record is not listed at all.
    std::fs::create_dir_all(dir.path().join("root/containers/stray")).unwrap();

    let store = open(&dir);
    assert_eq!(store.containers().unwrap(), vec!["c1".to_string()]);
    assert!(matches!(
        store.container_metadata("c1"),
        Err(Error::Storage { .. })
    ));
}
