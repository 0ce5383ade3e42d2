//! Tests for the OCI spec generator.
//!
//! Validates the default container spec, namespace and capability editing,
//! privileged mode, and persistence of `config.json`.

use magikcri::spec::{SpecGenerator, load_spec, normalize_capability};
use tempfile::TempDir;

fn namespaces(g: &SpecGenerator) -> Vec<(String, Option<String>)> {
    g.spec()
        .linux
        .as_ref()
        .unwrap()
        .namespaces
        .iter()
        .map(|n| (n.typ.clone(), n.path.clone()))
        .collect()
}

// =============================================================================
// Default Spec Tests
// =============================================================================

#[test]
fn test_default_spec() {
    let g = SpecGenerator::new();
    let spec = g.spec();

    assert_eq!(spec.oci_version, magikcri::OCI_RUNTIME_SPEC_VERSION);
    assert_eq!(spec.root.path, "rootfs");
    assert!(spec.process.no_new_privileges);
    assert!(spec.process.env.iter().any(|e| e.starts_with("PATH=")));
    assert!(spec.mounts.iter().any(|m| m.destination == "/proc"));

    let ns: Vec<String> = namespaces(&g).into_iter().map(|(t, _)| t).collect();
    for expected in ["pid", "network", "ipc", "uts", "mount"] {
        assert!(ns.contains(&expected.to_string()), "missing {}", expected);
    }
}

// =============================================================================
// Namespace Tests
// =============================================================================

#[test]
fn test_remove_namespace() {
    let mut g = SpecGenerator::new();
    g.remove_linux_namespace("network").unwrap();

    assert!(!namespaces(&g).iter().any(|(t, _)| t == "network"));
    assert!(g.remove_linux_namespace("bogus").unwrap_err().is_validation());
}

#[test]
fn test_join_namespace_replaces_entry() {
    let mut g = SpecGenerator::new();
    g.add_or_replace_linux_namespace("ipc", "/proc/1/ns/ipc")
        .unwrap();

    let ipc: Vec<_> = namespaces(&g)
        .into_iter()
        .filter(|(t, _)| t == "ipc")
        .collect();
    assert_eq!(
        ipc,
        vec![("ipc".to_string(), Some("/proc/1/ns/ipc".to_string()))]
    );
}

#[test]
fn test_join_namespace_adds_missing_entry() {
    let mut g = SpecGenerator::new();
    g.remove_linux_namespace("network").unwrap();
    g.add_or_replace_linux_namespace("network", "/proc/1/ns/net")
        .unwrap();

    assert!(
        namespaces(&g)
            .contains(&("network".to_string(), Some("/proc/1/ns/net".to_string())))
    );
}

// =============================================================================
// Capability Tests
// =============================================================================

#[test]
fn test_capability_spellings() {
    assert_eq!(normalize_capability("sys_time").unwrap(), "CAP_SYS_TIME");
    assert_eq!(normalize_capability("Net_Raw").unwrap(), "CAP_NET_RAW");
    assert!(normalize_capability("").is_err());
}

#[test]
fn test_add_and_drop_capability() {
    let mut g = SpecGenerator::new();
    g.add_process_capability("sys_admin").unwrap();
    g.add_process_capability("CAP_SYS_ADMIN").unwrap();

    let caps = g.spec().process.capabilities.clone().unwrap();
    assert_eq!(
        caps.bounding.iter().filter(|c| *c == "CAP_SYS_ADMIN").count(),
        1
    );

    g.drop_process_capability("sys_admin").unwrap();
    let caps = g.spec().process.capabilities.clone().unwrap();
    assert!(!caps.effective.contains(&"CAP_SYS_ADMIN".to_string()));
    assert!(g.add_process_capability("teleport").is_err());
}

#[test]
fn test_privileged_lifts_restrictions() {
    let mut g = SpecGenerator::new();
    g.setup_privileged(true);

    let spec = g.spec();
    let linux = spec.linux.as_ref().unwrap();
    assert!(!spec.process.no_new_privileges);
    assert!(linux.masked_paths.is_empty());
    assert!(linux.readonly_paths.is_empty());
    assert!(linux.seccomp.is_none());
    assert!(
        spec.process
            .capabilities
            .as_ref()
            .unwrap()
            .bounding
            .contains(&"CAP_SYS_ADMIN".to_string())
    );
}

#[test]
fn test_unprivileged_is_noop() {
    let mut g = SpecGenerator::new();
    g.setup_privileged(false);
    assert_eq!(g.spec(), SpecGenerator::new().spec());
}

// =============================================================================
// Mount Tests
// =============================================================================

#[test]
fn test_bind_mount_replaces_destination() {
    let mut g = SpecGenerator::new();
    g.add_bind_mount("/a", "/data", &["ro"]);
    g.add_bind_mount("/b", "/data", &["rw"]);

    let data: Vec<_> = g
        .spec()
        .mounts
        .iter()
        .filter(|m| m.destination == "/data")
        .collect();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].source, "/b");
    assert_eq!(data[0].options, vec!["rbind", "rw"]);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    let mut g = SpecGenerator::new();
    g.add_annotation("io.magikcri.name", "web-infra");
    g.add_linux_sysctl("net.ipv4.ip_forward", "1");
    g.set_linux_mount_label("system_u:object_r:container_file_t:s0:c1,c2");
    g.save_to_file(&path).unwrap();

    let loaded = load_spec(&path).unwrap();
    assert_eq!(&loaded, g.spec());
    assert_eq!(loaded.annotations["io.magikcri.name"], "web-infra");

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert!(json.get("ociVersion").is_some());
    assert_eq!(json["linux"]["sysctl"]["net.ipv4.ip_forward"], "1");
}

#[test]
fn test_save_leaves_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    let g = SpecGenerator::new();
    g.save_to_file(&path).unwrap();
    g.save_to_file(&path).unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_load_missing_or_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    assert!(matches!(
        load_spec(&path),
        Err(magikcri::Error::Spec { .. })
    ));

    std::fs::write(&path, b"[1,2,3]").unwrap();
    assert!(SpecGenerator::from_file(&path).is_err());
}
