//! Tests for the pod sandbox lifecycle.
//!
//! Runs sandboxes against the in-memory runtime and network plugin and checks
//! identities, persisted specs, network handling and teardown.

mod common;

use common::{Harness, POD_IP, host_network_pod_config, pod_config};
use magikcri::cri::{DnsConfig, PodSandboxFilter, PodSandboxState};
use magikcri::spec::{Spec, load_spec};
use magikcri::{
    ANNOTATION_CONTAINER_NAME, ANNOTATION_CONTAINER_TYPE, ANNOTATION_NAME, CONTAINER_TYPE_SANDBOX,
    ContainerStatus, Error, RESOLV_CONF_FILE, SPEC_FILE, SYSCTLS_ANNOTATION, Server,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;

fn saved_spec(server: &Server, id: &str) -> Spec {
    load_spec(&server.storage().work_dir(id).unwrap().join(SPEC_FILE)).unwrap()
}

fn namespace_types(spec: &Spec) -> Vec<String> {
    spec.linux
        .as_ref()
        .map(|linux| linux.namespaces.iter().map(|ns| ns.typ.clone()).collect())
        .unwrap_or_default()
}

// =============================================================================
// Run Tests
// =============================================================================

#[tokio::test]
async fn test_run_returns_hex_id_and_infra_name() {
    let h = Harness::new().await;
    let id = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap();

    assert_eq!(id.len(), 64);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let sandbox = h.server.state().get_sandbox(&id).unwrap();
    assert_eq!(sandbox.name(), "web");
    let infra = sandbox.infra_container().unwrap();
    assert_eq!(infra.id(), id);
    assert_eq!(infra.name(), "web-infra");
    assert_eq!(h.runtime.status_of(&id), Some(ContainerStatus::Running));

    assert_eq!(h.server.identity().pod_names().get("web").unwrap(), id);
    assert_eq!(h.server.identity().container_names().get("web-infra").unwrap(), id);
    assert!(h.server.identity().pod_ids().contains(&id));
    assert!(h.server.identity().container_ids().contains(&id));
}

#[tokio::test]
async fn test_run_persists_identity_annotations() {
    let h = Harness::new().await;
    let id = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap();

    let spec = saved_spec(&h.server, &id);
    assert_eq!(spec.annotations.get(ANNOTATION_NAME).unwrap(), "web");
    assert_eq!(
        spec.annotations.get(ANNOTATION_CONTAINER_NAME).unwrap(),
        "web-infra"
    );
    assert_eq!(
        spec.annotations.get(ANNOTATION_CONTAINER_TYPE).unwrap(),
        CONTAINER_TYPE_SANDBOX
    );
    assert_eq!(spec.annotations.get("owner").unwrap(), "team-a");
    assert!(spec.root.readonly);
    assert_eq!(spec.process.args, vec!["/pause".to_string()]);
    assert!(!spec.root.path.is_empty());
}

#[tokio::test]
async fn test_run_invokes_network_plugin() {
    let h = Harness::new().await;
    let id = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap();

    assert_eq!(h.network.set_ups.load(Ordering::SeqCst), 1);
    let status = h.server.pod_sandbox_status(&id).await.unwrap();
    assert_eq!(status.ip, POD_IP);
    assert_eq!(status.state, PodSandboxState::SandboxReady);
    assert!(!status.host_network);
}

#[tokio::test]
async fn test_host_network_skips_plugin() {
    let h = Harness::new().await;
    let id = h
        .server
        .run_pod_sandbox(&host_network_pod_config("hostnet"))
        .await
        .unwrap();

    assert_eq!(h.network.set_ups.load(Ordering::SeqCst), 0);
    let status = h.server.pod_sandbox_status(&id).await.unwrap();
    assert_eq!(status.ip, h.server.bind_address());
    assert!(status.host_network);
    assert!(!namespace_types(&saved_spec(&h.server, &id)).contains(&"network".to_string()));
}

#[tokio::test]
async fn test_host_pid_and_ipc_drop_namespaces() {
    let h = Harness::new().await;
    let mut config = pod_config("hostns");
    config.linux.namespace_options.host_pid = true;
    config.linux.namespace_options.host_ipc = true;
    let id = h.server.run_pod_sandbox(&config).await.unwrap();

    let types = namespace_types(&saved_spec(&h.server, &id));
    assert!(!types.contains(&"pid".to_string()));
    assert!(!types.contains(&"ipc".to_string()));
    assert!(types.contains(&"network".to_string()));
}

#[tokio::test]
async fn test_resolv_conf_from_dns_config() {
    let h = Harness::new().await;
    let mut config = pod_config("dns");
    config.dns_config = Some(DnsConfig {
        servers: vec!["10.96.0.10".to_string()],
        searches: vec!["default.svc.cluster.local".to_string()],
        options: vec!["ndots:5".to_string()],
    });
    let id = h.server.run_pod_sandbox(&config).await.unwrap();

    let resolv = h.server.storage().run_dir(&id).unwrap().join(RESOLV_CONF_FILE);
    assert_eq!(
        std::fs::read_to_string(resolv).unwrap(),
        "search default.svc.cluster.local\nnameserver 10.96.0.10\noptions ndots:5\n"
    );
}

#[tokio::test]
async fn test_resolv_conf_copied_from_host() {
    let h = Harness::new().await;
    let id = h.server.run_pod_sandbox(&pod_config("nodns")).await.unwrap();

    let resolv = h.server.storage().run_dir(&id).unwrap().join(RESOLV_CONF_FILE);
    assert_eq!(
        std::fs::read_to_string(resolv).unwrap(),
        "nameserver 192.0.2.53\n"
    );
    let spec = saved_spec(&h.server, &id);
    assert!(spec.mounts.iter().any(|m| m.destination == "/etc/resolv.conf"));
}

#[tokio::test]
async fn test_sysctls_written_to_spec() {
    let h = Harness::new().await;
    let mut config = pod_config("tuned");
    config.annotations.insert(
        SYSCTLS_ANNOTATION.to_string(),
        "kernel.shm_rmid_forced=1".to_string(),
    );
    let id = h.server.run_pod_sandbox(&config).await.unwrap();

    let spec = saved_spec(&h.server, &id);
    let linux = spec.linux.unwrap();
    assert_eq!(linux.sysctl.get("kernel.shm_rmid_forced").unwrap(), "1");
}

// =============================================================================
// Validation and Conflict Tests
// =============================================================================

#[tokio::test]
async fn test_empty_name_rejected_without_residue() {
    let h = Harness::new().await;
    let err = h.server.run_pod_sandbox(&pod_config("")).await.unwrap_err();

    assert!(err.is_validation());
    assert!(h.server.storage().containers().unwrap().is_empty());
    assert!(h.server.identity().pod_names().is_empty());
}

#[tokio::test]
async fn test_malformed_sysctl_rejected_without_residue() {
    let h = Harness::new().await;
    let mut config = pod_config("bad-sysctl");
    config
        .annotations
        .insert(SYSCTLS_ANNOTATION.to_string(), "novalue".to_string());

    let err = h.server.run_pod_sandbox(&config).await.unwrap_err();
    assert!(err.is_validation());
    assert!(h.server.storage().containers().unwrap().is_empty());
    assert!(h.server.identity().pod_names().is_empty());
    assert!(h.server.identity().container_names().is_empty());
    assert!(h.server.identity().pod_ids().is_empty());
}

#[tokio::test]
async fn test_duplicate_name_conflicts() {
    let h = Harness::new().await;
    let first = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap();
    let err = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap_err();

    assert!(err.is_conflict(), "unexpected error: {}", err);
    assert_eq!(h.server.storage().containers().unwrap(), vec![first.clone()]);
    assert_eq!(h.server.identity().pod_names().get("web").unwrap(), first);
    assert_eq!(h.server.identity().pod_ids().len(), 1);
}

#[tokio::test]
async fn test_concurrent_same_name_one_wins() {
    let h = Harness::new().await;
    let config = pod_config("race");
    let (a, b) = tokio::join!(
        h.server.run_pod_sandbox(&config),
        h.server.run_pod_sandbox(&config)
    );

    let (winner, loser) = match (a, b) {
        (Ok(id), Err(e)) | (Err(e), Ok(id)) => (id, e),
        other => panic!("expected exactly one success, got {:?}", other),
    };
    assert!(loser.is_conflict());
    assert_eq!(h.server.storage().containers().unwrap(), vec![winner.clone()]);
    assert_eq!(h.server.identity().pod_ids().len(), 1);
    assert_eq!(h.server.identity().container_names().len(), 1);
}

#[tokio::test]
async fn test_concurrent_distinct_names_get_distinct_ids() {
    let h = Harness::new().await;
    let (one, two, three) = (pod_config("one"), pod_config("two"), pod_config("three"));
    let (a, b, c) = tokio::join!(
        h.server.run_pod_sandbox(&one),
        h.server.run_pod_sandbox(&two),
        h.server.run_pod_sandbox(&three)
    );
    let ids = [a.unwrap(), b.unwrap(), c.unwrap()];

    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert_ne!(ids[0], ids[2]);
    assert_eq!(h.server.state().counts().0, 3);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_network_failure_keeps_sandbox_removable() {
    let h = Harness::new().await;
    h.network.fail_set_up.store(true, Ordering::SeqCst);

    let err = h.server.run_pod_sandbox(&pod_config("flaky")).await.unwrap_err();
    assert!(matches!(err, Error::Network { .. }));

    let sandbox = h.server.state().sandboxes().pop().unwrap();
    let id = sandbox.id().to_string();
    assert!(!h.server.identity().pod_ids().contains(&id));

    h.server.remove_pod_sandbox(&id).await.unwrap();
    assert_eq!(h.server.state().counts(), (0, 0));
    assert!(h.server.storage().containers().unwrap().is_empty());

    h.network.fail_set_up.store(false, Ordering::SeqCst);
    h.server.run_pod_sandbox(&pod_config("flaky")).await.unwrap();
}

#[tokio::test]
async fn test_runtime_create_failure_releases_identities() {
    let h = Harness::new().await;
    h.runtime.fail_create.store(true, Ordering::SeqCst);

    let err = h.server.run_pod_sandbox(&pod_config("broken")).await.unwrap_err();
    assert!(matches!(err, Error::CreateFailed { .. }));
    assert!(h.server.identity().pod_names().is_empty());
    assert!(h.server.identity().container_names().is_empty());
    assert!(h.server.identity().container_ids().is_empty());
    assert!(h.server.storage().containers().unwrap().is_empty());
}

// =============================================================================
// Stop, Remove and Query Tests
// =============================================================================

#[tokio::test]
async fn test_stop_is_idempotent() {
    let h = Harness::new().await;
    let id = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap();

    h.server.stop_pod_sandbox(&id).await.unwrap();
    h.server.stop_pod_sandbox(&id).await.unwrap();

    let status = h.server.pod_sandbox_status(&id).await.unwrap();
    assert_eq!(status.state, PodSandboxState::SandboxNotReady);
    assert!(h.network.tear_downs.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_remove_releases_name_for_reuse() {
    let h = Harness::new().await;
    let id = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap();

    h.server.remove_pod_sandbox(&id).await.unwrap();
    assert!(h.server.pod_sandbox_status(&id).await.unwrap_err().is_not_found());
    assert!(h.server.identity().pod_names().is_empty());
    assert!(h.server.identity().container_ids().is_empty());
    assert!(h.runtime.status_of(&id).is_none());

    let again = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap();
    assert_ne!(again, id);
}

#[tokio::test]
async fn test_status_by_unique_prefix() {
    let h = Harness::new().await;
    let id = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap();

    let status = h.server.pod_sandbox_status(&id[..12]).await.unwrap();
    assert_eq!(status.id, id);
    assert_eq!(status.metadata.namespace, "default");
}

#[tokio::test]
async fn test_list_filters() {
    let h = Harness::new().await;
    let web = h.server.run_pod_sandbox(&pod_config("web")).await.unwrap();
    let db = h.server.run_pod_sandbox(&pod_config("db")).await.unwrap();
    h.server.stop_pod_sandbox(&db).await.unwrap();

    let all = h.server.list_pod_sandboxes(&PodSandboxFilter::default()).unwrap();
    assert_eq!(all.len(), 2);

    let ready = h
        .server
        .list_pod_sandboxes(&PodSandboxFilter {
            state: Some(PodSandboxState::SandboxReady),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, web);

    let by_label = h
        .server
        .list_pod_sandboxes(&PodSandboxFilter {
            label_selector: HashMap::from([("app".to_string(), "db".to_string())]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_label.len(), 1);
    assert_eq!(by_label[0].id, db);

    let unknown = h
        .server
        .list_pod_sandboxes(&PodSandboxFilter {
            id: Some("ffffffffffff".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn test_version_reports_runtime() {
    let h = Harness::new().await;
    let version = h.server.version().await.unwrap();

    assert_eq!(version.runtime_name, "mock");
    assert_eq!(version.runtime_api_version, "v1alpha1");
    assert_eq!(version.version, env!("CARGO_PKG_VERSION"));
}
