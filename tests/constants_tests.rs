//! Tests for constants module.
//!
//! Validates name rules, id shape, annotation namespacing and that timeouts
//! are ordered sensibly.

use magikcri::constants::*;
use magikcri::identity::{container_name, generate_id, infra_container_name, short_id};
use std::time::Duration;

// =============================================================================
// Name Validation Tests
// =============================================================================

#[test]
fn test_validate_name_accepts_typical_names() {
    for name in ["web", "nginx-7d9f", "my_pod.v2", "a"] {
        assert!(validate_name(name).is_ok(), "{} should be valid", name);
    }
}

#[test]
fn test_validate_name_rejects_empty() {
    assert_eq!(validate_name(""), Err("name cannot be empty"));
}

#[test]
fn test_validate_name_rejects_path_components() {
    assert!(validate_name("a/b").is_err());
    assert!(validate_name("..").is_err());
    assert!(validate_name(".").is_err());
    assert!(validate_name("nul\0byte").is_err());
}

#[test]
fn test_validate_name_length_boundary() {
    assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
    assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
}

// =============================================================================
// Id Shape Tests
// =============================================================================

#[test]
fn test_generated_id_shape() {
    let id = generate_id().unwrap();
    assert_eq!(id.len(), ID_LENGTH);
    assert!(id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    assert!(!short_id(&id).bytes().all(|b| b.is_ascii_digit()));
}

#[test]
fn test_generated_ids_are_distinct() {
    let ids: std::collections::HashSet<String> =
        (0..64).map(|_| generate_id().unwrap()).collect();
    assert_eq!(ids.len(), 64);
}

#[test]
fn test_short_id_length() {
    let id = "f".repeat(ID_LENGTH);
    assert_eq!(short_id(&id).len(), SHORT_ID_LENGTH);
}

// =============================================================================
// Naming Convention Tests
// =============================================================================

#[test]
fn test_infra_container_name_uses_suffix() {
    assert_eq!(
        infra_container_name("web"),
        format!("web-{}", INFRA_CONTAINER_SUFFIX)
    );
}

#[test]
fn test_container_name_includes_attempt() {
    assert_eq!(container_name("web", "app", 0), "web-app-0");
    assert_eq!(container_name("web", "app", 3), "web-app-3");
}

// =============================================================================
// Annotation Tests
// =============================================================================

#[test]
fn test_bookkeeping_annotations_share_namespace() {
    let keys = [
        ANNOTATION_NAME,
        ANNOTATION_SANDBOX_ID,
        ANNOTATION_SANDBOX_NAME,
        ANNOTATION_CONTAINER_TYPE,
        ANNOTATION_CONTAINER_NAME,
        ANNOTATION_CONTAINER_ID,
        ANNOTATION_LOG_PATH,
        ANNOTATION_TTY,
        ANNOTATION_IMAGE,
        ANNOTATION_METADATA,
        ANNOTATION_LABELS,
        ANNOTATION_ANNOTATIONS,
        ANNOTATION_HOST_NETWORK,
    ];
    let unique: std::collections::HashSet<&str> = keys.iter().copied().collect();
    assert_eq!(unique.len(), keys.len(), "annotation keys must be distinct");
    for key in keys {
        assert!(key.starts_with("io.magikcri."), "{} outside namespace", key);
    }
}

#[test]
fn test_seccomp_container_key_is_prefix() {
    let key = format!("{}app", SECCOMP_CONTAINER_ANNOTATION_PREFIX);
    assert!(key.starts_with(SECCOMP_CONTAINER_ANNOTATION_PREFIX));
    assert_ne!(key, SECCOMP_POD_ANNOTATION);
}

// =============================================================================
// Timeout Tests
// =============================================================================

#[test]
fn test_stop_poll_shorter_than_timeout() {
    assert!(STOP_POLL_INTERVAL < DEFAULT_STOP_TIMEOUT);
    assert!(STOP_POLL_INTERVAL >= Duration::from_millis(10));
}

#[test]
fn test_stop_timeout_reasonable() {
    assert!(DEFAULT_STOP_TIMEOUT >= Duration::from_secs(1));
    assert!(DEFAULT_STOP_TIMEOUT <= Duration::from_secs(60));
}
