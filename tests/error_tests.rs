//! Tests for error types.
//!
//! Validates display formatting and the category helpers callers use to
//! decide how to react.

use magikcri::Error;
use std::path::PathBuf;

// =============================================================================
// Display Tests
// =============================================================================

#[test]
fn test_name_conflict_display() {
    let err = Error::NameConflict {
        name: "web".to_string(),
        owner: "4a1b9c".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("web"), "should include name");
    assert!(msg.contains("4a1b9c"), "should include owner");
    assert!(msg.contains("conflict"), "should indicate conflict");
}

#[test]
fn test_sandbox_not_found_display() {
    let msg = Error::SandboxNotFound("abc".to_string()).to_string();
    assert!(msg.contains("pod sandbox not found"));
    assert!(msg.contains("abc"));
}

#[test]
fn test_ambiguous_id_display() {
    let msg = Error::AmbiguousId("ab".to_string()).to_string();
    assert!(msg.contains("multiple ids"));
    assert!(msg.contains("ab"));
}

#[test]
fn test_storage_display() {
    let err = Error::Storage {
        operation: "write".to_string(),
        id: "c1".to_string(),
        reason: "disk full".to_string(),
    };
    assert_eq!(err.to_string(), "storage write failed for c1: disk full");
}

#[test]
fn test_create_failed_display() {
    let err = Error::CreateFailed {
        id: "my-container".to_string(),
        reason: "rootfs not found".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("my-container"), "should include container id");
    assert!(msg.contains("rootfs not found"), "should include reason");
}

#[test]
fn test_spec_display_includes_path() {
    let err = Error::Spec {
        path: PathBuf::from("/var/lib/magikcri/containers/c1/userdata/config.json"),
        reason: "missing annotation io.magikcri.name".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("config.json"));
    assert!(msg.contains("io.magikcri.name"));
}

#[test]
fn test_config_display() {
    let err = Error::Config {
        path: PathBuf::from("/etc/magikcri/magikcri.toml"),
        reason: "expected a table".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("magikcri.toml"));
    assert!(msg.contains("expected a table"));
}

// =============================================================================
// Conversion Tests
// =============================================================================

#[test]
fn test_io_error_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: Error = io_err.into();

    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("denied"));
}

#[test]
fn test_serde_json_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: Error = json_err.into();

    assert!(matches!(err, Error::Serialization(_)));
}

#[test]
fn test_error_is_send_sync() {
    fn assert_send_sync<T: Send + Sync + 'static>() {}
    assert_send_sync::<Error>();
}

// =============================================================================
// Category Tests
// =============================================================================

#[test]
fn test_validation_category() {
    assert!(Error::Validation("empty name".to_string()).is_validation());
    assert!(!Error::Unsupported("tty".to_string()).is_validation());
}

#[test]
fn test_conflict_category() {
    let conflicts = [
        Error::NameConflict {
            name: "n".to_string(),
            owner: "o".to_string(),
        },
        Error::IdConflict("id".to_string()),
        Error::SandboxAlreadyExists("web".to_string()),
        Error::DuplicateName("web-infra".to_string()),
    ];
    for err in conflicts {
        assert!(err.is_conflict(), "{} should be a conflict", err);
        assert!(!err.is_not_found());
        assert!(!err.is_validation());
    }
}

#[test]
fn test_not_found_category() {
    let missing = [
        Error::SandboxNotFound("s".to_string()),
        Error::ContainerNotFound("c".to_string()),
        Error::IdNotFound("i".to_string()),
        Error::RecordNotFound("r".to_string()),
    ];
    for err in missing {
        assert!(err.is_not_found(), "{} should be not-found", err);
        assert!(!err.is_conflict());
    }
}

#[test]
fn test_ambiguous_is_not_not_found() {
    let err = Error::AmbiguousId("a".to_string());
    assert!(!err.is_not_found());
    assert!(!err.is_conflict());
}

#[test]
fn test_subsystem_errors_uncategorized() {
    let errs = [
        Error::Network {
            id: "s".to_string(),
            reason: "no ips".to_string(),
        },
        Error::Security("label".to_string()),
        Error::Internal("oops".to_string()),
    ];
    for err in errs {
        assert!(!err.is_validation());
        assert!(!err.is_conflict());
        assert!(!err.is_not_found());
    }
}
