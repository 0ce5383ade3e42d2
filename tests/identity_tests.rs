//! Tests for name reservation and truncated-id lookup.
//!
//! Validates exclusive name ownership, prefix resolution rules, and that
//! concurrent reservations of one name admit exactly one winner.

use magikcri::{Error, IdentityRegistry, NameRegistrar, TruncIndex};
use std::sync::Arc;

// =============================================================================
// NameRegistrar Tests
// =============================================================================

#[test]
fn test_reserve_and_get() {
    let names = NameRegistrar::new();
    names.reserve("web", "id1").unwrap();

    assert_eq!(names.get("web").unwrap(), "id1");
    assert_eq!(names.len(), 1);
}

#[test]
fn test_reserve_same_owner_is_idempotent() {
    let names = NameRegistrar::new();
    names.reserve("web", "id1").unwrap();
    names.reserve("web", "id1").unwrap();
    assert_eq!(names.len(), 1);
}

#[test]
fn test_reserve_conflict_names_owner() {
    let names = NameRegistrar::new();
    names.reserve("web", "id1").unwrap();

    match names.reserve("web", "id2") {
        Err(Error::NameConflict { name, owner }) => {
            assert_eq!(name, "web");
            assert_eq!(owner, "id1");
        }
        other => panic!("expected name conflict, got {:?}", other),
    }
}

#[test]
fn test_reserve_empty_name_rejected() {
    let names = NameRegistrar::new();
    assert!(names.reserve("", "id1").unwrap_err().is_validation());
    assert!(names.is_empty());
}

#[test]
fn test_release_frees_name() {
    let names = NameRegistrar::new();
    names.reserve("web", "id1").unwrap();
    names.release("web");
    names.release("web");

    assert!(matches!(names.get("web"), Err(Error::IdNotFound(_))));
    names.reserve("web", "id2").unwrap();
}

#[test]
fn test_names_of_owner() {
    let names = NameRegistrar::new();
    names.reserve("web-infra", "id1").unwrap();
    names.reserve("web", "id1").unwrap();
    names.reserve("db", "id2").unwrap();

    assert_eq!(names.names_of("id1"), vec!["web", "web-infra"]);
    assert!(names.names_of("id3").is_empty());
}

#[test]
fn test_concurrent_reservations_single_winner() {
    let names = Arc::new(NameRegistrar::new());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let names = names.clone();
            std::thread::spawn(move || names.reserve("contested", &format!("id{}", i)).is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(names.len(), 1);
}

// =============================================================================
// TruncIndex Tests
// =============================================================================

#[test]
fn test_prefix_resolution() {
    let index = TruncIndex::new();
    index.add("abcdef").unwrap();
    index.add("abd123").unwrap();

    assert_eq!(index.get("abc").unwrap(), "abcdef");
    assert_eq!(index.get("abd").unwrap(), "abd123");
    assert!(matches!(index.get("ab"), Err(Error::AmbiguousId(_))));
    assert!(matches!(index.get("zz"), Err(Error::IdNotFound(_))));
    assert!(matches!(index.get(""), Err(Error::IdNotFound(_))));
}

#[test]
fn test_full_id_wins_over_longer_match() {
    let index = TruncIndex::new();
    index.add("abc").unwrap();
    index.add("abcd").unwrap();

    assert_eq!(index.get("abc").unwrap(), "abc");
    assert_eq!(index.get("abcd").unwrap(), "abcd");
}

#[test]
fn test_add_duplicate_and_illegal() {
    let index = TruncIndex::new();
    index.add("abc").unwrap();

    assert!(matches!(index.add("abc"), Err(Error::IdConflict(_))));
    assert!(index.add("").unwrap_err().is_validation());
    assert!(index.add("has space").unwrap_err().is_validation());
    assert_eq!(index.len(), 1);
}

#[test]
fn test_delete() {
    let index = TruncIndex::new();
    index.add("abc").unwrap();
    index.delete("abc").unwrap();

    assert!(!index.contains("abc"));
    assert!(matches!(index.delete("abc"), Err(Error::IdNotFound(_))));
    assert!(index.is_empty());
}

// =============================================================================
// IdentityRegistry Tests
// =============================================================================

#[test]
fn test_pod_and_container_namespaces_are_separate() {
    let registry = IdentityRegistry::new();
    registry.reserve_pod_name("id1", "web").unwrap();
    registry.reserve_container_name("id2", "web").unwrap();

    assert_eq!(registry.pod_names().get("web").unwrap(), "id1");
    assert_eq!(registry.container_names().get("web").unwrap(), "id2");
}

#[test]
fn test_registry_lookup() {
    let registry = IdentityRegistry::new();
    registry.pod_ids().add("0123abcd").unwrap();
    registry.container_ids().add("0123abcd").unwrap();
    registry.container_ids().add("0123ffff").unwrap();

    assert_eq!(registry.lookup_pod("0123").unwrap(), "0123abcd");
    assert!(matches!(
        registry.lookup_container("0123"),
        Err(Error::AmbiguousId(_))
    ));
}

#[test]
fn test_registry_release_is_safe_on_unknown() {
    let registry = IdentityRegistry::new();
    registry.release_pod_name("never-reserved");
    registry.release_container_name("never-reserved");
    assert!(registry.pod_names().is_empty());
}
