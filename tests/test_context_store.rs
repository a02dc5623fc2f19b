//! Context profiles read from a directory on disk

use broker_host::context::{ContextError, ContextStore, ProfileAuth, SELECTED_FILE};
use std::fs;
use tempfile::TempDir;

fn store_with(files: &[(&str, &str)]) -> (TempDir, ContextStore) {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        fs::write(dir.path().join(name), content).unwrap();
    }
    let store = ContextStore::new(dir.path());
    (dir, store)
}

#[test]
fn test_load_named_context() {
    let (_dir, store) = store_with(&[(
        "prod.json",
        r#"{"description": "production", "url": "mqtts://broker.prod:8883", "jwt": "j", "seed": "s"}"#,
    )]);

    let (name, profile) = store.load("prod").unwrap();

    assert_eq!(name, "prod");
    assert_eq!(profile.description, "production");
    assert_eq!(profile.url, "mqtts://broker.prod:8883");
    assert_eq!(
        profile.auth(),
        ProfileAuth::JwtAndSeed {
            jwt: "j".to_string(),
            seed: "s".to_string()
        }
    );
}

#[test]
fn test_empty_name_uses_selected_context() {
    let (_dir, store) = store_with(&[
        (SELECTED_FILE, "dev\n"),
        ("dev.json", r#"{"url": "mqtt://localhost:1883", "user": "dev"}"#),
    ]);

    assert_eq!(store.selected().unwrap(), Some("dev".to_string()));
    let (name, profile) = store.load("").unwrap();

    assert_eq!(name, "dev");
    assert_eq!(profile.user.as_deref(), Some("dev"));
}

#[test]
fn test_empty_name_without_selection() {
    let (_dir, store) = store_with(&[]);

    assert_eq!(store.selected().unwrap(), None);
    assert!(matches!(store.load(""), Err(ContextError::NoneSelected)));
}

#[test]
fn test_blank_selection_counts_as_none() {
    let (_dir, store) = store_with(&[(SELECTED_FILE, "  \n")]);
    assert!(matches!(store.load(""), Err(ContextError::NoneSelected)));
}

#[test]
fn test_missing_context() {
    let (_dir, store) = store_with(&[]);

    match store.load("ghost") {
        Err(ContextError::NotFound { name, path }) => {
            assert_eq!(name, "ghost");
            assert!(path.ends_with("ghost.json"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_malformed_context_file() {
    let (_dir, store) = store_with(&[("broken.json", "{not json")]);
    assert!(matches!(
        store.load("broken"),
        Err(ContextError::Parse { .. })
    ));
}

#[test]
fn test_path_traversal_rejected() {
    let (_dir, store) = store_with(&[]);
    assert!(matches!(
        store.load("../secrets"),
        Err(ContextError::InvalidName(_))
    ));
}
