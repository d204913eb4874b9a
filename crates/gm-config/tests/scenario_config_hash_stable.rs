//! Scenario: layered config hashing is deterministic.
//!
//! - Same input twice produces the same hash.
//! - Key order inside YAML does not change the hash.
//! - A different value changes the hash.
//! - Later layers override earlier ones.

use gm_config::{load_layered_yaml_from_strings, GophermartConfig};

const BASE_YAML: &str = r#"
server:
  run_address: "localhost:8080"
accrual:
  address: "http://localhost:8081"
  request_timeout_ms: 5000
auth:
  token_secret_env: "GOPHERMART_TOKEN_SECRET"
"#;

const BASE_YAML_REORDERED: &str = r#"
auth:
  token_secret_env: "GOPHERMART_TOKEN_SECRET"
accrual:
  request_timeout_ms: 5000
  address: "http://localhost:8081"
server:
  run_address: "localhost:8080"
"#;

const OVERLAY_YAML: &str = r#"
accrual:
  address: "http://accrual:9000"
reconcile:
  on_malformed_reply: "skip"
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64, "sha256 hex");
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_changes_hash_and_wins() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, layered.config_hash);

    let cfg = GophermartConfig::from_json(&layered.config_json).unwrap();
    assert_eq!(cfg.accrual.address, "http://accrual:9000");
    assert_eq!(cfg.accrual.request_timeout_ms, 5000);
    assert_eq!(cfg.server.run_address, "localhost:8080");
}

#[test]
fn empty_layer_is_ignored() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, ""]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn load_from_files_matches_strings() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("overlay.yaml");
    std::fs::write(&base, BASE_YAML).unwrap();
    std::fs::write(&overlay, OVERLAY_YAML).unwrap();

    let from_files = gm_config::load_layered_yaml(&[
        base.to_str().unwrap(),
        overlay.to_str().unwrap(),
    ])
    .unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);
}

#[test]
fn missing_file_names_the_path() {
    let err = gm_config::load_layered_yaml(&["/definitely/not/here.yaml"])
        .unwrap_err()
        .to_string();
    assert!(err.contains("/definitely/not/here.yaml"));
}
