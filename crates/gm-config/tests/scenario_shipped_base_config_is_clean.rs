//! The repository's `config/base.yaml` must load, use every key it sets,
//! and describe exactly the built-in defaults.

use gm_config::{report_unused_keys, GophermartConfig, UnusedKeyPolicy};

const BASE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/base.yaml");

#[test]
fn shipped_base_config_matches_defaults_and_has_no_unused_keys() {
    let loaded = gm_config::load_layered_yaml(&[BASE]).expect("base.yaml loads");

    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail)
        .expect("base.yaml has no unused keys");
    assert!(report.is_clean());

    let cfg = GophermartConfig::from_json(&loaded.config_json).unwrap();
    assert_eq!(cfg, GophermartConfig::default());
}
