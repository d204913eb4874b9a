//! gm-config
//!
//! Layered YAML configuration for the gophermart daemon.
//!
//! Files are merged in order (earlier = base, later = override), converted to
//! JSON, checked for credentials pasted in as literals, serialised with
//! sorted keys and hashed. The typed view lives in [`settings`]; secret
//! resolution in [`secrets`].

pub mod secrets;
pub mod settings;

pub use secrets::{resolve_secrets, ResolvedSecrets};
pub use settings::{FailurePolicyName, GophermartConfig, Overrides};

use std::fs;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Leaf values that are credentials, not references to them. The daemon
/// only ever needs a PEM key, a bearer token or a stored password digest
/// if someone pasted one into a file by mistake.
const CREDENTIAL_MARKERS: &[(&str, &str)] = &[
    ("-----BEGIN", "PEM block"),
    ("eyJ", "bearer token"),
    ("$2a$", "bcrypt digest"),
    ("$2b$", "bcrypt digest"),
    ("$2y$", "bcrypt digest"),
];

/// Leaves that must hold an environment variable NAME.
const ENV_NAME_LEAVES: &[&str] = &["/auth/token_secret_env"];

/// JSON-pointer prefixes read by [`GophermartConfig::from_json`].
///
/// Keep in sync with `settings.rs`: a key missing here is reported as unused
/// even though the daemon reads it.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/server/run_address",
    "/database/uri",
    "/database/max_connections",
    "/accrual/address",
    "/accrual/request_timeout_ms",
    "/logging/level",
    "/auth/token_secret_env",
    "/auth/token_ttl_secs",
    "/auth/password_cost",
    "/reconcile/poll_interval_ms",
    "/reconcile/rate_limit_pause_secs",
    "/reconcile/on_store_error",
    "/reconcile/on_transport_error",
    "/reconcile/on_malformed_reply",
];

// ---------------------------------------------------------------------------
// Unused keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Sorted copy of [`CONSUMED_POINTERS`].
    pub consumed_prefixes: Vec<String>,
    /// Leaves no consumed prefix covers, sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// List every leaf of `config_json` the daemon never reads. With
/// [`UnusedKeyPolicy::Fail`] a non-empty list is an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut consumed_prefixes: Vec<String> =
        CONSUMED_POINTERS.iter().map(|p| p.to_string()).collect();
    consumed_prefixes.sort();

    let mut unused: Vec<String> = leaves(config_json)
        .into_iter()
        .map(|(ptr, _)| ptr)
        .filter(|ptr| !CONSUMED_POINTERS.iter().any(|c| covers(c, ptr)))
        .collect();
    unused.sort();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(12)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} key(s) not read by gophermart: {:?}",
            report.unused_leaf_pointers.len(),
            shown
        );
    }

    Ok(report)
}

/// `/a/b` covers `/a/b` and `/a/b/c`, not `/a/bc`.
fn covers(prefix: &str, leaf: &str) -> bool {
    match leaf.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Every scalar (or null) in `v` with its JSON pointer.
fn leaves(v: &Value) -> Vec<(String, &Value)> {
    fn walk<'a>(v: &'a Value, at: &mut String, out: &mut Vec<(String, &'a Value)>) {
        let children: Vec<(String, &Value)> = match v {
            Value::Object(map) => map
                .iter()
                .map(|(k, c)| (k.replace('~', "~0").replace('/', "~1"), c))
                .collect(),
            Value::Array(items) => items.iter().enumerate().map(|(i, c)| (i.to_string(), c)).collect(),
            _ => {
                let ptr = if at.is_empty() { "/".to_string() } else { at.clone() };
                out.push((ptr, v));
                return;
            }
        };
        for (token, child) in children {
            let len = at.len();
            at.push('/');
            at.push_str(&token);
            walk(child, at, out);
            at.truncate(len);
        }
    }

    let mut out = Vec::new();
    walk(v, &mut String::new(), &mut out);
    out
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Hex SHA-256 of `canonical_json`; logged at boot.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {i}: invalid yaml"))?;
        // An empty document is an empty layer.
        if layer.is_null() {
            continue;
        }
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("config layer {i}: not representable as json"))?;
        overlay(&mut merged, layer);
    }

    reject_credential_literals(&merged)?;

    // serde_json's Map is BTreeMap-backed, so keys serialise sorted.
    let canonical_json = serde_json::to_string(&merged).context("config serialise failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match top {
        Value::Object(top_map) if base.is_object() => {
            if let Some(base_map) = base.as_object_mut() {
                for (k, v) in top_map {
                    overlay(base_map.entry(k).or_insert(Value::Null), v);
                }
            }
        }
        other => *base = other,
    }
}

// ---------------------------------------------------------------------------
// Credential literals
// ---------------------------------------------------------------------------

fn reject_credential_literals(v: &Value) -> Result<()> {
    for (ptr, leaf) in leaves(v) {
        let Some(s) = leaf.as_str() else { continue };
        if let Some(kind) = credential_kind(s) {
            bail!("CONFIG_SECRET_DETECTED leaf={ptr} looks like a {kind}; value=REDACTED");
        }
        if ENV_NAME_LEAVES.contains(&ptr.as_str()) && !is_env_var_name(s) {
            bail!(
                "CONFIG_SECRET_DETECTED leaf={ptr} must name an env var \
                 (A-Z, 0-9, _); value=REDACTED"
            );
        }
    }
    Ok(())
}

fn credential_kind(s: &str) -> Option<&'static str> {
    let t = s.trim();
    if t.len() < 8 {
        return None;
    }
    CREDENTIAL_MARKERS
        .iter()
        .find(|(marker, _)| t.starts_with(marker))
        .map(|(_, kind)| *kind)
}

fn is_env_var_name(s: &str) -> bool {
    let mut bytes = s.bytes();
    matches!(bytes.next(), Some(b'A'..=b'Z' | b'_'))
        && bytes.all(|b| matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b'_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_respects_segment_boundary() {
        assert!(covers("/a/b", "/a/b"));
        assert!(covers("/a/b", "/a/b/c"));
        assert!(!covers("/a/b", "/a/bc"));
    }

    #[test]
    fn leaves_escape_pointer_tokens() {
        let v = serde_json::json!({"a/b": {"c~d": 1}, "list": [true]});
        let ptrs: Vec<String> = leaves(&v).into_iter().map(|(p, _)| p).collect();
        assert_eq!(ptrs, vec!["/a~1b/c~0d", "/list/0"]);
    }

    #[test]
    fn overlay_replaces_leaves_and_keeps_siblings() {
        let mut a = serde_json::json!({"server": {"run_address": "a:1"}, "logging": {"level": "info"}});
        overlay(&mut a, serde_json::json!({"server": {"run_address": "b:2"}}));
        assert_eq!(a["server"]["run_address"], "b:2");
        assert_eq!(a["logging"]["level"], "info");
    }

    #[test]
    fn credential_markers_need_length() {
        assert_eq!(credential_kind("eyJhbGciOiJIUzI1NiJ9"), Some("bearer token"));
        assert_eq!(
            credential_kind("$2b$10$abcdefghijklmnopqrstuv"),
            Some("bcrypt digest")
        );
        assert_eq!(credential_kind("eyJ"), None);
        assert_eq!(credential_kind("GOPHERMART_TOKEN_SECRET"), None);
    }

    #[test]
    fn env_var_names() {
        assert!(is_env_var_name("GOPHERMART_TOKEN_SECRET"));
        assert!(is_env_var_name("_X1"));
        assert!(!is_env_var_name("sk_live_0123"));
        assert!(!is_env_var_name("1ABC"));
        assert!(!is_env_var_name(""));
    }
}
