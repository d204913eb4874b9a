//! Typed view over the merged config JSON, plus the flag/env override layer.
//!
//! Precedence, lowest to highest: built-in defaults, YAML layers, command-line
//! flags, environment variables.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ENV_RUN_ADDRESS: &str = "RUN_ADDRESS";
pub const ENV_DATABASE_URI: &str = "DATABASE_URI";
pub const ENV_ACCRUAL_SYSTEM_ADDRESS: &str = "ACCRUAL_SYSTEM_ADDRESS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GophermartConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub accrual: AccrualSection,
    pub logging: LoggingSection,
    pub auth: AuthSection,
    pub reconcile: ReconcileSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub run_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub uri: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccrualSection {
    pub address: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default `EnvFilter` directive when `RUST_LOG` is not set.
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// NAME of the env var holding the token signing secret.
    pub token_secret_env: String,
    pub token_ttl_secs: u64,
    /// bcrypt work factor for new password digests (4..=31).
    pub password_cost: u32,
}

/// What the reconciler does when a failure of a given class hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicyName {
    Abort,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSection {
    pub poll_interval_ms: u64,
    pub rate_limit_pause_secs: u64,
    pub on_store_error: FailurePolicyName,
    pub on_transport_error: FailurePolicyName,
    pub on_malformed_reply: FailurePolicyName,
}

impl Default for GophermartConfig {
    fn default() -> Self {
        Self {
            server: ServerSection {
                run_address: "localhost:8080".to_string(),
            },
            database: DatabaseSection {
                uri: None,
                max_connections: 10,
            },
            accrual: AccrualSection {
                address: "http://localhost:8081".to_string(),
                request_timeout_ms: 5_000,
            },
            logging: LoggingSection {
                level: "info".to_string(),
            },
            auth: AuthSection {
                token_secret_env: "GOPHERMART_TOKEN_SECRET".to_string(),
                token_ttl_secs: 3_600,
                password_cost: 12,
            },
            reconcile: ReconcileSection {
                poll_interval_ms: 2_000,
                rate_limit_pause_secs: 60,
                on_store_error: FailurePolicyName::Abort,
                on_transport_error: FailurePolicyName::Abort,
                on_malformed_reply: FailurePolicyName::Abort,
            },
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        GophermartConfig::default().server
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        GophermartConfig::default().database
    }
}

impl Default for AccrualSection {
    fn default() -> Self {
        GophermartConfig::default().accrual
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        GophermartConfig::default().logging
    }
}

impl Default for AuthSection {
    fn default() -> Self {
        GophermartConfig::default().auth
    }
}

impl Default for ReconcileSection {
    fn default() -> Self {
        GophermartConfig::default().reconcile
    }
}

impl GophermartConfig {
    /// Decode the merged config JSON. Missing sections and keys take defaults.
    pub fn from_json(config_json: &Value) -> Result<Self> {
        serde_json::from_value(config_json.clone()).context("config does not match schema")
    }

    /// Apply one override layer. `None` fields leave the current value alone.
    pub fn apply(&mut self, o: &Overrides) {
        if let Some(v) = &o.run_address {
            self.server.run_address = v.clone();
        }
        if let Some(v) = &o.database_uri {
            self.database.uri = Some(v.clone());
        }
        if let Some(v) = &o.accrual_address {
            self.accrual.address = v.clone();
        }
    }

    pub fn database_uri(&self) -> Result<&str> {
        self.database
            .uri
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "database uri not configured: set database.uri, -d, or {}",
                    ENV_DATABASE_URI
                )
            })
    }

    /// Accrual base URL with a scheme; bare `host:port` gets `http://`.
    pub fn accrual_base_url(&self) -> String {
        let addr = self.accrual.address.trim().trim_end_matches('/');
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        }
    }

    pub fn accrual_request_timeout(&self) -> Duration {
        Duration::from_millis(self.accrual.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile.poll_interval_ms)
    }

    pub fn rate_limit_pause(&self) -> Duration {
        Duration::from_secs(self.reconcile.rate_limit_pause_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_secs)
    }

    /// bcrypt accepts work factors 4 through 31.
    pub fn password_cost(&self) -> Result<u32> {
        match self.auth.password_cost {
            c @ 4..=31 => Ok(c),
            c => Err(anyhow!("auth.password_cost must be within 4..=31, got {c}")),
        }
    }
}

/// One override layer (command-line flags or environment).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub run_address: Option<String>,
    pub database_uri: Option<String>,
    pub accrual_address: Option<String>,
}

impl Overrides {
    /// Read `RUN_ADDRESS`, `DATABASE_URI` and `ACCRUAL_SYSTEM_ADDRESS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Overrides::from_env`] with an injectable lookup. Blank values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            run_address: get(ENV_RUN_ADDRESS),
            database_uri: get(ENV_DATABASE_URI),
            accrual_address: get(ENV_ACCRUAL_SYSTEM_ADDRESS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let cfg = GophermartConfig::from_json(&serde_json::json!({})).unwrap();
        assert_eq!(cfg, GophermartConfig::default());
        assert_eq!(cfg.poll_interval(), Duration::from_secs(2));
        assert_eq!(cfg.rate_limit_pause(), Duration::from_secs(60));
        assert_eq!(cfg.reconcile.on_store_error, FailurePolicyName::Abort);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg = GophermartConfig::from_json(&serde_json::json!({
            "reconcile": {"on_transport_error": "skip"}
        }))
        .unwrap();
        assert_eq!(cfg.reconcile.on_transport_error, FailurePolicyName::Skip);
        assert_eq!(cfg.reconcile.poll_interval_ms, 2_000);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = GophermartConfig::from_json(&serde_json::json!({
            "reconcile": {"on_store_error": "retry"}
        }));
        assert!(err.is_err());
    }

    #[test]
    fn env_layer_wins_over_flag_layer() {
        let mut cfg = GophermartConfig::default();
        cfg.apply(&Overrides {
            run_address: Some("0.0.0.0:9000".into()),
            database_uri: Some("postgres://flag".into()),
            accrual_address: None,
        });
        let env = Overrides::from_lookup(|k| match k {
            ENV_DATABASE_URI => Some("postgres://env".into()),
            ENV_ACCRUAL_SYSTEM_ADDRESS => Some("  ".into()),
            _ => None,
        });
        cfg.apply(&env);
        assert_eq!(cfg.server.run_address, "0.0.0.0:9000");
        assert_eq!(cfg.database_uri().unwrap(), "postgres://env");
        assert_eq!(cfg.accrual.address, "http://localhost:8081");
    }

    #[test]
    fn password_cost_outside_bcrypt_range_is_rejected() {
        let mut cfg = GophermartConfig::default();
        assert_eq!(cfg.password_cost().unwrap(), 12);
        cfg.auth.password_cost = 3;
        assert!(cfg.password_cost().is_err());
        cfg.auth.password_cost = 32;
        assert!(cfg.password_cost().is_err());
    }

    #[test]
    fn missing_database_uri_is_an_error() {
        assert!(GophermartConfig::default().database_uri().is_err());
    }

    #[test]
    fn accrual_base_url_gets_scheme_and_loses_trailing_slash() {
        let mut cfg = GophermartConfig::default();
        cfg.accrual.address = "accrual:8081/".into();
        assert_eq!(cfg.accrual_base_url(), "http://accrual:8081");
        cfg.accrual.address = "https://accrual.example".into();
        assert_eq!(cfg.accrual_base_url(), "https://accrual.example");
    }
}
