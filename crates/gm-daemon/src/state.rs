//! Shared runtime state for the gophermart daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The order reconciler
//! runs beside the HTTP server and shares the store through its own seam.

use std::sync::Arc;

use gm_config::{FailurePolicyName, GophermartConfig};
use gm_db::AccountStore;
use gm_reconcile::{
    AccrualOracle, FailurePolicies, FailurePolicy, LoopExit, OrderReconciler, OrderStore,
    ReconcilerConfig,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenSigner;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub store: Arc<dyn AccountStore>,
    pub tokens: TokenSigner,
    /// bcrypt work factor for digests written at registration.
    pub password_cost: u32,
}

impl AppState {
    pub fn new(store: Arc<dyn AccountStore>, tokens: TokenSigner) -> Self {
        Self {
            build: BuildInfo {
                service: "gophermart",
                version: env!("CARGO_PKG_VERSION"),
            },
            store,
            tokens,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }
}

// ---------------------------------------------------------------------------
// Reconciler wiring
// ---------------------------------------------------------------------------

/// Loop settings from the `reconcile` config section.
pub fn reconciler_config(cfg: &GophermartConfig) -> ReconcilerConfig {
    let policy = |p: FailurePolicyName| match p {
        FailurePolicyName::Abort => FailurePolicy::Abort,
        FailurePolicyName::Skip => FailurePolicy::Skip,
    };
    ReconcilerConfig {
        poll_interval: cfg.poll_interval(),
        rate_limit_pause: cfg.rate_limit_pause(),
        policies: FailurePolicies {
            store: policy(cfg.reconcile.on_store_error),
            transport: policy(cfg.reconcile.on_transport_error),
            malformed: policy(cfg.reconcile.on_malformed_reply),
        },
    }
}

/// Start the order reconciler; it stops when `cancel` fires or a failure
/// hits an `abort` policy.
pub fn spawn_order_reconciler(
    store: Arc<dyn OrderStore>,
    oracle: Arc<dyn AccrualOracle>,
    cfg: ReconcilerConfig,
    cancel: CancellationToken,
) -> JoinHandle<LoopExit> {
    OrderReconciler::new(store, oracle, cfg).spawn(cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reconciler_config_maps_policies_and_timings() {
        let mut cfg = GophermartConfig::default();
        cfg.reconcile.poll_interval_ms = 500;
        cfg.reconcile.rate_limit_pause_secs = 5;
        cfg.reconcile.on_transport_error = FailurePolicyName::Skip;

        let rc = reconciler_config(&cfg);
        assert_eq!(rc.poll_interval, Duration::from_millis(500));
        assert_eq!(rc.rate_limit_pause, Duration::from_secs(5));
        assert_eq!(rc.policies.store, FailurePolicy::Abort);
        assert_eq!(rc.policies.transport, FailurePolicy::Skip);
        assert_eq!(rc.policies.malformed, FailurePolicy::Abort);
    }

    #[test]
    fn default_config_reproduces_loop_defaults() {
        assert_eq!(
            reconciler_config(&GophermartConfig::default()),
            ReconcilerConfig::default()
        );
    }
}
