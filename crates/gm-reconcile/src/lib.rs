//! gm-reconcile
//!
//! Order reconciliation against the external accrual service.
//!
//! - [`policy`] is the pure transition table: local status + remote status
//!   -> hold or advance. No IO.
//! - [`OrderReconciler`] is the long-running loop: list non-terminal orders,
//!   ask the oracle about each, persist transitions, sleep, repeat until
//!   cancelled or a fatal failure under the configured policy.
//! - [`OrderStore`] and [`AccrualOracle`] are the seams. Postgres and HTTP
//!   implementations live in `gm-db` and `gm-accrual`; in-memory doubles in
//!   `gm-testkit`.
//!
//! Balance credit happens inside `OrderStore::update_order_status` when the
//! new status is PROCESSED. Terminal orders are never listed again, so each
//! order is credited at most once.

pub mod policy;
mod seams;
mod types;
mod worker;

pub use policy::decide;
pub use seams::{AccrualOracle, OrderStore};
pub use types::*;
pub use worker::OrderReconciler;
