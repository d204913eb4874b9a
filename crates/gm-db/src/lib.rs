//! gm-db
//!
//! Postgres persistence: users, balances, uploaded orders and withdrawals.
//!
//! The free functions take a `&PgPool` and do one thing each. [`PgStore`]
//! wraps a pool and exposes them through the [`AccountStore`] and
//! [`gm_reconcile::OrderStore`] seams so the daemon and the reconciler can be
//! driven by in-memory stores in tests.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gm_schemas::{Balance, Order, OrderNumber, Withdrawal};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

mod accounts;
mod orders;
mod store;

pub use accounts::{balance, password_hash, register_user, withdraw, withdrawals_for_user};
pub use orders::{list_non_terminal_orders, orders_for_user, submit_order, update_order_status};
pub use store::PgStore;

/// Env var the `#[ignore]`d integration tests read their database URL from.
pub const ENV_DB_URL: &str = "GOPHERMART_DATABASE_URL";

/// Connect to Postgres at `url` with at most `max_connections` pooled connections.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations. Safe to call on every boot.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    LoginTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New row, status NEW.
    Accepted,
    /// The caller uploaded this number before.
    AlreadyOwned,
    /// Another user uploaded this number.
    OwnedByAnother,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawOutcome {
    Completed,
    InsufficientFunds,
    /// A withdrawal against this order number already exists.
    DuplicateOrder,
}

// ---------------------------------------------------------------------------
// Request-path seam
// ---------------------------------------------------------------------------

/// Everything the HTTP handlers need from persistence.
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    /// Create the user and a zero balance together.
    async fn register_user(&self, login: &str, password_hash: &str) -> Result<RegisterOutcome>;

    async fn password_hash(&self, login: &str) -> Result<Option<String>>;

    async fn submit_order(
        &self,
        login: &str,
        number: &OrderNumber,
        uploaded_at: DateTime<Utc>,
    ) -> Result<SubmitOutcome>;

    /// Oldest upload first.
    async fn orders_for_user(&self, login: &str) -> Result<Vec<Order>>;

    async fn balance(&self, login: &str) -> Result<Balance>;

    /// Debit `sum` and record the withdrawal atomically.
    async fn withdraw(
        &self,
        login: &str,
        order: &OrderNumber,
        sum: Decimal,
        processed_at: DateTime<Utc>,
    ) -> Result<WithdrawOutcome>;

    /// Oldest withdrawal first.
    async fn withdrawals_for_user(&self, login: &str) -> Result<Vec<Withdrawal>>;
}
