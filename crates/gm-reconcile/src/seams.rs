use std::collections::BTreeMap;

use anyhow::Result;
use gm_schemas::{OrderNumber, OrderStatus};
use rust_decimal::Decimal;

use crate::types::{OracleAnswer, OracleError};

/// The persistence the reconciler needs. Shared with the request path.
#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    /// Every order whose status is NEW or PROCESSING, with that status.
    async fn list_non_terminal_orders(&self) -> Result<BTreeMap<OrderNumber, OrderStatus>>;

    /// Atomically set `status`/`accrual` and, for PROCESSED, credit `accrual`
    /// to the owner's balance.
    ///
    /// Returns `false` without writing anything when the order is already
    /// terminal (or unknown); both halves apply or neither does.
    async fn update_order_status(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool>;
}

/// The external accrual service.
#[async_trait::async_trait]
pub trait AccrualOracle: Send + Sync {
    async fn fetch(&self, number: &OrderNumber) -> Result<OracleAnswer, OracleError>;
}
