use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use gm_reconcile::OrderStore;
use gm_schemas::{Balance, Order, OrderNumber, OrderStatus, Withdrawal};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::{AccountStore, RegisterOutcome, SubmitOutcome, WithdrawOutcome};

/// Pool-backed implementation of both persistence seams.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl OrderStore for PgStore {
    async fn list_non_terminal_orders(&self) -> Result<BTreeMap<OrderNumber, OrderStatus>> {
        crate::list_non_terminal_orders(&self.pool).await
    }

    async fn update_order_status(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        crate::update_order_status(&self.pool, number, status, accrual).await
    }
}

#[async_trait::async_trait]
impl AccountStore for PgStore {
    async fn register_user(&self, login: &str, password_hash: &str) -> Result<RegisterOutcome> {
        crate::register_user(&self.pool, login, password_hash).await
    }

    async fn password_hash(&self, login: &str) -> Result<Option<String>> {
        crate::password_hash(&self.pool, login).await
    }

    async fn submit_order(
        &self,
        login: &str,
        number: &OrderNumber,
        uploaded_at: DateTime<Utc>,
    ) -> Result<SubmitOutcome> {
        crate::submit_order(&self.pool, login, number, uploaded_at).await
    }

    async fn orders_for_user(&self, login: &str) -> Result<Vec<Order>> {
        crate::orders_for_user(&self.pool, login).await
    }

    async fn balance(&self, login: &str) -> Result<Balance> {
        crate::balance(&self.pool, login).await
    }

    async fn withdraw(
        &self,
        login: &str,
        order: &OrderNumber,
        sum: Decimal,
        processed_at: DateTime<Utc>,
    ) -> Result<WithdrawOutcome> {
        crate::withdraw(&self.pool, login, order, sum, processed_at).await
    }

    async fn withdrawals_for_user(&self, login: &str) -> Result<Vec<Withdrawal>> {
        crate::withdrawals_for_user(&self.pool, login).await
    }
}
