use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use gm_db::{AccountStore, RegisterOutcome, SubmitOutcome, WithdrawOutcome};
use gm_reconcile::OrderStore;
use gm_schemas::{Balance, Order, OrderNumber, OrderStatus, Withdrawal};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
struct StoredOrder {
    login: String,
    status: OrderStatus,
    accrual: Decimal,
    uploaded_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<String, String>,
    balances: BTreeMap<String, Decimal>,
    orders: BTreeMap<OrderNumber, StoredOrder>,
    withdrawals: Vec<(String, Withdrawal)>,

    list_calls: usize,
    update_calls: usize,
    /// Status updates actually applied.
    writes: usize,

    fail_list: bool,
    fail_update: BTreeSet<OrderNumber>,
}

/// Store double with the same transition and credit rules as the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `login` with a placeholder hash and a zero balance.
    pub async fn seed_user(&self, login: &str) {
        let mut g = self.inner.lock().await;
        g.users
            .entry(login.to_string())
            .or_insert_with(|| "seed$seed".to_string());
        g.balances.entry(login.to_string()).or_insert(Decimal::ZERO);
    }

    /// Insert an order directly in `status`, bypassing upload rules.
    pub async fn seed_order(&self, login: &str, number: &OrderNumber, status: OrderStatus) {
        self.seed_user(login).await;
        let mut g = self.inner.lock().await;
        g.orders.insert(
            number.clone(),
            StoredOrder {
                login: login.to_string(),
                status,
                accrual: Decimal::ZERO,
                uploaded_at: Utc::now(),
            },
        );
    }

    pub async fn set_balance(&self, login: &str, current: Decimal) {
        self.seed_user(login).await;
        self.inner
            .lock()
            .await
            .balances
            .insert(login.to_string(), current);
    }

    pub async fn order_status(&self, number: &OrderNumber) -> Option<OrderStatus> {
        self.inner.lock().await.orders.get(number).map(|o| o.status)
    }

    pub async fn order_accrual(&self, number: &OrderNumber) -> Option<Decimal> {
        self.inner.lock().await.orders.get(number).map(|o| o.accrual)
    }

    pub async fn current_balance(&self, login: &str) -> Decimal {
        self.inner
            .lock()
            .await
            .balances
            .get(login)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub async fn write_count(&self) -> usize {
        self.inner.lock().await.writes
    }

    pub async fn update_calls(&self) -> usize {
        self.inner.lock().await.update_calls
    }

    pub async fn list_calls(&self) -> usize {
        self.inner.lock().await.list_calls
    }

    /// Make every listing fail until switched off.
    pub async fn fail_listing(&self, fail: bool) {
        self.inner.lock().await.fail_list = fail;
    }

    /// Make updates to `number` fail.
    pub async fn fail_updates_for(&self, number: &OrderNumber) {
        self.inner.lock().await.fail_update.insert(number.clone());
    }
}

fn may_precede(from: OrderStatus, to: OrderStatus) -> bool {
    match to {
        OrderStatus::New => false,
        OrderStatus::Processing => from == OrderStatus::New,
        OrderStatus::Invalid | OrderStatus::Processed => !from.is_terminal(),
    }
}

#[async_trait::async_trait]
impl OrderStore for MemoryStore {
    async fn list_non_terminal_orders(&self) -> Result<BTreeMap<OrderNumber, OrderStatus>> {
        let mut g = self.inner.lock().await;
        g.list_calls += 1;
        if g.fail_list {
            bail!("memory store: injected listing failure");
        }
        Ok(g.orders
            .iter()
            .filter(|(_, o)| !o.status.is_terminal())
            .map(|(n, o)| (n.clone(), o.status))
            .collect())
    }

    async fn update_order_status(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Decimal,
    ) -> Result<bool> {
        let mut g = self.inner.lock().await;
        g.update_calls += 1;
        if g.fail_update.contains(number) {
            bail!("memory store: injected update failure for {number}");
        }

        let Some(order) = g.orders.get(number).cloned() else {
            return Ok(false);
        };
        if !may_precede(order.status, status) {
            return Ok(false);
        }

        if status == OrderStatus::Processed && accrual > Decimal::ZERO {
            let bal = g
                .balances
                .get_mut(&order.login)
                .ok_or_else(|| anyhow!("memory store: no balance for {}", order.login))?;
            *bal += accrual;
        }

        if let Some(o) = g.orders.get_mut(number) {
            o.status = status;
            o.accrual = accrual;
        }
        g.writes += 1;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryStore {
    async fn register_user(&self, login: &str, password_hash: &str) -> Result<RegisterOutcome> {
        let mut g = self.inner.lock().await;
        if g.users.contains_key(login) {
            return Ok(RegisterOutcome::LoginTaken);
        }
        g.users.insert(login.to_string(), password_hash.to_string());
        g.balances.insert(login.to_string(), Decimal::ZERO);
        Ok(RegisterOutcome::Created)
    }

    async fn password_hash(&self, login: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().await.users.get(login).cloned())
    }

    async fn submit_order(
        &self,
        login: &str,
        number: &OrderNumber,
        uploaded_at: DateTime<Utc>,
    ) -> Result<SubmitOutcome> {
        let mut g = self.inner.lock().await;
        if let Some(existing) = g.orders.get(number) {
            return Ok(if existing.login == login {
                SubmitOutcome::AlreadyOwned
            } else {
                SubmitOutcome::OwnedByAnother
            });
        }
        g.orders.insert(
            number.clone(),
            StoredOrder {
                login: login.to_string(),
                status: OrderStatus::New,
                accrual: Decimal::ZERO,
                uploaded_at,
            },
        );
        Ok(SubmitOutcome::Accepted)
    }

    async fn orders_for_user(&self, login: &str) -> Result<Vec<Order>> {
        let g = self.inner.lock().await;
        let mut out: Vec<Order> = g
            .orders
            .iter()
            .filter(|(_, o)| o.login == login)
            .map(|(n, o)| Order {
                number: n.clone(),
                status: o.status,
                accrual: (o.status == OrderStatus::Processed).then_some(o.accrual),
                uploaded_at: o.uploaded_at,
            })
            .collect();
        out.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.number.cmp(&b.number))
        });
        Ok(out)
    }

    async fn balance(&self, login: &str) -> Result<Balance> {
        let g = self.inner.lock().await;
        let current = g.balances.get(login).copied().unwrap_or(Decimal::ZERO);
        let withdrawn = g
            .withdrawals
            .iter()
            .filter(|(l, _)| l == login)
            .map(|(_, w)| w.sum)
            .sum();
        Ok(Balance { current, withdrawn })
    }

    async fn withdraw(
        &self,
        login: &str,
        order: &OrderNumber,
        sum: Decimal,
        processed_at: DateTime<Utc>,
    ) -> Result<WithdrawOutcome> {
        if sum <= Decimal::ZERO {
            bail!("withdraw sum must be positive, got {sum}");
        }
        let mut g = self.inner.lock().await;
        let current = g.balances.get(login).copied().unwrap_or(Decimal::ZERO);
        if current < sum {
            return Ok(WithdrawOutcome::InsufficientFunds);
        }
        if g.withdrawals.iter().any(|(_, w)| &w.order == order) {
            return Ok(WithdrawOutcome::DuplicateOrder);
        }
        g.balances.insert(login.to_string(), current - sum);
        g.withdrawals.push((
            login.to_string(),
            Withdrawal {
                order: order.clone(),
                sum,
                processed_at,
            },
        ));
        Ok(WithdrawOutcome::Completed)
    }

    async fn withdrawals_for_user(&self, login: &str) -> Result<Vec<Withdrawal>> {
        let g = self.inner.lock().await;
        let mut out: Vec<Withdrawal> = g
            .withdrawals
            .iter()
            .filter(|(l, _)| l == login)
            .map(|(_, w)| w.clone())
            .collect();
        out.sort_by(|a, b| a.processed_at.cmp(&b.processed_at));
        Ok(out)
    }
}
