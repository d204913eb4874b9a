use std::collections::{BTreeMap, VecDeque};

use gm_reconcile::{AccrualOracle, OracleAnswer, OracleError};
use gm_schemas::{AccrualReply, AccrualStatus, OrderNumber};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::Instant;

type Scripted = Result<OracleAnswer, OracleError>;

/// One `fetch` as seen by the oracle.
#[derive(Clone, Debug)]
pub struct OracleCall {
    pub order: OrderNumber,
    pub at: Instant,
}

#[derive(Default)]
struct Inner {
    scripts: BTreeMap<OrderNumber, VecDeque<Scripted>>,
    calls: Vec<OracleCall>,
}

/// Accrual oracle answering from per-order scripts.
///
/// Answers are consumed front to back; the last one repeats forever. An
/// order with no script answers [`OracleAnswer::Unknown`].
#[derive(Default)]
pub struct ScriptedOracle {
    inner: Mutex<Inner>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script(&self, order: &OrderNumber, answers: Vec<Scripted>) {
        self.inner
            .lock()
            .await
            .scripts
            .insert(order.clone(), answers.into());
    }

    /// Script a single 2xx reply echoing `order`.
    pub async fn reply(&self, order: &OrderNumber, status: AccrualStatus, accrual: Option<Decimal>) {
        self.script(order, vec![Ok(Self::reply_for(order, status, accrual))])
            .await;
    }

    pub fn reply_for(
        order: &OrderNumber,
        status: AccrualStatus,
        accrual: Option<Decimal>,
    ) -> OracleAnswer {
        OracleAnswer::Reply(AccrualReply {
            order: order.as_str().to_string(),
            status,
            accrual,
        })
    }

    pub async fn calls(&self) -> Vec<OracleCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn calls_for(&self, order: &OrderNumber) -> usize {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| &c.order == order)
            .count()
    }
}

#[async_trait::async_trait]
impl AccrualOracle for ScriptedOracle {
    async fn fetch(&self, number: &OrderNumber) -> Result<OracleAnswer, OracleError> {
        let mut g = self.inner.lock().await;
        g.calls.push(OracleCall {
            order: number.clone(),
            at: Instant::now(),
        });
        match g.scripts.get_mut(number) {
            Some(q) if q.len() > 1 => q.pop_front().unwrap_or(Ok(OracleAnswer::Unknown)),
            Some(q) => q.front().cloned().unwrap_or(Ok(OracleAnswer::Unknown)),
            None => Ok(OracleAnswer::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order_number;

    #[tokio::test]
    async fn last_answer_repeats() {
        let oracle = ScriptedOracle::new();
        let n = order_number("55");
        oracle
            .script(&n, vec![Ok(OracleAnswer::RateLimited), Ok(OracleAnswer::Unavailable)])
            .await;

        assert_eq!(oracle.fetch(&n).await.unwrap(), OracleAnswer::RateLimited);
        assert_eq!(oracle.fetch(&n).await.unwrap(), OracleAnswer::Unavailable);
        assert_eq!(oracle.fetch(&n).await.unwrap(), OracleAnswer::Unavailable);
        assert_eq!(oracle.calls_for(&n).await, 3);
    }

    #[tokio::test]
    async fn unscripted_order_is_unknown() {
        let oracle = ScriptedOracle::new();
        let n = order_number("66");
        assert_eq!(oracle.fetch(&n).await.unwrap(), OracleAnswer::Unknown);
    }
}
