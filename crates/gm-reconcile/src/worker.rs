use std::sync::Arc;
use std::time::Duration;

use gm_schemas::{fits_money_column, AccrualReply, OrderNumber, OrderStatus};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::policy::decide;
use crate::seams::{AccrualOracle, OrderStore};
use crate::types::{
    FailureClass, FailurePolicy, IterationHalt, IterationReport, LoopExit, OracleAnswer,
    ReconcilerConfig, Transition,
};

/// Background loop keeping local order status in step with the accrual service.
pub struct OrderReconciler {
    store: Arc<dyn OrderStore>,
    oracle: Arc<dyn AccrualOracle>,
    cfg: ReconcilerConfig,
}

impl OrderReconciler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        oracle: Arc<dyn AccrualOracle>,
        cfg: ReconcilerConfig,
    ) -> Self {
        Self { store, oracle, cfg }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.cfg
    }

    /// Run [`OrderReconciler::run`] on the Tokio runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<LoopExit> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Iterate until `cancel` fires or a failure hits an `Abort` policy.
    pub async fn run(&self, cancel: CancellationToken) -> LoopExit {
        info!(
            poll_interval_ms = self.cfg.poll_interval.as_millis() as u64,
            rate_limit_pause_secs = self.cfg.rate_limit_pause.as_secs(),
            "order reconciler started"
        );

        loop {
            if cancel.is_cancelled() {
                info!("order reconciler cancelled");
                return LoopExit::Cancelled;
            }

            match self.run_iteration(&cancel).await {
                Ok(report) => debug!(
                    polled = report.polled,
                    updated = report.updated,
                    unchanged = report.unchanged,
                    unknown = report.unknown,
                    unavailable = report.unavailable,
                    rate_limited = report.rate_limited,
                    skipped_on_error = report.skipped_on_error,
                    "reconcile iteration done"
                ),
                Err(IterationHalt::Cancelled) => {
                    info!("order reconciler cancelled");
                    return LoopExit::Cancelled;
                }
                Err(IterationHalt::Fatal(e)) => {
                    error!(error = %format!("{e:#}"), "order reconciler aborted");
                    return LoopExit::Aborted(e);
                }
            }

            if sleep_or_cancel(&cancel, self.cfg.poll_interval).await {
                info!("order reconciler cancelled");
                return LoopExit::Cancelled;
            }
        }
    }

    /// One pass over every non-terminal order. Orders are handled in order-number order.
    pub async fn run_iteration(
        &self,
        cancel: &CancellationToken,
    ) -> Result<IterationReport, IterationHalt> {
        let mut report = IterationReport::default();

        let pending = match self.store.list_non_terminal_orders().await {
            Ok(p) => p,
            Err(e) => {
                self.on_failure(
                    FailureClass::Store,
                    e.context("list non-terminal orders failed"),
                    None,
                    &mut report,
                )?;
                return Ok(report);
            }
        };

        for (number, local) in &pending {
            if cancel.is_cancelled() {
                return Err(IterationHalt::Cancelled);
            }
            self.reconcile_order(number, *local, cancel, &mut report)
                .await?;
        }

        Ok(report)
    }

    async fn reconcile_order(
        &self,
        number: &OrderNumber,
        local: OrderStatus,
        cancel: &CancellationToken,
        report: &mut IterationReport,
    ) -> Result<(), IterationHalt> {
        report.polled += 1;

        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IterationHalt::Cancelled),
            a = self.oracle.fetch(number) => a,
        };

        let reply = match answer {
            Ok(OracleAnswer::Reply(r)) => r,
            Ok(OracleAnswer::Unknown) => {
                info!(order = %number, local = %local, "order not registered at accrual service yet");
                report.unknown += 1;
                return Ok(());
            }
            Ok(OracleAnswer::Unavailable) => {
                warn!(order = %number, local = %local, "accrual service unavailable; retry next cycle");
                report.unavailable += 1;
                return Ok(());
            }
            Ok(OracleAnswer::RateLimited) => {
                warn!(
                    order = %number,
                    pause_secs = self.cfg.rate_limit_pause.as_secs(),
                    "accrual service rate limit hit; pausing reconciler"
                );
                report.rate_limited += 1;
                if sleep_or_cancel(cancel, self.cfg.rate_limit_pause).await {
                    return Err(IterationHalt::Cancelled);
                }
                return Ok(());
            }
            Err(e) => {
                let class = e.class();
                return self.on_failure(class, anyhow::Error::new(e), Some(number), report);
            }
        };

        if let Err(msg) = check_reply(number, &reply) {
            return self.on_failure(FailureClass::Malformed, anyhow::anyhow!(msg), Some(number), report);
        }

        let transition = decide(local, reply.status, reply.accrual_or_zero());
        let (status, accrual) = match transition {
            Transition::Hold => {
                info!(order = %number, local = %local, remote = %reply.status, "order unchanged");
                report.unchanged += 1;
                return Ok(());
            }
            Transition::Advance { status, accrual } => (status, accrual),
        };

        // Not raced against cancellation: a started write always completes.
        match self.store.update_order_status(number, status, accrual).await {
            Ok(true) => {
                info!(
                    order = %number,
                    from = %local,
                    to = %status,
                    accrual = %accrual,
                    "order status updated"
                );
                report.updated += 1;
                Ok(())
            }
            Ok(false) => {
                warn!(order = %number, to = %status, "order already terminal in store; nothing written");
                report.unchanged += 1;
                Ok(())
            }
            Err(e) => self.on_failure(
                FailureClass::Store,
                e.context(format!("update order {number} to {status} failed")),
                Some(number),
                report,
            ),
        }
    }

    fn on_failure(
        &self,
        class: FailureClass,
        err: anyhow::Error,
        number: Option<&OrderNumber>,
        report: &mut IterationReport,
    ) -> Result<(), IterationHalt> {
        match self.cfg.policies.for_class(class) {
            FailurePolicy::Abort => Err(IterationHalt::Fatal(err)),
            FailurePolicy::Skip => {
                warn!(
                    class = class.as_str(),
                    order = number.map(|n| n.as_str()).unwrap_or("-"),
                    error = %format!("{err:#}"),
                    "reconcile failure skipped"
                );
                report.skipped_on_error += 1;
                Ok(())
            }
        }
    }
}

/// A 2xx body must name the order asked about and carry a non-negative
/// accrual the money columns hold exactly.
fn check_reply(number: &OrderNumber, reply: &AccrualReply) -> Result<(), String> {
    if reply.order != number.as_str() {
        return Err(format!(
            "accrual reply for order {} names order {:?}",
            number, reply.order
        ));
    }
    if reply.accrual_or_zero() < Decimal::ZERO {
        return Err(format!(
            "accrual reply for order {} has negative accrual {}",
            number,
            reply.accrual_or_zero()
        ));
    }
    if !fits_money_column(reply.accrual_or_zero()) {
        return Err(format!(
            "accrual reply for order {} has accrual {} outside numeric(12,2)",
            number,
            reply.accrual_or_zero()
        ));
    }
    Ok(())
}

/// Sleep for `d`; returns `true` if `cancel` fired first.
async fn sleep_or_cancel(cancel: &CancellationToken, d: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(d) => false,
    }
}
