//! Scenario: a 429 pauses the whole loop.
//!
//! 1. After a 429 the next oracle call happens no sooner than the pause.
//! 2. The rate-limited order is not written and is retried next cycle.
//! 3. The rest of the batch is still handled after the pause.
//!
//! Runs on a paused Tokio clock; no real time passes.

use std::sync::Arc;
use std::time::Duration;

use gm_reconcile::{OracleAnswer, OrderReconciler, ReconcilerConfig};
use gm_schemas::{AccrualStatus, OrderStatus};
use gm_testkit::{order_number, MemoryStore, ScriptedOracle};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn rate_limit_pauses_then_continues_batch() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::new());

    let limited = order_number("10");
    let next = order_number("20");
    store.seed_order("u", &limited, OrderStatus::New).await;
    store.seed_order("u", &next, OrderStatus::New).await;

    oracle
        .script(
            &limited,
            vec![
                Ok(OracleAnswer::RateLimited),
                Ok(ScriptedOracle::reply_for(&limited, AccrualStatus::Processed, Some(dec!(3)))),
            ],
        )
        .await;
    oracle.reply(&next, AccrualStatus::Processed, Some(dec!(7))).await;

    let cfg = ReconcilerConfig::default();
    let pause = cfg.rate_limit_pause;
    assert_eq!(pause, Duration::from_secs(60));
    let r = OrderReconciler::new(store.clone(), oracle.clone(), cfg);
    let cancel = CancellationToken::new();

    let report = r.run_iteration(&cancel).await.unwrap();
    assert_eq!(report.rate_limited, 1);
    assert_eq!(report.updated, 1);

    let calls = oracle.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].order, limited);
    assert_eq!(calls[1].order, next);
    assert!(
        calls[1].at.duration_since(calls[0].at) >= pause,
        "second call came {:?} after the 429",
        calls[1].at.duration_since(calls[0].at)
    );

    assert_eq!(store.order_status(&limited).await, Some(OrderStatus::New));
    assert_eq!(store.order_status(&next).await, Some(OrderStatus::Processed));

    // Next cycle retries the rate-limited order.
    let again = r.run_iteration(&cancel).await.unwrap();
    assert_eq!(again.polled, 1);
    assert_eq!(again.updated, 1);
    assert_eq!(store.order_status(&limited).await, Some(OrderStatus::Processed));
    assert_eq!(store.current_balance("u").await, dec!(10));
}

#[tokio::test(start_paused = true)]
async fn unavailable_does_not_pause() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::new());

    let down = order_number("30");
    let next = order_number("40");
    store.seed_order("u", &down, OrderStatus::New).await;
    store.seed_order("u", &next, OrderStatus::New).await;
    oracle.script(&down, vec![Ok(OracleAnswer::Unavailable)]).await;
    oracle.reply(&next, AccrualStatus::Processing, None).await;

    let r = OrderReconciler::new(store.clone(), oracle.clone(), ReconcilerConfig::default());
    let report = r.run_iteration(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.unavailable, 1);
    assert_eq!(report.updated, 1);
    let calls = oracle.calls().await;
    assert!(calls[1].at.duration_since(calls[0].at) < Duration::from_secs(1));
    assert_eq!(store.order_status(&down).await, Some(OrderStatus::New));
}
