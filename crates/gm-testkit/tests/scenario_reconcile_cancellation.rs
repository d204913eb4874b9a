//! Scenario: cancellation stops the loop at every wait point.
//!
//! 1. Cancelled before start: returns without touching the store.
//! 2. Cancelled during the poll-interval sleep.
//! 3. Cancelled during the rate-limit pause: no further oracle calls.
//! 4. A running loop keeps polling until the order settles.
//!
//! Runs on a paused Tokio clock.

use std::sync::Arc;
use std::time::Duration;

use gm_reconcile::{LoopExit, OracleAnswer, OrderReconciler, ReconcilerConfig};
use gm_schemas::{AccrualStatus, OrderStatus};
use gm_testkit::{order_number, MemoryStore, ScriptedOracle};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_touches_nothing() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let exit = OrderReconciler::new(store.clone(), oracle.clone(), ReconcilerConfig::default())
        .run(cancel)
        .await;

    assert!(exit.is_cancelled());
    assert_eq!(store.list_calls().await, 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_poll_sleep_exits_promptly() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::new());
    let cfg = ReconcilerConfig {
        poll_interval: Duration::from_secs(3600),
        ..ReconcilerConfig::default()
    };
    let cancel = CancellationToken::new();
    let handle = OrderReconciler::new(store.clone(), oracle.clone(), cfg).spawn(cancel.clone());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.list_calls().await, 1);

    cancel.cancel();
    let exit = handle.await.unwrap();
    assert!(exit.is_cancelled());
    assert_eq!(store.list_calls().await, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_rate_limit_pause_stops_calls() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::new());
    let limited = order_number("13");
    let later = order_number("23");
    store.seed_order("u", &limited, OrderStatus::New).await;
    store.seed_order("u", &later, OrderStatus::New).await;
    oracle.script(&limited, vec![Ok(OracleAnswer::RateLimited)]).await;
    oracle.reply(&later, AccrualStatus::Processed, Some(dec!(2))).await;

    let cancel = CancellationToken::new();
    let handle = OrderReconciler::new(store.clone(), oracle.clone(), ReconcilerConfig::default())
        .spawn(cancel.clone());

    tokio::time::sleep(Duration::from_secs(10)).await;
    cancel.cancel();

    let exit = handle.await.unwrap();
    assert!(matches!(exit, LoopExit::Cancelled));
    assert_eq!(oracle.calls().await.len(), 1);
    assert_eq!(store.update_calls().await, 0);
    assert_eq!(store.order_status(&later).await, Some(OrderStatus::New));
}

#[tokio::test(start_paused = true)]
async fn running_loop_follows_order_to_processed() {
    let store = Arc::new(MemoryStore::new());
    let oracle = Arc::new(ScriptedOracle::new());
    let n = order_number("33");
    store.seed_order("u", &n, OrderStatus::New).await;
    oracle
        .script(
            &n,
            vec![
                Ok(OracleAnswer::Unknown),
                Ok(ScriptedOracle::reply_for(&n, AccrualStatus::Registered, None)),
                Ok(ScriptedOracle::reply_for(&n, AccrualStatus::Processing, None)),
                Ok(ScriptedOracle::reply_for(&n, AccrualStatus::Processed, Some(dec!(12.34)))),
            ],
        )
        .await;

    let cancel = CancellationToken::new();
    let handle = OrderReconciler::new(store.clone(), oracle.clone(), ReconcilerConfig::default())
        .spawn(cancel.clone());

    // Four polls at a 2 s interval, plus slack.
    tokio::time::sleep(Duration::from_secs(30)).await;
    cancel.cancel();
    assert!(handle.await.unwrap().is_cancelled());

    assert_eq!(store.order_status(&n).await, Some(OrderStatus::Processed));
    assert_eq!(store.current_balance("u").await, dec!(12.34));
    assert_eq!(oracle.calls_for(&n).await, 4);
    assert_eq!(store.write_count().await, 2);
}
