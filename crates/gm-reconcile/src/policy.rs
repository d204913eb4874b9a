//! Transition policy: compare the local status with the oracle's view.
//!
//! | local              | remote      | action                         |
//! |--------------------|-------------|--------------------------------|
//! | NEW                | REGISTERED  | hold                           |
//! | NEW                | PROCESSING  | PROCESSING, accrual 0          |
//! | NEW / PROCESSING   | PROCESSED   | PROCESSED, remote accrual      |
//! | PROCESSING         | PROCESSING  | hold                           |
//! | PROCESSING         | REGISTERED  | hold (remote regression)       |
//! | NEW / PROCESSING   | INVALID     | INVALID, accrual 0             |
//! | PROCESSED/INVALID  | anything    | hold                           |
//!
//! Deterministic, pure logic.

use gm_schemas::{AccrualStatus, OrderStatus};
use rust_decimal::Decimal;

use crate::types::Transition;

pub fn decide(local: OrderStatus, remote: AccrualStatus, accrual: Decimal) -> Transition {
    if local.is_terminal() {
        return Transition::Hold;
    }
    match (local, remote) {
        (_, AccrualStatus::Invalid) => Transition::Advance {
            status: OrderStatus::Invalid,
            accrual: Decimal::ZERO,
        },
        (_, AccrualStatus::Processed) => Transition::Advance {
            status: OrderStatus::Processed,
            accrual,
        },
        (OrderStatus::New, AccrualStatus::Processing) => Transition::Advance {
            status: OrderStatus::Processing,
            accrual: Decimal::ZERO,
        },
        _ => Transition::Hold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const LOCALS: [OrderStatus; 4] = [
        OrderStatus::New,
        OrderStatus::Processing,
        OrderStatus::Invalid,
        OrderStatus::Processed,
    ];
    const REMOTES: [AccrualStatus; 4] = [
        AccrualStatus::Registered,
        AccrualStatus::Processing,
        AccrualStatus::Invalid,
        AccrualStatus::Processed,
    ];

    fn rank(s: OrderStatus) -> u8 {
        match s {
            OrderStatus::New => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Invalid | OrderStatus::Processed => 2,
        }
    }

    #[test]
    fn new_order_follows_remote_forward() {
        assert_eq!(
            decide(OrderStatus::New, AccrualStatus::Registered, Decimal::ZERO),
            Transition::Hold
        );
        assert_eq!(
            decide(OrderStatus::New, AccrualStatus::Processing, dec!(7)),
            Transition::Advance {
                status: OrderStatus::Processing,
                accrual: Decimal::ZERO
            }
        );
        assert_eq!(
            decide(OrderStatus::New, AccrualStatus::Processed, dec!(500.12)),
            Transition::Advance {
                status: OrderStatus::Processed,
                accrual: dec!(500.12)
            }
        );
    }

    #[test]
    fn processing_order_ignores_regression_and_repeats() {
        assert!(decide(OrderStatus::Processing, AccrualStatus::Registered, Decimal::ZERO).is_hold());
        assert!(decide(OrderStatus::Processing, AccrualStatus::Processing, Decimal::ZERO).is_hold());
        assert_eq!(
            decide(OrderStatus::Processing, AccrualStatus::Processed, dec!(1.5)),
            Transition::Advance {
                status: OrderStatus::Processed,
                accrual: dec!(1.5)
            }
        );
    }

    #[test]
    fn invalid_always_zeroes_accrual() {
        for local in [OrderStatus::New, OrderStatus::Processing] {
            assert_eq!(
                decide(local, AccrualStatus::Invalid, dec!(99)),
                Transition::Advance {
                    status: OrderStatus::Invalid,
                    accrual: Decimal::ZERO
                }
            );
        }
    }

    #[test]
    fn terminal_orders_never_move() {
        for local in [OrderStatus::Invalid, OrderStatus::Processed] {
            for remote in REMOTES {
                assert!(decide(local, remote, dec!(10)).is_hold(), "{local} / {remote}");
            }
        }
    }

    #[test]
    fn no_pair_moves_an_order_backwards() {
        for local in LOCALS {
            for remote in REMOTES {
                if let Transition::Advance { status, .. } = decide(local, remote, dec!(3)) {
                    assert!(rank(status) > rank(local), "{local} -> {status}");
                }
            }
        }
    }

    #[test]
    fn applying_a_transition_then_the_same_reply_holds() {
        for local in LOCALS {
            for remote in REMOTES {
                if let Transition::Advance { status, .. } = decide(local, remote, dec!(3)) {
                    assert!(decide(status, remote, dec!(3)).is_hold(), "{status} / {remote}");
                }
            }
        }
    }
}
