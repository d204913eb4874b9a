//! In-memory doubles for the persistence and accrual seams.
//!
//! No database, no network. Both doubles are deterministic and record what
//! was asked of them so scenario tests can assert on side effects.

mod memory_store;
mod scripted_oracle;

pub use memory_store::MemoryStore;
pub use scripted_oracle::{OracleCall, ScriptedOracle};

use gm_schemas::{luhn_valid, OrderNumber};

/// Append the check digit that makes `prefix` Luhn-valid.
///
/// Panics if `prefix` contains anything but ASCII digits.
pub fn order_number(prefix: &str) -> OrderNumber {
    assert!(
        prefix.bytes().all(|b| b.is_ascii_digit()),
        "order number prefix must be digits: {prefix:?}"
    );
    (0..10)
        .map(|d| format!("{prefix}{d}"))
        .find(|c| luhn_valid(c))
        .and_then(|c| OrderNumber::parse(&c).ok())
        .unwrap_or_else(|| panic!("no Luhn check digit for {prefix}"))
}
