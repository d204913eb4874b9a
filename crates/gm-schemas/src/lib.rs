//! gm-schemas
//!
//! Wire and domain types shared by the store, the accrual client, the
//! reconciler and the HTTP API. No IO lives here.
//!
//! Monetary amounts are `rust_decimal::Decimal` and travel as JSON numbers.

mod order_number;

pub use order_number::{luhn_valid, OrderNumber};

use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Local order status
// ---------------------------------------------------------------------------

/// Status of an order as persisted locally.
///
/// Moves forward only: `New -> Processing -> {Processed | Invalid}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(anyhow!("invalid order status: {}", other)),
        }
    }

    /// PROCESSED and INVALID are final; the reconciler never polls them again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Accrual oracle reply
// ---------------------------------------------------------------------------

/// Status reported by the external accrual service.
///
/// The service calls its initial state `REGISTERED`; older deployments
/// answer `NEW`, accepted as an alias.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    #[serde(alias = "NEW")]
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl AccrualStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccrualStatus::Registered => "REGISTERED",
            AccrualStatus::Processing => "PROCESSING",
            AccrualStatus::Invalid => "INVALID",
            AccrualStatus::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for AccrualStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `GET /api/orders/{number}` on the accrual service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccrualReply {
    pub order: String,
    pub status: AccrualStatus,
    /// Absent until the order is processed.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub accrual: Option<Decimal>,
}

impl AccrualReply {
    pub fn accrual_or_zero(&self) -> Decimal {
        self.accrual.unwrap_or(Decimal::ZERO)
    }
}

/// Largest exclusive magnitude the `numeric(12,2)` money columns hold.
pub const MONEY_LIMIT: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

/// True when `amount` is stored exactly: at most two decimal places and
/// below [`MONEY_LIMIT`] in magnitude.
pub fn fits_money_column(amount: Decimal) -> bool {
    amount.normalize().scale() <= 2 && amount.abs() < MONEY_LIMIT
}

// ---------------------------------------------------------------------------
// User-facing resources
// ---------------------------------------------------------------------------

/// An uploaded order as listed by `GET /api/user/orders`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub number: OrderNumber,
    pub status: OrderStatus,
    /// Only present once the order has been processed.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

impl Balance {
    pub fn zero() -> Self {
        Self {
            current: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub order: OrderNumber,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

/// Body of `POST /api/user/balance/withdraw`.
///
/// `order` stays a plain string so a Luhn failure can be answered with 422
/// rather than rejected by the JSON extractor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
}

/// Body of the register and login endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<REDACTED>")
            .finish()
    }
}
