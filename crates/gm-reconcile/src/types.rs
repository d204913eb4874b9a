use std::fmt;
use std::time::Duration;

use gm_schemas::{AccrualReply, OrderStatus};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Oracle answers
// ---------------------------------------------------------------------------

/// What the accrual service said about one order.
#[derive(Clone, Debug, PartialEq)]
pub enum OracleAnswer {
    /// 2xx with a decoded body.
    Reply(AccrualReply),
    /// 204: the service has not registered the order yet.
    Unknown,
    /// 429: back off before the next call.
    RateLimited,
    /// 500: transient failure on the service side.
    Unavailable,
}

/// Failures talking to the accrual service that are not protocol signals.
#[derive(Clone, Debug)]
pub enum OracleError {
    /// Connect failure, DNS, timeout, broken body stream.
    Transport(String),
    /// Body is not a valid reply.
    Decode(String),
    /// A status the protocol does not define (e.g. 404, 503).
    UnexpectedStatus { status: u16, body: String },
}

impl OracleError {
    pub fn class(&self) -> FailureClass {
        match self {
            OracleError::Transport(_) | OracleError::UnexpectedStatus { .. } => {
                FailureClass::Transport
            }
            OracleError::Decode(_) => FailureClass::Malformed,
        }
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Transport(msg) => write!(f, "accrual transport error: {msg}"),
            OracleError::Decode(msg) => write!(f, "accrual reply decode error: {msg}"),
            OracleError::UnexpectedStatus { status, body } => {
                write!(f, "accrual unexpected status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for OracleError {}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Outcome of the transition policy for one order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// No write.
    Hold,
    /// Persist `status` with `accrual`; PROCESSED credits the owner.
    Advance { status: OrderStatus, accrual: Decimal },
}

impl Transition {
    pub fn is_hold(&self) -> bool {
        matches!(self, Transition::Hold)
    }
}

// ---------------------------------------------------------------------------
// Failure policy
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Listing or persisting failed.
    Store,
    /// The oracle could not be reached or answered outside the protocol.
    Transport,
    /// The oracle answered 2xx with an unusable body.
    Malformed,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Store => "store",
            FailureClass::Transport => "transport",
            FailureClass::Malformed => "malformed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the loop. An operator or supervisor restarts the process.
    Abort,
    /// Log, leave the order (or the batch, for a failed listing) for the next cycle.
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailurePolicies {
    pub store: FailurePolicy,
    pub transport: FailurePolicy,
    pub malformed: FailurePolicy,
}

impl FailurePolicies {
    pub fn abort_all() -> Self {
        Self {
            store: FailurePolicy::Abort,
            transport: FailurePolicy::Abort,
            malformed: FailurePolicy::Abort,
        }
    }

    pub fn skip_all() -> Self {
        Self {
            store: FailurePolicy::Skip,
            transport: FailurePolicy::Skip,
            malformed: FailurePolicy::Skip,
        }
    }

    pub fn for_class(&self, class: FailureClass) -> FailurePolicy {
        match class {
            FailureClass::Store => self.store,
            FailureClass::Transport => self.transport,
            FailureClass::Malformed => self.malformed,
        }
    }
}

impl Default for FailurePolicies {
    fn default() -> Self {
        Self::abort_all()
    }
}

// ---------------------------------------------------------------------------
// Config + reports
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Sleep between iterations.
    pub poll_interval: Duration,
    /// Loop-wide pause after a 429.
    pub rate_limit_pause: Duration,
    pub policies: FailurePolicies,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            rate_limit_pause: Duration::from_secs(60),
            policies: FailurePolicies::default(),
        }
    }
}

/// Per-iteration counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Orders the oracle was asked about.
    pub polled: usize,
    /// Transitions written to the store.
    pub updated: usize,
    /// Replies that required no write (including stale updates refused by the store).
    pub unchanged: usize,
    pub unknown: usize,
    pub unavailable: usize,
    pub rate_limited: usize,
    /// Orders (or listings) dropped under a `Skip` policy.
    pub skipped_on_error: usize,
}

/// Why one iteration stopped early.
#[derive(Debug)]
pub enum IterationHalt {
    Cancelled,
    Fatal(anyhow::Error),
}

/// Why [`crate::OrderReconciler::run`] returned.
#[derive(Debug)]
pub enum LoopExit {
    Cancelled,
    Aborted(anyhow::Error),
}

impl LoopExit {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoopExit::Cancelled)
    }
}
