//! gm-accrual
//!
//! HTTP client for the external accrual service.
//!
//! `GET {base}/api/orders/{number}` answers:
//! - 2xx (not 204): JSON `{"order", "status", "accrual"}`
//! - 204: order not registered yet
//! - 429: rate limited
//! - 500: transient failure
//!
//! Every other status and every transport failure is an [`OracleError`];
//! the reconciler decides what that means.

use std::time::Duration;

use anyhow::{Context, Result};
use gm_reconcile::{AccrualOracle, OracleAnswer, OracleError};
use gm_schemas::{AccrualReply, OrderNumber};
use reqwest::StatusCode;
use tracing::debug;

/// Longest body excerpt kept in an error message.
const BODY_EXCERPT_LEN: usize = 256;

#[derive(Debug, Clone)]
pub struct HttpAccrualClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAccrualClient {
    /// `timeout` bounds each request end to end (connect + body).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build accrual http client")?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self, number: &OrderNumber) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }
}

#[async_trait::async_trait]
impl AccrualOracle for HttpAccrualClient {
    async fn fetch(&self, number: &OrderNumber) -> Result<OracleAnswer, OracleError> {
        let url = self.order_url(number);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Transport(format!("GET {url}: {e}")))?;

        let status = resp.status();
        debug!(order = %number, status = status.as_u16(), "accrual response");

        match status {
            StatusCode::NO_CONTENT => return Ok(OracleAnswer::Unknown),
            StatusCode::TOO_MANY_REQUESTS => return Ok(OracleAnswer::RateLimited),
            StatusCode::INTERNAL_SERVER_ERROR => return Ok(OracleAnswer::Unavailable),
            _ => {}
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| OracleError::Transport(format!("read body of GET {url}: {e}")))?;

        if !status.is_success() {
            return Err(OracleError::UnexpectedStatus {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let reply: AccrualReply = serde_json::from_slice(&body)
            .map_err(|e| OracleError::Decode(format!("{e}; body={}", excerpt(&body))))?;
        Ok(OracleAnswer::Reply(reply))
    }
}

fn excerpt(body: &[u8]) -> String {
    let s = String::from_utf8_lossy(body);
    match s.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_url_joins_without_double_slash() {
        let c = HttpAccrualClient::with_client(reqwest::Client::new(), "http://accrual:8081/");
        let n = OrderNumber::parse("79927398713").unwrap();
        assert_eq!(c.order_url(&n), "http://accrual:8081/api/orders/79927398713");
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let long = "x".repeat(BODY_EXCERPT_LEN + 10);
        let e = excerpt(long.as_bytes());
        assert!(e.ends_with("..."));
        assert_eq!(e.len(), BODY_EXCERPT_LEN + 3);
        assert_eq!(excerpt(b"short"), "short");
    }
}
