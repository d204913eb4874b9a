//! Axum router and all HTTP handlers for the gophermart daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! tracing. Gzip request and response bodies are part of the API, so the
//! compression layers live here and the scenario tests in `tests/` see them.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use gm_db::{RegisterOutcome, SubmitOutcome, WithdrawOutcome};
use gm_schemas::{fits_money_column, Credentials, OrderNumber, WithdrawRequest};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tower_http::{compression::CompressionLayer, decompression::RequestDecompressionLayer};
use tracing::{error, info, warn};

use crate::{
    api_types::{ErrorResponse, HealthResponse},
    auth::{hash_password, verify_password, AuthUser},
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/user/register", post(register))
        .route("/api/user/login", post(login))
        .route("/api/user/orders", post(submit_order).get(list_orders))
        .route("/api/user/balance", get(balance))
        .route("/api/user/balance/withdraw", post(withdraw))
        .route("/api/user/withdrawals", get(list_withdrawals))
        .layer(CompressionLayer::new().gzip(true))
        .layer(RequestDecompressionLayer::new().gzip(true))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: msg.into() })).into_response()
}

/// Log the full chain, answer 500 without internals.
fn internal(op: &str, e: anyhow::Error) -> Response {
    error!(op, error = %format!("{e:#}"), "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("malformed request: {e}")))
}

/// 200 with `Authorization: Bearer <token>` for `login`.
fn token_response(st: &AppState, login: &str) -> Response {
    let token = match st.tokens.issue(login) {
        Ok(t) => t,
        Err(e) => return internal("issue_token", e),
    };
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(v) => (StatusCode::OK, [(header::AUTHORIZATION, v)]).into_response(),
        Err(e) => internal("issue_token", anyhow::Error::new(e)),
    }
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /api/user/register
// ---------------------------------------------------------------------------

pub(crate) async fn register(State(st): State<Arc<AppState>>, body: Bytes) -> Response {
    let creds: Credentials = match parse_json(&body) {
        Ok(c) => c,
        Err(r) => return r,
    };
    let login = creds.login.trim();
    if login.is_empty() || creds.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "login and password are required");
    }

    let (password, cost) = (creds.password.clone(), st.password_cost);
    let digest = match tokio::task::spawn_blocking(move || hash_password(&password, cost)).await {
        Ok(Ok(d)) => d,
        Ok(Err(e)) => return internal("register", e),
        Err(e) => return internal("register", anyhow::Error::new(e)),
    };

    match st.store.register_user(login, &digest).await {
        Ok(RegisterOutcome::Created) => {
            info!(login, "user registered");
            token_response(&st, login)
        }
        Ok(RegisterOutcome::LoginTaken) => {
            error_response(StatusCode::CONFLICT, "login already taken")
        }
        Err(e) => internal("register", e),
    }
}

// ---------------------------------------------------------------------------
// POST /api/user/login
// ---------------------------------------------------------------------------

pub(crate) async fn login(State(st): State<Arc<AppState>>, body: Bytes) -> Response {
    let creds: Credentials = match parse_json(&body) {
        Ok(c) => c,
        Err(r) => return r,
    };
    let login = creds.login.trim();
    if login.is_empty() || creds.password.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "login and password are required");
    }

    let stored = match st.store.password_hash(login).await {
        Ok(s) => s,
        Err(e) => return internal("login", e),
    };
    let matches = match stored {
        Some(h) => {
            let password = creds.password.clone();
            match tokio::task::spawn_blocking(move || verify_password(&password, &h)).await {
                Ok(m) => m,
                Err(e) => return internal("login", anyhow::Error::new(e)),
            }
        }
        None => false,
    };
    if matches {
        token_response(&st, login)
    } else {
        warn!(login, "login rejected");
        error_response(StatusCode::UNAUTHORIZED, "invalid login or password")
    }
}

// ---------------------------------------------------------------------------
// POST /api/user/orders  (text/plain order number)
// ---------------------------------------------------------------------------

pub(crate) async fn submit_order(
    State(st): State<Arc<AppState>>,
    AuthUser(login): AuthUser,
    body: Bytes,
) -> Response {
    let raw = match std::str::from_utf8(&body) {
        Ok(s) => s.trim(),
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "body must be text"),
    };
    if raw.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "order number is required");
    }
    let number = match OrderNumber::parse(raw) {
        Ok(n) => n,
        Err(e) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };

    match st.store.submit_order(&login, &number, Utc::now()).await {
        Ok(SubmitOutcome::Accepted) => {
            info!(login = %login, order = %number, "order accepted");
            StatusCode::ACCEPTED.into_response()
        }
        Ok(SubmitOutcome::AlreadyOwned) => StatusCode::OK.into_response(),
        Ok(SubmitOutcome::OwnedByAnother) => error_response(
            StatusCode::CONFLICT,
            "order number already uploaded by another user",
        ),
        Err(e) => internal("submit_order", e),
    }
}

// ---------------------------------------------------------------------------
// GET /api/user/orders
// ---------------------------------------------------------------------------

pub(crate) async fn list_orders(
    State(st): State<Arc<AppState>>,
    AuthUser(login): AuthUser,
) -> Response {
    match st.store.orders_for_user(&login).await {
        Ok(orders) if orders.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(orders) => (StatusCode::OK, Json(orders)).into_response(),
        Err(e) => internal("list_orders", e),
    }
}

// ---------------------------------------------------------------------------
// GET /api/user/balance
// ---------------------------------------------------------------------------

pub(crate) async fn balance(
    State(st): State<Arc<AppState>>,
    AuthUser(login): AuthUser,
) -> Response {
    match st.store.balance(&login).await {
        Ok(b) => (StatusCode::OK, Json(b)).into_response(),
        Err(e) => internal("balance", e),
    }
}

// ---------------------------------------------------------------------------
// POST /api/user/balance/withdraw
// ---------------------------------------------------------------------------

pub(crate) async fn withdraw(
    State(st): State<Arc<AppState>>,
    AuthUser(login): AuthUser,
    body: Bytes,
) -> Response {
    let req: WithdrawRequest = match parse_json(&body) {
        Ok(r) => r,
        Err(r) => return r,
    };
    let number = match OrderNumber::parse(&req.order) {
        Ok(n) => n,
        Err(e) => return error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };
    if req.sum <= Decimal::ZERO {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "sum must be positive");
    }
    if !fits_money_column(req.sum) {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "sum must have at most two decimal places and stay below 10000000000",
        );
    }

    match st.store.withdraw(&login, &number, req.sum, Utc::now()).await {
        Ok(WithdrawOutcome::Completed) => {
            info!(login = %login, order = %number, sum = %req.sum, "points withdrawn");
            StatusCode::OK.into_response()
        }
        Ok(WithdrawOutcome::InsufficientFunds) => {
            error_response(StatusCode::PAYMENT_REQUIRED, "insufficient funds")
        }
        Ok(WithdrawOutcome::DuplicateOrder) => error_response(
            StatusCode::CONFLICT,
            "order number already used for a withdrawal",
        ),
        Err(e) => internal("withdraw", e),
    }
}

// ---------------------------------------------------------------------------
// GET /api/user/withdrawals
// ---------------------------------------------------------------------------

pub(crate) async fn list_withdrawals(
    State(st): State<Arc<AppState>>,
    AuthUser(login): AuthUser,
) -> Response {
    match st.store.withdrawals_for_user(&login).await {
        Ok(list) if list.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => internal("list_withdrawals", e),
    }
}
