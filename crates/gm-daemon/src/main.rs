//! gophermart entry point.
//!
//! Thin on purpose: load config, set up tracing, connect and migrate the
//! database, start the order reconciler, serve HTTP until a shutdown signal,
//! then stop the reconciler and wait for it. Handlers live in `routes.rs`.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gm_accrual::HttpAccrualClient;
use gm_config::{GophermartConfig, Overrides};
use gm_daemon::{auth::TokenSigner, routes, state};
use gm_db::PgStore;
use gm_reconcile::LoopExit;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};

/// Loyalty points service.
#[derive(Debug, Parser)]
#[command(name = "gophermart", version)]
struct Cli {
    /// Address to serve HTTP on (host:port). `RUN_ADDRESS` wins over this flag.
    #[arg(short = 'a', long = "address")]
    run_address: Option<String>,

    /// Postgres connection URI. `DATABASE_URI` wins over this flag.
    #[arg(short = 'd', long = "database-uri")]
    database_uri: Option<String>,

    /// Accrual service address. `ACCRUAL_SYSTEM_ADDRESS` wins over this flag.
    #[arg(short = 'r', long = "accrual-address")]
    accrual_address: Option<String>,

    /// Layered YAML config files, base first.
    #[arg(long = "config")]
    config: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    let paths: Vec<&str> = cli.config.iter().map(String::as_str).collect();
    let loaded = gm_config::load_layered_yaml(&paths).context("config load failed")?;
    let mut cfg = GophermartConfig::from_json(&loaded.config_json)?;

    init_tracing(&cfg.logging.level);

    let unused = gm_config::report_unused_keys(&loaded.config_json, gm_config::UnusedKeyPolicy::Warn)?;
    for key in &unused.unused_leaf_pointers {
        warn!(key = %key, "config key is not used");
    }
    info!(config_hash = %loaded.config_hash, files = ?paths, "config loaded");

    // env > flag > file > default
    cfg.apply(&Overrides {
        run_address: cli.run_address,
        database_uri: cli.database_uri,
        accrual_address: cli.accrual_address,
    });
    cfg.apply(&Overrides::from_env());

    let secrets = gm_config::resolve_secrets(&cfg)?;

    let pool = gm_db::connect(cfg.database_uri()?, cfg.database.max_connections).await?;
    gm_db::migrate(&pool).await?;
    let store = Arc::new(PgStore::new(pool));

    let oracle = Arc::new(HttpAccrualClient::new(
        cfg.accrual_base_url(),
        cfg.accrual_request_timeout(),
    )?);
    info!(accrual = %oracle.base_url(), "accrual client ready");

    let cancel = CancellationToken::new();
    let reconciler = state::spawn_order_reconciler(
        store.clone(),
        oracle,
        state::reconciler_config(&cfg),
        cancel.clone(),
    );

    let shared = Arc::new(
        state::AppState::new(store, TokenSigner::new(&secrets.token_secret, cfg.token_ttl()))
            .with_password_cost(cfg.password_cost()?),
    );

    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let listener = tokio::net::TcpListener::bind(&cfg.server.run_address)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.run_address))?;
    info!("gophermart listening on http://{}", cfg.server.run_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    info!("http server stopped; stopping order reconciler");
    cancel.cancel();
    match reconciler.await {
        Ok(LoopExit::Cancelled) => info!("order reconciler stopped"),
        Ok(LoopExit::Aborted(e)) => {
            error!(error = %format!("{e:#}"), "order reconciler had aborted")
        }
        Err(e) => error!(error = %e, "order reconciler task failed"),
    }

    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .init();
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
