//! HTTP server support (standalone + embeddable).
//!
//! - **Standalone**: `credit-meter-server` binary calls `run()`
//! - **Embedded**: host Axum app calls `router(state)` (and may nest it)

mod http;
mod http_auth;
mod http_errors;
mod http_parse;
mod http_types;
mod state;

pub use http::router;
pub use state::{
    build_state_from_env, build_state_with_pool, AppState, CreditServiceType,
    SubscriptionServiceType,
};

use crate::infrastructure::AppConfig;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Standalone entrypoint for the `credit-meter-server` binary.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("load config")?;
    let state = build_state_from_env(config.clone()).await?;

    // Held for the lifetime of the server; dropping it stops the jobs.
    let _scheduler = match state.subscriptions.clone() {
        Some(subscriptions) if !config.reconcile_schedule.is_empty() => {
            Some(start_reconciliation(&config.reconcile_schedule, subscriptions).await?)
        }
        _ => None,
    };

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("parse listen address")?;
    let listener = TcpListener::bind(addr).await.context("bind listener")?;

    info!(
        host = %config.server_host,
        port = config.server_port,
        "Server running"
    );
    info!(
        docs = %format!("http://{}:{}/docs", config.server_host, config.server_port),
        "API docs"
    );

    let app = router(state);
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}

async fn start_reconciliation(
    schedule: &str,
    subscriptions: Arc<SubscriptionServiceType>,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| anyhow::anyhow!("create scheduler: {e:?}"))?;

    let job = Job::new_async(schedule, move |_id, _lock| {
        let subscriptions = subscriptions.clone();
        Box::pin(async move {
            match subscriptions.reconcile_known_customers().await {
                Ok(count) => info!(reconciled = count, "Scheduled subscription reconciliation finished"),
                Err(e) => warn!(error = %e, "Scheduled subscription reconciliation failed"),
            }
        })
    })
    .map_err(|e| anyhow::anyhow!("invalid reconcile schedule {schedule:?}: {e:?}"))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| anyhow::anyhow!("register reconciliation job: {e:?}"))?;
    scheduler
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("start scheduler: {e:?}"))?;

    info!(schedule = %schedule, "Subscription reconciliation scheduled");
    Ok(scheduler)
}
