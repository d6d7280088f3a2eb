use crate::application::{CreditService, SubscriptionService};
use crate::infrastructure::{
    AppConfig, PostgresCreditRepository, PostgresSubscriptionRepository, StripeClient,
    TokenVerifier,
};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub type CreditServiceType = CreditService<PostgresCreditRepository>;

pub type SubscriptionServiceType =
    SubscriptionService<PostgresSubscriptionRepository, PostgresCreditRepository, StripeClient>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub verifier: Arc<TokenVerifier>,
    pub admin_token: Arc<str>,
    pub credits: Arc<CreditServiceType>,
    /// `None` when no billing key is configured.
    pub subscriptions: Option<Arc<SubscriptionServiceType>>,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    config.validate().context("validate config")?;

    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let credit_repo = Arc::new(PostgresCreditRepository::new(pool.clone()));
    let subscription_repo = Arc::new(PostgresSubscriptionRepository::new(pool.clone()));

    let credits = Arc::new(CreditService::new(credit_repo.clone()));

    let subscriptions = match config.stripe_secret_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            let stripe = Arc::new(
                StripeClient::new(key, config.stripe_api_base.clone())
                    .context("init Stripe client")?,
            );
            Some(Arc::new(SubscriptionService::new(
                subscription_repo,
                credit_repo,
                stripe,
            )))
        }
        None => {
            info!("No Stripe key configured, subscription reconciliation disabled");
            None
        }
    };

    Ok(AppState {
        pool,
        verifier: Arc::new(TokenVerifier::new(&config.jwt_secret, &config.jwt_audience)),
        admin_token: Arc::from(config.admin_token.as_str()),
        credits,
        subscriptions,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
