use crate::domain::{CreditState, Subscription, SubscriptionStatus, SubscriptionTier};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[async_trait]
pub trait CreditRepository: Send + Sync {
    /// Insert a new row. Fails with `AlreadyExists` if the user has one.
    #[must_use]
    async fn create(&self, state: &CreditState) -> Result<(), RepositoryError>;
    /// Read the user's row under a row lock and hand it to `decide`.
    ///
    /// When `decide` returns a replacement row it is written (bumping
    /// `version`) before the lock is released. Calls for the same user run
    /// one after another. A missing row is `NotFound` and nothing is written.
    #[must_use]
    async fn update_locked<F, T>(&self, user_id: Uuid, decide: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&CreditState) -> (Option<CreditState>, T) + Send,
        T: Send;
    /// Set the tier, creating a zeroed row dated `today` if none exists.
    #[must_use]
    async fn upsert_tier(
        &self,
        user_id: Uuid,
        tier: SubscriptionTier,
        today: NaiveDate,
    ) -> Result<(), RepositoryError>;
    /// Delete the row; the subscription mirror goes with it.
    ///
    /// Returns `false` if there was nothing to delete.
    #[must_use]
    async fn delete(&self, user_id: Uuid) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    #[must_use]
    async fn get(&self, user_id: Uuid) -> Result<Option<Subscription>, RepositoryError>;
    #[must_use]
    async fn upsert(&self, subscription: &Subscription) -> Result<(), RepositoryError>;
    /// Subscriptions linked to a billing customer, for the periodic pass.
    #[must_use]
    async fn list_with_customer(&self) -> Result<Vec<Subscription>, RepositoryError>;
}

pub struct PostgresCreditRepository {
    pool: PgPool,
}

impl PostgresCreditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditRepository for PostgresCreditRepository {
    async fn create(&self, state: &CreditState) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_credits (user_id, daily_credits_used, monthly_credits_used,
                                      subscription_type, last_daily_reset, last_monthly_reset,
                                      version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(state.user_id)
        .bind(state.daily_credits_used)
        .bind(state.monthly_credits_used)
        .bind(state.subscription_tier.to_string())
        .bind(state.last_daily_reset)
        .bind(state.last_monthly_reset)
        .bind(state.version)
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::AlreadyExists(format!(
                "Credits for {}",
                state.user_id
            )));
        }

        Ok(())
    }

    async fn update_locked<F, T>(&self, user_id: Uuid, decide: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&CreditState) -> (Option<CreditState>, T) + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT user_id, daily_credits_used, monthly_credits_used, subscription_type,
                   last_daily_reset, last_monthly_reset, version, created_at, updated_at
            FROM user_credits
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Credits for {}", user_id)))?;

        let stored = row_to_credit_state(&row)?;
        let (next, outcome) = decide(&stored);

        if let Some(next) = next {
            sqlx::query(
                r#"
                UPDATE user_credits
                SET daily_credits_used = $1,
                    monthly_credits_used = $2,
                    last_daily_reset = $3,
                    last_monthly_reset = $4,
                    version = version + 1,
                    updated_at = $5
                WHERE user_id = $6
                "#,
            )
            .bind(next.daily_credits_used)
            .bind(next.monthly_credits_used)
            .bind(next.last_daily_reset)
            .bind(next.last_monthly_reset)
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn upsert_tier(
        &self,
        user_id: Uuid,
        tier: SubscriptionTier,
        today: NaiveDate,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO user_credits (user_id, subscription_type, last_daily_reset, last_monthly_reset)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET subscription_type = EXCLUDED.subscription_type,
                version = user_credits.version + 1,
                updated_at = NOW()
            WHERE user_credits.subscription_type <> EXCLUDED.subscription_type
            "#,
        )
        .bind(user_id)
        .bind(tier.to_string())
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, user_id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM user_credits WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_credit_state(row: &sqlx::postgres::PgRow) -> Result<CreditState, RepositoryError> {
    let tier_str: String = row.try_get("subscription_type")?;

    Ok(CreditState {
        user_id: row.try_get("user_id")?,
        daily_credits_used: row.try_get("daily_credits_used")?,
        monthly_credits_used: row.try_get("monthly_credits_used")?,
        subscription_tier: SubscriptionTier::from_str(&tier_str)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown tier: {}", tier_str)))?,
        last_daily_reset: row.try_get("last_daily_reset")?,
        last_monthly_reset: row.try_get("last_monthly_reset")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn get(&self, user_id: Uuid) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, status, stripe_customer_id, stripe_subscription_id, stripe_product_id,
                   current_period_start, current_period_end, updated_at
            FROM subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_subscription).transpose()
    }

    async fn upsert(&self, subscription: &Subscription) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, status, stripe_customer_id, stripe_subscription_id,
                                       stripe_product_id, current_period_start, current_period_end,
                                       updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE
            SET status = EXCLUDED.status,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                stripe_product_id = EXCLUDED.stripe_product_id,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(subscription.user_id)
        .bind(subscription.status.to_string())
        .bind(&subscription.stripe_customer_id)
        .bind(&subscription.stripe_subscription_id)
        .bind(&subscription.stripe_product_id)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_with_customer(&self) -> Result<Vec<Subscription>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, status, stripe_customer_id, stripe_subscription_id, stripe_product_id,
                   current_period_start, current_period_end, updated_at
            FROM subscriptions
            WHERE stripe_customer_id IS NOT NULL
            ORDER BY updated_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_subscription).collect()
    }
}

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Result<Subscription, RepositoryError> {
    let status_str: String = row.try_get("status")?;

    Ok(Subscription {
        user_id: row.try_get("user_id")?,
        status: SubscriptionStatus::from_str(&status_str)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown status: {}", status_str)))?,
        stripe_customer_id: row.try_get("stripe_customer_id")?,
        stripe_subscription_id: row.try_get("stripe_subscription_id")?,
        stripe_product_id: row.try_get("stripe_product_id")?,
        current_period_start: row.try_get("current_period_start")?,
        current_period_end: row.try_get("current_period_end")?,
        updated_at: row.try_get("updated_at")?,
    })
}
