use crate::domain::{Capacity, ConsumeDecision, CreditBucket, CreditState, SubscriptionTier};
use crate::infrastructure::{CreditRepository, RepositoryError};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MeteringError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("No credit record provisioned for user {0}")]
    NotProvisioned(Uuid),
    #[error("Credit record already provisioned for user {0}")]
    AlreadyProvisioned(Uuid),
}

/// Snapshot of a user's credits as reported by `check`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditReport {
    pub can_use_credit: bool,
    pub daily_credits_used: i32,
    pub monthly_credits_used: i32,
    pub subscription_tier: SubscriptionTier,
    pub available_daily_credits: i32,
    pub available_monthly_credits: i32,
}

impl CreditReport {
    fn new(state: &CreditState) -> Self {
        let capacity = state.capacity();
        let Capacity {
            available_daily,
            available_monthly,
        } = capacity;

        Self {
            can_use_credit: capacity.can_use_credit(),
            daily_credits_used: state.daily_credits_used,
            monthly_credits_used: state.monthly_credits_used,
            subscription_tier: state.subscription_tier,
            available_daily_credits: available_daily,
            available_monthly_credits: available_monthly,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    Granted {
        daily_credits_used: i32,
        monthly_credits_used: i32,
        subscription_tier: SubscriptionTier,
        bucket: CreditBucket,
    },
    Denied {
        needs_upgrade: bool,
    },
}

pub struct CreditService<R>
where
    R: CreditRepository,
{
    credit_repo: Arc<R>,
}

impl<R> CreditService<R>
where
    R: CreditRepository,
{
    pub fn new(credit_repo: Arc<R>) -> Self {
        Self { credit_repo }
    }

    pub async fn check(&self, user_id: Uuid) -> Result<CreditReport, MeteringError> {
        self.check_on(user_id, Utc::now().date_naive()).await
    }

    /// Report remaining capacity as of `today`, persisting any period
    /// rollover. Never spends a credit.
    pub async fn check_on(
        &self,
        user_id: Uuid,
        today: NaiveDate,
    ) -> Result<CreditReport, MeteringError> {
        let (report, rolled_over) = self
            .credit_repo
            .update_locked(user_id, |stored| {
                let current = stored.with_resets(today);
                let report = CreditReport::new(&current);
                let rolled_over = current.counters_differ(stored);
                (rolled_over.then_some(current), (report, rolled_over))
            })
            .await
            .map_err(|e| not_provisioned_if_missing(user_id, e))?;

        if rolled_over {
            info!(user_id = %user_id, "Credit periods rolled over");
        }

        Ok(report)
    }

    pub async fn consume(&self, user_id: Uuid) -> Result<ConsumeOutcome, MeteringError> {
        self.consume_on(user_id, Utc::now().date_naive()).await
    }

    /// Spend one credit as of `today`.
    ///
    /// Rollover, decision and increment happen while the row is locked, so
    /// concurrent calls for the same user queue up and each one decides
    /// against the counters the previous one left behind.
    pub async fn consume_on(
        &self,
        user_id: Uuid,
        today: NaiveDate,
    ) -> Result<ConsumeOutcome, MeteringError> {
        let outcome = self
            .credit_repo
            .update_locked(user_id, |stored| {
                // A rollover always frees capacity, so a denial never leaves
                // an unsaved reset behind.
                match stored.with_resets(today).consume() {
                    ConsumeDecision::Granted { state, bucket } => {
                        let outcome = ConsumeOutcome::Granted {
                            daily_credits_used: state.daily_credits_used,
                            monthly_credits_used: state.monthly_credits_used,
                            subscription_tier: state.subscription_tier,
                            bucket,
                        };
                        (Some(state), outcome)
                    }
                    ConsumeDecision::Denied { needs_upgrade } => {
                        (None, ConsumeOutcome::Denied { needs_upgrade })
                    }
                }
            })
            .await
            .map_err(|e| not_provisioned_if_missing(user_id, e))?;

        match &outcome {
            ConsumeOutcome::Granted {
                daily_credits_used,
                monthly_credits_used,
                bucket,
                ..
            } => info!(
                user_id = %user_id,
                bucket = %bucket,
                daily_used = daily_credits_used,
                monthly_used = monthly_credits_used,
                "Credit consumed"
            ),
            ConsumeOutcome::Denied { needs_upgrade } => info!(
                user_id = %user_id,
                needs_upgrade = needs_upgrade,
                "No credits available"
            ),
        }

        Ok(outcome)
    }

    /// Create the zeroed row a new account starts with.
    pub async fn provision(
        &self,
        user_id: Uuid,
        tier: SubscriptionTier,
    ) -> Result<CreditState, MeteringError> {
        let state = CreditState::new(user_id, tier, Utc::now().date_naive());

        match self.credit_repo.create(&state).await {
            Ok(()) => {
                info!(user_id = %user_id, tier = %tier, "Provisioned credits");
                Ok(state)
            }
            Err(RepositoryError::AlreadyExists(_)) => Err(MeteringError::AlreadyProvisioned(user_id)),
            Err(e) => Err(MeteringError::Repository(e)),
        }
    }

    /// Delete the user's credit row together with their subscription mirror.
    pub async fn remove(&self, user_id: Uuid) -> Result<(), MeteringError> {
        if !self.credit_repo.delete(user_id).await? {
            return Err(MeteringError::NotProvisioned(user_id));
        }

        info!(user_id = %user_id, "Removed credits");
        Ok(())
    }
}

fn not_provisioned_if_missing(user_id: Uuid, err: RepositoryError) -> MeteringError {
    match err {
        RepositoryError::NotFound(_) => MeteringError::NotProvisioned(user_id),
        e => MeteringError::Repository(e),
    }
}
