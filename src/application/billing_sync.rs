use crate::domain::{BillingSubscription, Subscription, SubscriptionTier};
use crate::infrastructure::{
    BillingError, BillingProvider, CreditRepository, RepositoryError, SubscriptionRepository,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BillingSyncError {
    #[error("Billing provider error: {0}")]
    Billing(#[from] BillingError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of reconciling one user, as returned to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSummary {
    pub subscribed: bool,
    pub product_id: Option<String>,
    pub subscription_end: Option<DateTime<Utc>>,
}

impl From<&Subscription> for SubscriptionSummary {
    fn from(sub: &Subscription) -> Self {
        let subscribed = sub.tier() == SubscriptionTier::Pro;
        Self {
            subscribed,
            product_id: if subscribed { sub.stripe_product_id.clone() } else { None },
            subscription_end: if subscribed { sub.current_period_end } else { None },
        }
    }
}

/// Keeps the local subscription mirror and the credit tier in line with the
/// billing provider.
pub struct SubscriptionService<S, C, B>
where
    S: SubscriptionRepository,
    C: CreditRepository,
    B: BillingProvider,
{
    subscription_repo: Arc<S>,
    credit_repo: Arc<C>,
    billing: Arc<B>,
}

impl<S, C, B> SubscriptionService<S, C, B>
where
    S: SubscriptionRepository,
    C: CreditRepository,
    B: BillingProvider,
{
    pub fn new(subscription_repo: Arc<S>, credit_repo: Arc<C>, billing: Arc<B>) -> Self {
        Self {
            subscription_repo,
            credit_repo,
            billing,
        }
    }

    /// Look the user up by email with the billing provider and apply what
    /// it reports.
    pub async fn reconcile_user(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<SubscriptionSummary, BillingSyncError> {
        let customer = self.billing.find_customer_by_email(email).await?;

        let (customer_id, active) = match customer {
            Some(customer) => {
                let active = self.billing.active_subscription(&customer.id).await?;
                (Some(customer.id), active)
            }
            None => {
                info!(user_id = %user_id, "No billing customer, treating as free");
                (None, None)
            }
        };

        self.apply(user_id, customer_id, active).await
    }

    /// Periodic pass over every user already linked to a billing customer.
    ///
    /// Per-user failures are logged and skipped; returns how many users were
    /// reconciled.
    pub async fn reconcile_known_customers(&self) -> Result<usize, BillingSyncError> {
        let linked = self.subscription_repo.list_with_customer().await?;
        let mut reconciled = 0;

        for sub in &linked {
            let Some(customer_id) = sub.stripe_customer_id.clone() else {
                continue;
            };

            let result = match self.billing.active_subscription(&customer_id).await {
                Ok(active) => self.apply(sub.user_id, Some(customer_id), active).await,
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(_) => reconciled += 1,
                Err(BillingSyncError::Billing(BillingError::RateLimited)) => {
                    warn!("Rate limited by billing provider, stopping reconciliation pass");
                    break;
                }
                Err(e) => warn!(user_id = %sub.user_id, error = %e, "Failed to reconcile subscription"),
            }
        }

        info!(reconciled, total = linked.len(), "Subscription reconciliation pass finished");
        Ok(reconciled)
    }

    async fn apply(
        &self,
        user_id: Uuid,
        customer_id: Option<String>,
        active: Option<BillingSubscription>,
    ) -> Result<SubscriptionSummary, BillingSyncError> {
        let mut sub = self
            .subscription_repo
            .get(user_id)
            .await?
            .unwrap_or_else(|| Subscription::new(user_id));

        let previous_tier = sub.tier();
        sub.apply_billing(customer_id, active.as_ref());

        // The credit row comes first; the subscription mirror references it.
        self.credit_repo
            .upsert_tier(user_id, sub.tier(), Utc::now().date_naive())
            .await?;
        self.subscription_repo.upsert(&sub).await?;

        if previous_tier != sub.tier() {
            info!(
                user_id = %user_id,
                from = %previous_tier,
                to = %sub.tier(),
                "Subscription tier changed"
            );
        }

        Ok(SubscriptionSummary::from(&sub))
    }
}
