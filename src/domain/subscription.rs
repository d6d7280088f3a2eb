use super::SubscriptionTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

/// Local mirror of the user's billing-provider subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_product_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Active subscription as reported by the billing provider.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingSubscription {
    pub id: String,
    pub product_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            status: SubscriptionStatus::Inactive,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            stripe_product_id: None,
            current_period_start: None,
            current_period_end: None,
            updated_at: Utc::now(),
        }
    }

    pub fn tier(&self) -> SubscriptionTier {
        match self.status {
            SubscriptionStatus::Active => SubscriptionTier::Pro,
            SubscriptionStatus::Inactive => SubscriptionTier::Free,
        }
    }

    /// Fold what the billing provider currently reports into this record.
    ///
    /// Without an active subscription only the status (and the customer id,
    /// when known) changes; the last known product and period are kept for
    /// reference.
    pub fn apply_billing(
        &mut self,
        customer_id: Option<String>,
        active: Option<&BillingSubscription>,
    ) {
        if customer_id.is_some() {
            self.stripe_customer_id = customer_id;
        }

        match active {
            Some(sub) => {
                self.status = SubscriptionStatus::Active;
                self.stripe_subscription_id = Some(sub.id.clone());
                self.stripe_product_id = sub.product_id.clone();
                self.current_period_start = sub.current_period_start;
                self.current_period_end = sub.current_period_end;
            }
            None => self.status = SubscriptionStatus::Inactive,
        }

        self.updated_at = Utc::now();
    }
}
