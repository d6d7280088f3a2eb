use crate::application::{ConsumeOutcome, CreditReport, SubscriptionSummary};
use crate::domain::CreditState;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub(super) struct HealthResponse {
    pub(super) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) error: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub(super) struct RemovedUserResponse {
    #[schema(example = "removed")]
    pub(super) status: String,
}

#[derive(Serialize, ToSchema)]
pub(super) struct ErrorResponse {
    #[schema(example = "Missing or invalid authorization token")]
    pub(super) error: String,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct CreditActionRequest {
    #[schema(example = "consume")]
    pub(super) action: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct CheckCreditsResponse {
    pub(super) can_use_credit: bool,
    pub(super) daily_credits_used: i32,
    pub(super) monthly_credits_used: i32,
    #[schema(example = "free")]
    pub(super) subscription_type: String,
    pub(super) available_daily_credits: i32,
    pub(super) available_monthly_credits: i32,
}

impl From<CreditReport> for CheckCreditsResponse {
    fn from(report: CreditReport) -> Self {
        Self {
            can_use_credit: report.can_use_credit,
            daily_credits_used: report.daily_credits_used,
            monthly_credits_used: report.monthly_credits_used,
            subscription_type: report.subscription_tier.to_string(),
            available_daily_credits: report.available_daily_credits,
            available_monthly_credits: report.available_monthly_credits,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConsumeGrantedResponse {
    pub(super) success: bool,
    pub(super) daily_credits_used: i32,
    pub(super) monthly_credits_used: i32,
    pub(super) subscription_type: String,
}

/// 200 body of `/credits/actions`; which one depends on the action.
///
/// Only referenced by the OpenAPI document.
#[allow(dead_code)]
#[derive(Serialize, ToSchema)]
#[serde(untagged)]
pub(super) enum CreditActionResponse {
    Check(CheckCreditsResponse),
    Consume(ConsumeGrantedResponse),
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct ConsumeDeniedResponse {
    pub(super) success: bool,
    #[schema(example = "No credits available")]
    pub(super) message: String,
    pub(super) needs_upgrade: bool,
}

pub(super) const NO_CREDITS_MESSAGE: &str = "No credits available";

/// JSON body for a consume outcome; granted and denied share the endpoint.
pub(super) fn consume_body(outcome: ConsumeOutcome) -> serde_json::Value {
    match outcome {
        ConsumeOutcome::Granted {
            daily_credits_used,
            monthly_credits_used,
            subscription_tier,
            ..
        } => serde_json::json!(ConsumeGrantedResponse {
            success: true,
            daily_credits_used,
            monthly_credits_used,
            subscription_type: subscription_tier.to_string(),
        }),
        ConsumeOutcome::Denied { needs_upgrade } => serde_json::json!(ConsumeDeniedResponse {
            success: false,
            message: NO_CREDITS_MESSAGE.to_string(),
            needs_upgrade,
        }),
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct SubscriptionResponse {
    pub(super) subscribed: bool,
    #[schema(example = "prod_123")]
    pub(super) product_id: Option<String>,
    pub(super) subscription_end: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<SubscriptionSummary> for SubscriptionResponse {
    fn from(summary: SubscriptionSummary) -> Self {
        Self {
            subscribed: summary.subscribed,
            product_id: summary.product_id,
            subscription_end: summary.subscription_end,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct ProvisionUserRequest {
    pub(super) user_id: Uuid,
    #[serde(default)]
    #[schema(example = "free")]
    pub(super) tier: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub(super) struct ProvisionedUserResponse {
    pub(super) user_id: Uuid,
    pub(super) subscription_type: String,
    pub(super) last_daily_reset: chrono::NaiveDate,
}

impl From<CreditState> for ProvisionedUserResponse {
    fn from(state: CreditState) -> Self {
        Self {
            user_id: state.user_id,
            subscription_type: state.subscription_tier.to_string(),
            last_daily_reset: state.last_daily_reset,
        }
    }
}
