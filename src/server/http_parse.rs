use crate::domain::SubscriptionTier;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CreditAction {
    Check,
    Consume,
}

pub(super) fn parse_credit_action(action: &str) -> Option<CreditAction> {
    match action {
        "check" => Some(CreditAction::Check),
        "consume" => Some(CreditAction::Consume),
        _ => None,
    }
}

/// Missing tier defaults to free, as on signup.
pub(super) fn parse_subscription_tier(tier: Option<&str>) -> Option<SubscriptionTier> {
    match tier {
        None => Some(SubscriptionTier::Free),
        Some(t) => SubscriptionTier::from_str(t).ok(),
    }
}
