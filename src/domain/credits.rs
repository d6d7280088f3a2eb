use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Credits every user may spend per calendar day, regardless of tier.
pub const DAILY_CREDIT_CEILING: i32 = 5;

/// Credits a `pro` subscription adds per calendar month.
pub const PRO_MONTHLY_CREDIT_CEILING: i32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Pro,
}

impl SubscriptionTier {
    pub fn daily_ceiling(self) -> i32 {
        DAILY_CREDIT_CEILING
    }

    pub fn monthly_ceiling(self) -> i32 {
        match self {
            SubscriptionTier::Free => 0,
            SubscriptionTier::Pro => PRO_MONTHLY_CREDIT_CEILING,
        }
    }
}

/// Which counter a granted credit was charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CreditBucket {
    Daily,
    Monthly,
}

/// Per-user credit row.
///
/// `version` is bumped by the store on every successful write and is what
/// the compare-and-write in the repository keys on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditState {
    pub user_id: Uuid,
    pub daily_credits_used: i32,
    pub monthly_credits_used: i32,
    pub subscription_tier: SubscriptionTier,
    pub last_daily_reset: NaiveDate,
    pub last_monthly_reset: NaiveDate,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub available_daily: i32,
    pub available_monthly: i32,
}

impl Capacity {
    pub fn can_use_credit(&self) -> bool {
        self.available_daily + self.available_monthly > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeDecision {
    /// `state` is the row to persist: resets applied, one counter incremented.
    Granted {
        state: CreditState,
        bucket: CreditBucket,
    },
    Denied {
        needs_upgrade: bool,
    },
}

impl CreditState {
    /// Fresh row for a newly signed-up user.
    pub fn new(user_id: Uuid, tier: SubscriptionTier, today: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            daily_credits_used: 0,
            monthly_credits_used: 0,
            subscription_tier: tier,
            last_daily_reset: today,
            last_monthly_reset: today,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Zero the counters whose period has rolled over since their last reset.
    ///
    /// Pure: applying it twice for the same `today` is the same as applying
    /// it once. Monthly usage only rolls over for `pro`.
    pub fn with_resets(&self, today: NaiveDate) -> CreditState {
        let mut next = self.clone();

        if next.last_daily_reset != today {
            next.daily_credits_used = 0;
            next.last_daily_reset = today;
        }

        if next.subscription_tier == SubscriptionTier::Pro
            && !same_month(next.last_monthly_reset, today)
        {
            next.monthly_credits_used = 0;
            next.last_monthly_reset = today;
        }

        next
    }

    pub fn capacity(&self) -> Capacity {
        let tier = self.subscription_tier;
        let available_monthly = match tier {
            SubscriptionTier::Pro => (tier.monthly_ceiling() - self.monthly_credits_used).max(0),
            SubscriptionTier::Free => 0,
        };

        Capacity {
            available_daily: (tier.daily_ceiling() - self.daily_credits_used).max(0),
            available_monthly,
        }
    }

    /// Decide whether one more credit can be spent.
    ///
    /// Expects a state that already went through [`CreditState::with_resets`].
    /// Pro accounts draw from the monthly allotment first and fall back to
    /// the daily one.
    pub fn consume(&self) -> ConsumeDecision {
        let capacity = self.capacity();
        if !capacity.can_use_credit() {
            return ConsumeDecision::Denied {
                needs_upgrade: self.subscription_tier == SubscriptionTier::Free,
            };
        }

        let mut state = self.clone();
        let bucket = if state.subscription_tier == SubscriptionTier::Pro
            && capacity.available_monthly > 0
        {
            state.monthly_credits_used += 1;
            CreditBucket::Monthly
        } else {
            state.daily_credits_used += 1;
            CreditBucket::Daily
        };

        ConsumeDecision::Granted { state, bucket }
    }

    /// True when the counters or reset dates differ, ignoring bookkeeping
    /// columns (`version`, timestamps).
    pub fn counters_differ(&self, other: &CreditState) -> bool {
        self.daily_credits_used != other.daily_credits_used
            || self.monthly_credits_used != other.monthly_credits_used
            || self.last_daily_reset != other.last_daily_reset
            || self.last_monthly_reset != other.last_monthly_reset
    }
}

fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn state(tier: SubscriptionTier, daily: i32, monthly: i32, today: NaiveDate) -> CreditState {
        let mut s = CreditState::new(Uuid::new_v4(), tier, today);
        s.daily_credits_used = daily;
        s.monthly_credits_used = monthly;
        s
    }

    #[test]
    fn same_day_leaves_daily_usage_alone() {
        let today = date(2025, 3, 14);
        for used in 0..=5 {
            let s = state(SubscriptionTier::Free, used, 0, today);
            let reset = s.with_resets(today);
            assert_eq!(reset.daily_credits_used, used);
            assert_eq!(reset.last_daily_reset, today);
        }
    }

    #[test]
    fn new_day_zeroes_daily_usage_and_stamps_today() {
        let today = date(2025, 3, 14);
        let mut s = state(SubscriptionTier::Free, 5, 0, today);
        s.last_daily_reset = date(2025, 3, 13);

        let reset = s.with_resets(today);
        assert_eq!(reset.daily_credits_used, 0);
        assert_eq!(reset.last_daily_reset, today);
    }

    #[test]
    fn monthly_rolls_over_only_for_pro() {
        let today = date(2025, 4, 1);

        let mut pro = state(SubscriptionTier::Pro, 0, 80, today);
        pro.last_monthly_reset = date(2025, 3, 31);
        let reset = pro.with_resets(today);
        assert_eq!(reset.monthly_credits_used, 0);
        assert_eq!(reset.last_monthly_reset, today);

        let mut free = state(SubscriptionTier::Free, 0, 80, today);
        free.last_monthly_reset = date(2025, 3, 31);
        let reset = free.with_resets(today);
        assert_eq!(reset.monthly_credits_used, 80);
        assert_eq!(reset.last_monthly_reset, date(2025, 3, 31));
    }

    #[test]
    fn monthly_compares_year_as_well_as_month() {
        let today = date(2025, 3, 10);
        let mut pro = state(SubscriptionTier::Pro, 0, 40, today);
        pro.last_monthly_reset = date(2024, 3, 10);
        assert_eq!(pro.with_resets(today).monthly_credits_used, 0);
    }

    #[test]
    fn pro_within_the_same_month_keeps_monthly_usage() {
        let today = date(2025, 3, 28);
        let mut pro = state(SubscriptionTier::Pro, 0, 40, today);
        pro.last_monthly_reset = date(2025, 3, 1);
        let reset = pro.with_resets(today);
        assert_eq!(reset.monthly_credits_used, 40);
        assert_eq!(reset.last_monthly_reset, date(2025, 3, 1));
    }

    #[test]
    fn resets_are_idempotent() {
        let today = date(2025, 6, 2);
        let mut s = state(SubscriptionTier::Pro, 3, 99, today);
        s.last_daily_reset = date(2025, 5, 30);
        s.last_monthly_reset = date(2025, 5, 1);

        let once = s.with_resets(today);
        let twice = once.with_resets(today);
        assert_eq!(once, twice);
    }

    #[test]
    fn capacity_for_each_tier() {
        let today = date(2025, 1, 1);

        let free = state(SubscriptionTier::Free, 2, 50, today).capacity();
        assert_eq!(free.available_daily, 3);
        assert_eq!(free.available_monthly, 0);
        assert!(free.can_use_credit());

        let pro = state(SubscriptionTier::Pro, 5, 30, today).capacity();
        assert_eq!(pro.available_daily, 0);
        assert_eq!(pro.available_monthly, 70);
        assert!(pro.can_use_credit());
    }

    #[test]
    fn capacity_never_goes_negative() {
        let today = date(2025, 1, 1);
        let over = state(SubscriptionTier::Pro, 9, 130, today).capacity();
        assert_eq!(over.available_daily, 0);
        assert_eq!(over.available_monthly, 0);
        assert!(!over.can_use_credit());
    }

    #[test]
    fn exhausted_free_account_is_denied_with_upgrade_hint() {
        let today = date(2025, 1, 1);
        let s = state(SubscriptionTier::Free, 5, 0, today);
        assert_eq!(
            s.consume(),
            ConsumeDecision::Denied {
                needs_upgrade: true
            }
        );
    }

    #[test]
    fn pro_draws_monthly_first() {
        let today = date(2025, 1, 1);
        for monthly in [0, 50, 99] {
            for daily in [0, 3, 5] {
                let s = state(SubscriptionTier::Pro, daily, monthly, today);
                match s.consume() {
                    ConsumeDecision::Granted { state, bucket } => {
                        assert_eq!(bucket, CreditBucket::Monthly);
                        assert_eq!(state.monthly_credits_used, monthly + 1);
                        assert_eq!(state.daily_credits_used, daily);
                    }
                    other => panic!("expected grant, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn pro_falls_back_to_daily_when_monthly_is_spent() {
        let today = date(2025, 1, 1);
        for daily in 0..5 {
            let s = state(SubscriptionTier::Pro, daily, 100, today);
            match s.consume() {
                ConsumeDecision::Granted { state, bucket } => {
                    assert_eq!(bucket, CreditBucket::Daily);
                    assert_eq!(state.daily_credits_used, daily + 1);
                    assert_eq!(state.monthly_credits_used, 100);
                }
                other => panic!("expected grant, got {other:?}"),
            }
        }
    }

    #[test]
    fn exhausted_pro_account_is_denied_without_upgrade_hint() {
        let today = date(2025, 1, 1);
        let s = state(SubscriptionTier::Pro, 5, 100, today);
        assert_eq!(
            s.consume(),
            ConsumeDecision::Denied {
                needs_upgrade: false
            }
        );
    }

    #[test]
    fn yesterdays_exhausted_account_gets_a_fresh_day() {
        let today = date(2025, 1, 2);
        let mut s = state(SubscriptionTier::Free, 5, 0, today);
        s.last_daily_reset = date(2025, 1, 1);

        match s.with_resets(today).consume() {
            ConsumeDecision::Granted { state, bucket } => {
                assert_eq!(bucket, CreditBucket::Daily);
                assert_eq!(state.daily_credits_used, 1);
                assert_eq!(state.last_daily_reset, today);
            }
            other => panic!("expected grant, got {other:?}"),
        }
    }

    #[test]
    fn counters_differ_ignores_bookkeeping() {
        let today = date(2025, 1, 1);
        let a = state(SubscriptionTier::Free, 1, 0, today);
        let mut b = a.clone();
        b.version += 3;
        b.updated_at = Utc::now();
        assert!(!a.counters_differ(&b));

        b.daily_credits_used = 2;
        assert!(a.counters_differ(&b));
    }

    #[test]
    fn tier_round_trips_through_strings() {
        assert_eq!(SubscriptionTier::Pro.to_string(), "pro");
        assert_eq!(
            SubscriptionTier::from_str("free").unwrap(),
            SubscriptionTier::Free
        );
        assert!(SubscriptionTier::from_str("enterprise").is_err());
    }
}
