//! Entitlement variants and the constants that define them.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Cycle key for enterprise accounts; never rolls over
pub const ENTERPRISE_CYCLE_KEY: &str = "9999-12-31";

/// Cycle key shared by every promotion-cohort installation
pub const PROMOTION_CYCLE_KEY: &str = "promotion";

/// Pull requests granted to a promotion-cohort account
pub const PROMOTION_MONTHLY_LIMIT: u32 = 5;

/// Number of accounts admitted to the promotion cohort
pub const PROMOTION_CAPACITY: i64 = 100;

/// What an account may consume
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entitlement {
    Enterprise,
    Subscription {
        monthly_limit: u32,
        renewal_date: NaiveDate,
    },
    Promotion {
        monthly_limit: u32,
    },
    None,
}

impl Entitlement {
    /// Cycle key usage is recorded under; `None` for unentitled accounts
    pub fn cycle_key(&self) -> Option<String> {
        match self {
            Entitlement::Enterprise => Some(ENTERPRISE_CYCLE_KEY.to_string()),
            Entitlement::Subscription { renewal_date, .. } => {
                Some(renewal_date.format("%Y-%m-%d").to_string())
            }
            Entitlement::Promotion { .. } => Some(PROMOTION_CYCLE_KEY.to_string()),
            Entitlement::None => None,
        }
    }

    /// Pull requests allowed per cycle; `None` means unlimited or not entitled
    pub fn monthly_limit(&self) -> Option<u32> {
        match self {
            Entitlement::Subscription { monthly_limit, .. }
            | Entitlement::Promotion { monthly_limit } => Some(*monthly_limit),
            Entitlement::Enterprise | Entitlement::None => None,
        }
    }

    pub fn is_entitled(&self) -> bool {
        !matches!(self, Entitlement::None)
    }
}

/// An active marketplace plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub plan_name: String,
    pub monthly_price_in_cents: u32,
    /// Start of the next billing cycle
    pub renewal_date: NaiveDate,
}

/// Maps a plan price to its monthly pull request allowance
pub fn monthly_limit_for_price(monthly_price_in_cents: u32) -> u32 {
    match monthly_price_in_cents {
        0..=1_000 => 10,
        1_001..=2_500 => 30,
        _ => 100,
    }
}

/// Renewal date used when the billing provider does not report one
pub fn first_day_of_next_month(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today)
}
