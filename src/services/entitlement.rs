//! Entitlement resolution and the quota gate.

use std::sync::Arc;

use crate::clients::SubscriptionProvider;
use crate::error::AppResult;
use crate::models::entitlement::{
    monthly_limit_for_price, PROMOTION_CAPACITY, PROMOTION_MONTHLY_LIMIT,
};
use crate::models::{Account, Entitlement};
use crate::services::accounts::AccountStore;
use crate::services::usage::UsageStore;

pub struct EntitlementResolver {
    accounts: Arc<dyn AccountStore>,
    subscriptions: Arc<dyn SubscriptionProvider>,
}

impl EntitlementResolver {
    pub fn new(accounts: Arc<dyn AccountStore>, subscriptions: Arc<dyn SubscriptionProvider>) -> Self {
        Self {
            accounts,
            subscriptions,
        }
    }

    /// Resolves in order: enterprise, paid subscription, promotion cohort.
    ///
    /// A billing-provider failure counts as "no subscription" so an outage
    /// there still lets the account reach the promotion check.
    pub async fn resolve(&self, account: &Account) -> AppResult<Entitlement> {
        if self.accounts.is_enterprise(&account.login).await? {
            log::debug!("{} resolved as enterprise", account.login);
            return Ok(Entitlement::Enterprise);
        }

        match self.subscriptions.subscription_for(account).await {
            Ok(Some(subscription)) => {
                let monthly_limit = monthly_limit_for_price(subscription.monthly_price_in_cents);
                log::debug!(
                    "{} has plan {:?} ({} PRs, renews {})",
                    account.login,
                    subscription.plan_name,
                    monthly_limit,
                    subscription.renewal_date
                );
                return Ok(Entitlement::Subscription {
                    monthly_limit,
                    renewal_date: subscription.renewal_date,
                });
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!(
                    "Subscription lookup failed for {}, falling back to promotion: {}",
                    account.login,
                    e
                );
            }
        }

        if self
            .accounts
            .register_promotion(&account.login, PROMOTION_CAPACITY)
            .await?
        {
            return Ok(Entitlement::Promotion {
                monthly_limit: PROMOTION_MONTHLY_LIMIT,
            });
        }

        Ok(Entitlement::None)
    }
}

/// Outcome of the quota gate for a new pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted {
        cycle_key: String,
        used: u32,
        /// `None` for unlimited accounts
        limit: Option<u32>,
    },
    NotEntitled,
    QuotaExceeded {
        cycle_key: String,
        used: u32,
        limit: u32,
    },
}

/// Decides whether one more pull request fits in the current cycle.
///
/// Usage is counted in pull requests. Enterprise accounts are admitted
/// without reading usage.
pub async fn admit_pull_request(
    usage: &dyn UsageStore,
    installation_id: i64,
    entitlement: &Entitlement,
) -> AppResult<Admission> {
    let Some(cycle_key) = entitlement.cycle_key() else {
        return Ok(Admission::NotEntitled);
    };

    let Some(limit) = entitlement.monthly_limit() else {
        return Ok(Admission::Admitted {
            cycle_key,
            used: 0,
            limit: None,
        });
    };

    let record = usage.get_or_create(installation_id, &cycle_key).await?;
    let used = record.used_units();

    if used >= limit {
        log::info!(
            "Installation {} is at its quota ({}/{}) for cycle {}",
            installation_id,
            used,
            limit,
            cycle_key
        );
        return Ok(Admission::QuotaExceeded {
            cycle_key,
            used,
            limit,
        });
    }

    Ok(Admission::Admitted {
        cycle_key,
        used,
        limit: Some(limit),
    })
}
