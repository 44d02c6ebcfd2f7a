use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Usage recorded for one installation during one billing cycle
#[derive(Debug, Clone, Serialize)]
pub struct InstallationUsage {
    pub installation_id: i64,
    /// Renewal date (`YYYY-MM-DD`) or a cohort sentinel, see [`crate::models::entitlement`]
    pub cycle_key: String,
    pub created_at: DateTime<Utc>,
    pub pull_requests: Vec<PullRequestUsage>,
}

/// A pull request opened by the app and the cost billed against it
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestUsage {
    /// `owner/name`; PR numbers are only unique within a repository
    pub repository: String,
    pub number: i64,
    pub created_at: DateTime<Utc>,
    /// Always equal to the sum of `sessions[].cost`
    pub cost: f64,
    pub sessions: Vec<Session>,
}

/// One billed execution of the coding-agent job
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub timestamp: DateTime<Utc>,
    pub cost: f64,
}

impl InstallationUsage {
    /// Quota units consumed in this cycle. One unit per pull request.
    pub fn used_units(&self) -> u32 {
        u32::try_from(self.pull_requests.len()).unwrap_or(u32::MAX)
    }

    /// Total cost across every pull request of the cycle
    pub fn total_cost(&self) -> f64 {
        self.pull_requests.iter().map(|pr| pr.cost).sum()
    }

    /// Repository names match exactly, as in the store
    pub fn find_pull_request(&self, repository: &str, number: i64) -> Option<&PullRequestUsage> {
        self.pull_requests
            .iter()
            .find(|pr| pr.number == number && pr.repository == repository)
    }
}

/// Clamps a metered cost to a finite, non-negative value
pub fn sanitize_cost(cost: f64) -> f64 {
    if cost.is_finite() && cost > 0.0 {
        cost
    } else {
        0.0
    }
}

// Row types used by the Postgres store

#[derive(Debug, FromRow)]
pub struct UsageRow {
    pub id: i64,
    pub installation_id: i64,
    pub cycle_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct PullRequestRow {
    pub id: i64,
    pub repository: String,
    pub number: i64,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct SessionRow {
    pub pull_request_id: i64,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}
