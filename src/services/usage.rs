//! Per-installation usage records.
//!
//! Every write is a single upsert or increment inside one transaction. The
//! quota check built on top of [`UsageStore::get_or_create`] is read-then-compare
//! and is not serialized against concurrent deliveries.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::models::usage::{sanitize_cost, PullRequestRow, SessionRow, UsageRow};
use crate::models::{InstallationUsage, PullRequestUsage, Session};

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Returns the cycle record, creating an empty one on first use.
    /// Never resets an existing record.
    async fn get_or_create(&self, installation_id: i64, cycle_key: &str)
        -> AppResult<InstallationUsage>;

    /// Records a new pull request with its first session
    async fn append_pull_request(
        &self,
        installation_id: i64,
        cycle_key: &str,
        repository: &str,
        number: i64,
        initial_cost: f64,
    ) -> AppResult<()>;

    /// Adds a session to a recorded pull request and increments its cost.
    /// Returns `false` when the pull request is not part of the cycle.
    async fn append_session(
        &self,
        installation_id: i64,
        cycle_key: &str,
        repository: &str,
        number: i64,
        cost: f64,
    ) -> AppResult<bool>;
}

/// PostgreSQL-backed usage store
#[derive(Clone)]
pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_usage<'e, E>(executor: E, installation_id: i64, cycle_key: &str) -> AppResult<UsageRow>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        // DO UPDATE (not DO NOTHING) so RETURNING yields the existing row
        let row = sqlx::query_as::<_, UsageRow>(
            r#"
            INSERT INTO installation_usage (installation_id, cycle_key)
            VALUES ($1, $2)
            ON CONFLICT (installation_id, cycle_key)
            DO UPDATE SET cycle_key = EXCLUDED.cycle_key
            RETURNING id, installation_id, cycle_key, created_at
            "#,
        )
        .bind(installation_id)
        .bind(cycle_key)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    async fn load_pull_requests(&self, usage_id: i64) -> AppResult<Vec<PullRequestUsage>> {
        let rows = sqlx::query_as::<_, PullRequestRow>(
            r#"
            SELECT id, repository, number, cost, created_at
            FROM pull_request_usage
            WHERE usage_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(usage_id)
        .fetch_all(&self.pool)
        .await?;

        let sessions = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT s.pull_request_id, s.cost, s.created_at
            FROM usage_sessions s
            JOIN pull_request_usage p ON p.id = s.pull_request_id
            WHERE p.usage_id = $1
            ORDER BY s.created_at ASC, s.id ASC
            "#,
        )
        .bind(usage_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_pull_request: HashMap<i64, Vec<Session>> = HashMap::new();
        for session in sessions {
            by_pull_request
                .entry(session.pull_request_id)
                .or_default()
                .push(Session {
                    timestamp: session.created_at,
                    cost: session.cost,
                });
        }

        Ok(rows
            .into_iter()
            .map(|row| PullRequestUsage {
                sessions: by_pull_request.remove(&row.id).unwrap_or_default(),
                repository: row.repository,
                number: row.number,
                created_at: row.created_at,
                cost: row.cost,
            })
            .collect())
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn get_or_create(
        &self,
        installation_id: i64,
        cycle_key: &str,
    ) -> AppResult<InstallationUsage> {
        let usage = Self::upsert_usage(&self.pool, installation_id, cycle_key).await?;
        let pull_requests = self.load_pull_requests(usage.id).await?;

        Ok(InstallationUsage {
            installation_id: usage.installation_id,
            cycle_key: usage.cycle_key,
            created_at: usage.created_at,
            pull_requests,
        })
    }

    async fn append_pull_request(
        &self,
        installation_id: i64,
        cycle_key: &str,
        repository: &str,
        number: i64,
        initial_cost: f64,
    ) -> AppResult<()> {
        let cost = sanitize_cost(initial_cost);
        let mut tx = self.pool.begin().await?;

        let usage = Self::upsert_usage(&mut *tx, installation_id, cycle_key).await?;

        // A redelivered event folds into the existing entry so cost stays the
        // sum of its sessions
        let pull_request_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pull_request_usage (usage_id, repository, number, cost)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (usage_id, repository, number)
            DO UPDATE SET cost = pull_request_usage.cost + EXCLUDED.cost
            RETURNING id
            "#,
        )
        .bind(usage.id)
        .bind(repository)
        .bind(number)
        .bind(cost)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO usage_sessions (pull_request_id, cost, created_at) VALUES ($1, $2, $3)")
            .bind(pull_request_id)
            .bind(cost)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        log::info!(
            "Recorded PR {}#{} for installation {} in cycle {} (cost ${:.4})",
            repository,
            number,
            installation_id,
            cycle_key,
            cost
        );
        Ok(())
    }

    async fn append_session(
        &self,
        installation_id: i64,
        cycle_key: &str,
        repository: &str,
        number: i64,
        cost: f64,
    ) -> AppResult<bool> {
        let cost = sanitize_cost(cost);
        let mut tx = self.pool.begin().await?;

        let pull_request_id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE pull_request_usage p
            SET cost = p.cost + $5
            FROM installation_usage u
            WHERE p.usage_id = u.id
              AND u.installation_id = $1
              AND u.cycle_key = $2
              AND p.repository = $3
              AND p.number = $4
            RETURNING p.id
            "#,
        )
        .bind(installation_id)
        .bind(cycle_key)
        .bind(repository)
        .bind(number)
        .bind(cost)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(pull_request_id) = pull_request_id else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("INSERT INTO usage_sessions (pull_request_id, cost, created_at) VALUES ($1, $2, $3)")
            .bind(pull_request_id)
            .bind(cost)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
