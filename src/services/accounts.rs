//! Enterprise allow-list and promotion cohort.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppResult;

/// Advisory lock key serializing cohort admissions ("promo" in ASCII)
const PROMOTION_LOCK_KEY: i64 = 0x70_72_6f_6d_6f;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn is_enterprise(&self, login: &str) -> AppResult<bool>;

    /// Admits the account to the promotion cohort when there is room.
    ///
    /// Returns `true` if the account is a member afterwards (already or newly
    /// admitted). Admitting an existing member changes nothing.
    async fn register_promotion(&self, login: &str, capacity: i64) -> AppResult<bool>;

    async fn promotion_count(&self) -> AppResult<i64>;
}

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Adds an account to the enterprise allow-list
    pub async fn add_enterprise(&self, login: &str, note: Option<&str>) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO enterprise_accounts (login, note)
            VALUES ($1, $2)
            ON CONFLICT (login) DO UPDATE SET note = EXCLUDED.note
            "#,
        )
        .bind(normalize_login(login))
        .bind(note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// GitHub logins are case-insensitive
fn normalize_login(login: &str) -> String {
    login.trim().to_ascii_lowercase()
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn is_enterprise(&self, login: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM enterprise_accounts WHERE login = $1)")
                .bind(normalize_login(login))
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn register_promotion(&self, login: &str, capacity: i64) -> AppResult<bool> {
        let login = normalize_login(login);
        let mut tx = self.pool.begin().await?;

        // Transaction-scoped lock: count-then-insert must not interleave
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(PROMOTION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let already_member: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM promotion_cohort WHERE login = $1)")
                .bind(&login)
                .fetch_one(&mut *tx)
                .await?;
        if already_member {
            tx.commit().await?;
            return Ok(true);
        }

        let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM promotion_cohort")
            .fetch_one(&mut *tx)
            .await?;
        if members >= capacity {
            tx.commit().await?;
            log::info!("Promotion cohort full ({} members), {} not admitted", members, login);
            return Ok(false);
        }

        sqlx::query("INSERT INTO promotion_cohort (login) VALUES ($1) ON CONFLICT (login) DO NOTHING")
            .bind(&login)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        log::info!("Admitted {} to promotion cohort ({} of {})", login, members + 1, capacity);
        Ok(true)
    }

    async fn promotion_count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM promotion_cohort")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
