use sqlx::PgPool;

use crate::error::AppResult;

/// Tracks `X-GitHub-Delivery` ids so redeliveries are not processed twice
pub struct DeliveryService;

impl DeliveryService {
    /// Claims a delivery id. Returns `false` if it was already claimed.
    pub async fn claim(pool: &PgPool, delivery_id: &str, event: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (delivery_id, event)
            VALUES ($1, $2)
            ON CONFLICT (delivery_id) DO NOTHING
            "#,
        )
        .bind(delivery_id)
        .bind(event)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
