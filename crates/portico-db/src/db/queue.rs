use anyhow::{Context, Result};
use sqlx::PgPool;

/// Per-customer counters of queued work, keyed by queue name.
#[derive(Clone)]
pub struct CustomerQueueRepository {
    pool: PgPool,
}

impl CustomerQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "customer_queues"))]
    pub async fn increment_size(&self, customer: i32, name: &str, amount: i32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customer_queues (customer, name, size)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer, name) DO UPDATE SET size = customer_queues.size + EXCLUDED.size
            "#,
        )
        .bind(customer)
        .bind(name)
        .bind(amount)
        .execute(&self.pool)
        .await
        .context("Failed to increment customer queue")?;
        Ok(())
    }

    /// Plain subtraction; the counter is not clamped at zero.
    #[tracing::instrument(skip(self), fields(db.table = "customer_queues"))]
    pub async fn decrement_size(&self, customer: i32, name: &str, amount: i32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE customer_queues SET size = size - $3 WHERE customer = $1 AND name = $2",
        )
        .bind(customer)
        .bind(name)
        .bind(amount)
        .execute(&self.pool)
        .await
        .context("Failed to decrement customer queue")?;

        if result.rows_affected() == 0 {
            tracing::warn!(customer, queue = name, "No queue counter to decrement");
        }
        Ok(())
    }
}
