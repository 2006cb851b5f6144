use anyhow::{Context, Result};
use portico_core::models::{CustomerOriginStrategy, OriginStrategyType};
use sqlx::{PgPool, Postgres};

#[derive(Debug, sqlx::FromRow)]
struct OriginStrategyRow {
    id: String,
    customer: i32,
    regex: String,
    strategy: OriginStrategyType,
    credentials: Option<String>,
    optimised: bool,
    order: i32,
}

impl From<OriginStrategyRow> for CustomerOriginStrategy {
    fn from(row: OriginStrategyRow) -> Self {
        Self {
            id: row.id,
            customer: row.customer,
            regex: row.regex,
            strategy: row.strategy,
            credentials: row.credentials,
            optimised: row.optimised,
            order: row.order,
        }
    }
}

#[derive(Clone)]
pub struct OriginStrategyRepository {
    pool: PgPool,
}

impl OriginStrategyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Strategies configured for a customer, lowest `order` first.
    #[tracing::instrument(skip(self), fields(db.table = "customer_origin_strategies"))]
    pub async fn get_customer_origin_strategies(
        &self,
        customer: i32,
    ) -> Result<Vec<CustomerOriginStrategy>> {
        let rows = sqlx::query_as::<Postgres, OriginStrategyRow>(
            r#"
            SELECT id, customer, regex, strategy, credentials, optimised, "order"
            FROM customer_origin_strategies
            WHERE customer = $1
            ORDER BY "order" ASC, id ASC
            "#,
        )
        .bind(customer)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch customer origin strategies")?;

        Ok(rows.into_iter().map(CustomerOriginStrategy::from).collect())
    }
}
