use async_trait::async_trait;
use sqlx::PgPool;
use turnstile_core::repository::InventoryStore;
use turnstile_core::{StoreError, StoreResult, TicketType};

use crate::errors::classify;
use crate::rows::{TicketTypeRow, TICKET_TYPE_COLUMNS};

pub struct PgInventoryRepository {
    pool: PgPool,
}

impl PgInventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Shared by the pool-backed repository and the unit of work: after a conditional
/// decrement touched no row, tell "absent" apart from "already zero".
pub(crate) async fn explain_failed_decrement<'e, E>(executor: E, id: i64) -> StoreError
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM ticket_types WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await;

    match exists {
        Ok(Some(_)) => StoreError::QuotaExhausted(id),
        Ok(None) => StoreError::not_found("ticket type", id),
        Err(e) => classify(e),
    }
}

pub(crate) const DECREMENT_QUOTA: &str =
    "UPDATE ticket_types SET quota = quota - 1 WHERE id = $1 AND quota > 0";

#[async_trait]
impl InventoryStore for PgInventoryRepository {
    async fn get_ticket_type(&self, id: i64) -> StoreResult<TicketType> {
        let sql = format!("SELECT {} FROM ticket_types WHERE id = $1", TICKET_TYPE_COLUMNS);
        let row = sqlx::query_as::<_, TicketTypeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        row.map(TicketType::from)
            .ok_or_else(|| StoreError::not_found("ticket type", id))
    }

    async fn decrement_quota(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query(DECREMENT_QUOTA)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(explain_failed_decrement(&self.pool, id).await);
        }
        Ok(())
    }
}
