use async_trait::async_trait;
use sqlx::PgPool;
use turnstile_core::repository::EventCatalog;
use turnstile_core::{Event, StoreError, StoreResult};

use crate::errors::classify;
use crate::rows::EventRow;

/// Read-only view over the `events` table maintained by the event CRUD service.
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventCatalog for PgEventRepository {
    async fn find_event(&self, id: i64) -> StoreResult<Event> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT id, name, category, is_paid FROM events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        row.map(Event::from)
            .ok_or_else(|| StoreError::not_found("event", id))
    }
}
