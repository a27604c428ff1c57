use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use turnstile_core::repository::{TransactionalStore, UnitOfWork};
use turnstile_core::{Registration, StoreError, StoreResult, TicketType};

use crate::errors::{classify, classify_lock};
use crate::inventory_repo::{explain_failed_decrement, DECREMENT_QUOTA};
use crate::registration_repo::UPDATE_REGISTRATION;
use crate::rows::{RegistrationRow, TicketTypeRow, REGISTRATION_COLUMNS, TICKET_TYPE_COLUMNS};

/// Opens Postgres transactions whose row-lock waits are bounded by `lock_timeout`.
pub struct PgTransactionalStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgTransactionalStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl TransactionalStore for PgTransactionalStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // SET does not take bind parameters; the value is an integer we format ourselves.
        let set_timeout = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn ticket_type_for_update(&mut self, id: i64) -> StoreResult<TicketType> {
        let sql = format!(
            "SELECT {} FROM ticket_types WHERE id = $1 FOR UPDATE",
            TICKET_TYPE_COLUMNS
        );
        let row = sqlx::query_as::<_, TicketTypeRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| classify_lock(id, e))?;

        row.map(TicketType::from)
            .ok_or_else(|| StoreError::not_found("ticket type", id))
    }

    async fn decrement_quota(&mut self, id: i64) -> StoreResult<()> {
        let result = sqlx::query(DECREMENT_QUOTA)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| classify_lock(id, e))?;

        if result.rows_affected() == 0 {
            return Err(explain_failed_decrement(&mut *self.tx, id).await);
        }
        Ok(())
    }

    async fn find_registration(
        &mut self,
        user_id: i64,
        event_id: i64,
    ) -> StoreResult<Option<Registration>> {
        let sql = format!(
            "SELECT {} FROM registrations WHERE user_id = $1 AND event_id = $2 FOR UPDATE",
            REGISTRATION_COLUMNS
        );
        let row = sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(user_id)
            .bind(event_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;

        row.map(Registration::try_from).transpose()
    }

    async fn update_registration(&mut self, registration: &Registration) -> StoreResult<()> {
        let result = sqlx::query(UPDATE_REGISTRATION)
            .bind(registration.id)
            .bind(registration.ticket_type_id)
            .bind(registration.rsvp_status.as_str())
            .bind(registration.rsvp_at)
            .bind(registration.payment_status.as_str())
            .bind(registration.ticket_code.as_deref())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("registration", registration.id));
        }
        Ok(())
    }

    async fn delete_registration(&mut self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM registrations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("registration", id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(classify)
    }
}
