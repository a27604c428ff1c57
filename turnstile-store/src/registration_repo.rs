use async_trait::async_trait;
use sqlx::PgPool;
use turnstile_core::repository::RegistrationStore;
use turnstile_core::{NewRegistration, Registration, StoreError, StoreResult};

use crate::errors::{classify, classify_insert};
use crate::rows::{self, RegistrationRow, REGISTRATION_COLUMNS};

pub struct PgRegistrationRepository {
    pool: PgPool,
}

impl PgRegistrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) const UPDATE_REGISTRATION: &str = r#"
    UPDATE registrations
    SET ticket_type_id = $2, rsvp_status = $3, rsvp_at = $4, payment_status = $5, ticket_code = $6
    WHERE id = $1
"#;

#[async_trait]
impl RegistrationStore for PgRegistrationRepository {
    async fn create(&self, registration: NewRegistration) -> StoreResult<Registration> {
        let sql = format!(
            r#"
            INSERT INTO registrations (user_id, event_id, ticket_type_id, rsvp_status, rsvp_at, payment_status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        );

        let row = sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(registration.user_id)
            .bind(registration.event_id)
            .bind(registration.ticket_type_id)
            .bind(registration.rsvp_status.as_str())
            .bind(registration.rsvp_at)
            .bind(registration.payment_status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                classify_insert(
                    "registration",
                    format!("user {} event {}", registration.user_id, registration.event_id),
                    e,
                )
            })?;

        Registration::try_from(row)
    }

    async fn find(&self, user_id: i64, event_id: i64) -> StoreResult<Option<Registration>> {
        let sql = format!(
            "SELECT {} FROM registrations WHERE user_id = $1 AND event_id = $2",
            REGISTRATION_COLUMNS
        );
        let row = sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(user_id)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        row.map(Registration::try_from).transpose()
    }

    async fn update(&self, registration: &Registration) -> StoreResult<()> {
        let result = sqlx::query(UPDATE_REGISTRATION)
            .bind(registration.id)
            .bind(registration.ticket_type_id)
            .bind(registration.rsvp_status.as_str())
            .bind(registration.rsvp_at)
            .bind(registration.payment_status.as_str())
            .bind(registration.ticket_code.as_deref())
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("registration", registration.id));
        }
        Ok(())
    }

    async fn delete(&self, user_id: i64, event_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM registrations WHERE user_id = $1 AND event_id = $2")
            .bind(user_id)
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(
                "registration",
                format!("user {} event {}", user_id, event_id),
            ));
        }
        Ok(())
    }

    async fn list_by_event(&self, event_id: i64) -> StoreResult<Vec<Registration>> {
        let sql = format!(
            "SELECT {} FROM registrations WHERE event_id = $1 ORDER BY id",
            REGISTRATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        rows::registrations(rows)
    }

    async fn list_by_user(&self, user_id: i64) -> StoreResult<Vec<Registration>> {
        let sql = format!(
            "SELECT {} FROM registrations WHERE user_id = $1 ORDER BY id",
            REGISTRATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        rows::registrations(rows)
    }

    async fn favorite_category(&self, user_id: i64) -> StoreResult<Option<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT events.category
            FROM registrations
            JOIN events ON events.id = registrations.event_id
            WHERE registrations.user_id = $1
            GROUP BY events.category
            ORDER BY COUNT(*) DESC, events.category
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }
}
