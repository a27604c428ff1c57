use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use turnstile_core::ReservationStores;

use crate::app_config::DatabaseConfig;
use crate::event_repo::PgEventRepository;
use crate::inventory_repo::PgInventoryRepository;
use crate::registration_repo::PgRegistrationRepository;
use crate::transaction_repo::PgTransactionRepository;
use crate::unit_of_work::PgTransactionalStore;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(
        connection_string: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        Self::new(
            &config.url,
            config.max_connections,
            Duration::from_secs(config.acquire_timeout_secs),
        )
        .await
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Postgres-backed collaborators for the orchestrator, sharing this pool.
    pub fn stores(&self, lock_timeout: Duration) -> ReservationStores {
        ReservationStores {
            events: Arc::new(PgEventRepository::new(self.pool.clone())),
            inventory: Arc::new(PgInventoryRepository::new(self.pool.clone())),
            registrations: Arc::new(PgRegistrationRepository::new(self.pool.clone())),
            transactions: Arc::new(PgTransactionRepository::new(self.pool.clone())),
            units: Arc::new(PgTransactionalStore::new(self.pool.clone(), lock_timeout)),
        }
    }
}
