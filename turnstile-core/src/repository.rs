use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{
    Event, NewRegistration, NewTransaction, Registration, TicketType, Transaction,
    TransactionStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("ticket type {0} has no remaining quota")]
    QuotaExhausted(i64),

    #[error("timed out waiting for the lock on ticket type {0}")]
    LockTimeout(i64),

    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error("{entity} {key} is {status}, not pending")]
    NotPending {
        entity: &'static str,
        key: String,
        status: String,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only lookups into the external event CRUD layer.
#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn find_event(&self, id: i64) -> StoreResult<Event>;
}

/// Ticket-type rows and their quota.
///
/// Outside a unit of work only reads and the standalone conditional decrement are
/// available; quota is never written any other way.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_ticket_type(&self, id: i64) -> StoreResult<TicketType>;

    /// `quota = quota - 1` only if `quota > 0`, as one conditional update.
    /// Returns `QuotaExhausted` when the row exists with zero quota.
    async fn decrement_quota(&self, id: i64) -> StoreResult<()>;
}

/// Registration rows keyed by (user, event).
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Fails with `Duplicate` when a registration already exists for the pair.
    async fn create(&self, registration: NewRegistration) -> StoreResult<Registration>;

    async fn find(&self, user_id: i64, event_id: i64) -> StoreResult<Option<Registration>>;

    /// Fails with `NotFound` when the row was deleted concurrently.
    async fn update(&self, registration: &Registration) -> StoreResult<()>;

    async fn delete(&self, user_id: i64, event_id: i64) -> StoreResult<()>;

    async fn list_by_event(&self, event_id: i64) -> StoreResult<Vec<Registration>>;

    async fn list_by_user(&self, user_id: i64) -> StoreResult<Vec<Registration>>;

    /// Most frequent event category across the user's registrations.
    async fn favorite_category(&self, user_id: i64) -> StoreResult<Option<String>>;
}

/// Gateway charge attempts. Rows are an audit trail.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Fails with `Duplicate` if the order identifier was used before.
    async fn create(&self, transaction: NewTransaction) -> StoreResult<Transaction>;

    async fn find_by_order_id(&self, order_id: &str) -> StoreResult<Option<Transaction>>;

    /// The pending charge for a registration, if one is still open.
    async fn find_active_for_registration(
        &self,
        registration_id: i64,
    ) -> StoreResult<Option<Transaction>>;

    async fn set_redirect_url(&self, order_id: &str, redirect_url: &str) -> StoreResult<()>;

    /// Compare-and-set on the status column: writes `status` only while the row
    /// is still `expected`. `Ok(None)` when the status has moved on since it was
    /// read; `NotFound` for unknown order identifiers.
    async fn update_status_if(
        &self,
        order_id: &str,
        expected: TransactionStatus,
        status: TransactionStatus,
        payment_method: Option<&str>,
    ) -> StoreResult<Option<Transaction>>;

    async fn list_by_user(&self, user_id: i64) -> StoreResult<Vec<Transaction>>;

    async fn list_by_event(&self, user_id: i64, event_id: i64) -> StoreResult<Vec<Transaction>>;

    /// Administrative removal; only pending rows may go, anything else is `NotPending`.
    async fn delete_pending(&self, id: i64, user_id: i64) -> StoreResult<()>;
}

/// One database transaction spanning the quota lock, the decrement and the
/// registration update. Dropping it without `commit` rolls everything back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Exclusive row lock held until commit or rollback; waits at most the
    /// configured lock timeout and then fails with `LockTimeout`.
    async fn ticket_type_for_update(&mut self, id: i64) -> StoreResult<TicketType>;

    async fn decrement_quota(&mut self, id: i64) -> StoreResult<()>;

    /// Re-reads the registration inside the unit of work.
    async fn find_registration(
        &mut self,
        user_id: i64,
        event_id: i64,
    ) -> StoreResult<Option<Registration>>;

    async fn update_registration(&mut self, registration: &Registration) -> StoreResult<()>;

    /// Deletes a registration previously re-read with `find_registration`.
    async fn delete_registration(&mut self, id: i64) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}

/// The storage collaborators of the reservation orchestrator, bundled so a
/// backend can hand them over in one piece.
#[derive(Clone)]
pub struct ReservationStores {
    pub events: Arc<dyn EventCatalog>,
    pub inventory: Arc<dyn InventoryStore>,
    pub registrations: Arc<dyn RegistrationStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub units: Arc<dyn TransactionalStore>,
}
