use turnstile_core::{GatewayError, PaymentStatus, Registration, StoreError};

/// Rejections reported to the caller as-is; retrying the same request cannot succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid RSVP status: {0}")]
    InvalidRsvpStatus(String),

    #[error("user {user_id} is already registered for event {event_id}")]
    AlreadyRegistered { user_id: i64, event_id: i64 },

    #[error("ticket type {ticket_type_id} does not belong to event {event_id}")]
    TicketTypeMismatch { ticket_type_id: i64, event_id: i64 },

    #[error("ticket type {0} is sold out")]
    SoldOut(i64),

    #[error("ticket type {0} is not available for sale")]
    Unavailable(i64),

    #[error("registration has no ticket type to confirm")]
    MissingTicketType,

    #[error("payment status cannot move from {from} to {to}")]
    InvalidTransition { from: PaymentStatus, to: PaymentStatus },

    #[error("unknown gateway transaction status: {0}")]
    UnknownGatewayStatus(String),

    #[error("event {0} is free; no payment is required")]
    PaymentNotRequired(i64),

    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("paid registrations cannot be cancelled")]
    PaidRegistration,

    #[error("transaction {0} is no longer pending")]
    TransactionNotPending(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} not found")]
    NotFound(String),

    /// Quota ran out at confirmation time. The gateway may already have
    /// captured money, so this needs manual reconciliation.
    #[error("ticket type {ticket_type_id} exhausted while confirming payment for user {user_id} on event {event_id}")]
    InventoryExhausted {
        user_id: i64,
        event_id: i64,
        ticket_type_id: i64,
    },

    /// The registration exists, but the charge could not be started. The user
    /// retries payment against it.
    #[error("registration saved but payment could not be started: {source}")]
    PaymentNotStarted {
        registration: Box<Registration>,
        source: Box<ReservationError>,
    },

    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("concurrent update conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("storage error: {0}")]
    Store(StoreError),
}

impl ReservationError {
    /// Whether a fresh attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReservationError::ConcurrencyConflict(_))
    }
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, key } => {
                ReservationError::NotFound(format!("{} {}", entity, key))
            }
            StoreError::Duplicate { entity, key } => {
                ValidationError::Duplicate(format!("{} {}", entity, key)).into()
            }
            StoreError::LockTimeout(id) => ReservationError::ConcurrencyConflict(format!(
                "timed out waiting for the lock on ticket type {}",
                id
            )),
            StoreError::Conflict(message) => ReservationError::ConcurrencyConflict(message),
            other => ReservationError::Store(other),
        }
    }
}

pub type ReservationResult<T> = Result<T, ReservationError>;
