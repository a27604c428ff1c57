use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle events broadcast by the reservation orchestrator.
///
/// Consumers (metrics, audit) subscribe to a `tokio::sync::broadcast` channel;
/// a lagging consumer loses events, it never blocks a reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReservationEvent {
    RegistrationCreated {
        user_id: i64,
        event_id: i64,
        ticket_type_id: Option<i64>,
        payment_status: String,
        at: DateTime<Utc>,
    },
    PaymentInitiated {
        user_id: i64,
        event_id: i64,
        order_id: String,
        amount: i64,
        at: DateTime<Utc>,
    },
    PaymentInitiationFailed {
        user_id: i64,
        event_id: i64,
        order_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    PaymentConfirmed {
        user_id: i64,
        event_id: i64,
        ticket_type_id: i64,
        at: DateTime<Utc>,
    },
    /// Payment may already be captured by the gateway; needs manual reconciliation.
    OversellPrevented {
        user_id: i64,
        event_id: i64,
        ticket_type_id: i64,
        at: DateTime<Utc>,
    },
    RegistrationCancelled {
        user_id: i64,
        event_id: i64,
        at: DateTime<Utc>,
    },
    NotificationRecorded {
        order_id: String,
        status: String,
        at: DateTime<Utc>,
    },
}

impl ReservationEvent {
    /// Short name used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            ReservationEvent::RegistrationCreated { .. } => "registration_created",
            ReservationEvent::PaymentInitiated { .. } => "payment_initiated",
            ReservationEvent::PaymentInitiationFailed { .. } => "payment_initiation_failed",
            ReservationEvent::PaymentConfirmed { .. } => "payment_confirmed",
            ReservationEvent::OversellPrevented { .. } => "oversell_prevented",
            ReservationEvent::RegistrationCancelled { .. } => "registration_cancelled",
            ReservationEvent::NotificationRecorded { .. } => "notification_recorded",
        }
    }
}
