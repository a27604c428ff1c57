use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Raised when a stored or submitted status string is outside its closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Read-only view of an event, owned by the external event CRUD layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub is_paid: bool,
}

/// A purchasable admission class for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketType {
    pub id: i64,
    pub event_id: i64,
    pub label: String,
    /// Unit price in minor currency units.
    pub price: i64,
    pub quota: i32,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

impl TicketType {
    pub fn has_quota(&self) -> bool {
        self.quota > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    Pending,
    Attending,
    NotAttending,
    Maybe,
    Going,
    Interested,
    NotGoing,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Pending => "pending",
            RsvpStatus::Attending => "attending",
            RsvpStatus::NotAttending => "not_attending",
            RsvpStatus::Maybe => "maybe",
            RsvpStatus::Going => "going",
            RsvpStatus::Interested => "interested",
            RsvpStatus::NotGoing => "not_going",
        }
    }

    /// Register only accepts the original four answers; the going/interested/not_going
    /// vocabulary exists for later RSVP updates.
    pub fn allowed_at_registration(&self) -> bool {
        matches!(
            self,
            RsvpStatus::Pending | RsvpStatus::Attending | RsvpStatus::NotAttending | RsvpStatus::Maybe
        )
    }
}

impl FromStr for RsvpStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RsvpStatus::Pending),
            "attending" => Ok(RsvpStatus::Attending),
            "not_attending" => Ok(RsvpStatus::NotAttending),
            "maybe" => Ok(RsvpStatus::Maybe),
            "going" => Ok(RsvpStatus::Going),
            "interested" => Ok(RsvpStatus::Interested),
            "not_going" => Ok(RsvpStatus::NotGoing),
            other => Err(UnknownVariant::new("rsvp status", other)),
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Free event; terminal success.
    Unpaid,
    Pending,
    Paid,
    /// Payment arrived after the quota ran out; terminal failure.
    FailedNoQuota,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::FailedNoQuota => "failed_no_quota",
        }
    }

    /// unpaid -> pending -> paid is the only forward path; failed_no_quota is terminal.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Unpaid, PaymentStatus::Pending)
                | (PaymentStatus::Pending, PaymentStatus::Paid)
                | (PaymentStatus::Pending, PaymentStatus::FailedNoQuota)
        )
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed_no_quota" => Ok(PaymentStatus::FailedNoQuota),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's claim on one event. At most one exists per (user, event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,
    pub ticket_type_id: Option<i64>,
    pub rsvp_status: RsvpStatus,
    pub rsvp_at: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    pub ticket_code: Option<String>,
}

impl Registration {
    /// Paid with a ticket issued; confirmation is a no-op from here.
    pub fn is_confirmed(&self) -> bool {
        self.payment_status == PaymentStatus::Paid && self.ticket_code.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub user_id: i64,
    pub event_id: i64,
    pub ticket_type_id: Option<i64>,
    pub rsvp_status: RsvpStatus,
    pub rsvp_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
}

/// Gateway-side state of a charge, normalised from the gateway's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Settled,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Settled => "settled",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Maps the status strings a gateway notification may carry.
    pub fn from_gateway(raw: &str) -> Result<Self, UnknownVariant> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "settlement" | "settled" | "capture" | "success" => Ok(TransactionStatus::Settled),
            "pending" => Ok(TransactionStatus::Pending),
            "deny" | "cancel" | "expire" | "failure" | "failed" => Ok(TransactionStatus::Failed),
            _ => Err(UnknownVariant::new("transaction status", raw)),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "settled" => Ok(TransactionStatus::Settled),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(UnknownVariant::new("transaction status", other)),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment-gateway charge attempt. Never deleted once settled or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,
    pub registration_id: Option<i64>,
    pub amount: i64,
    /// Correlation key echoed back by the gateway notification.
    pub order_id: String,
    pub status: TransactionStatus,
    pub payment_method: Option<String>,
    pub redirect_url: Option<String>,
    pub items: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub event_id: i64,
    pub registration_id: Option<i64>,
    pub amount: i64,
    pub order_id: String,
    pub items: String,
    pub notes: Option<String>,
}

/// Fresh order identifier; generated before the charge is initiated and never reused.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn generate_ticket_code() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsvp_registration_vocabulary() {
        for raw in ["pending", "attending", "not_attending", "maybe"] {
            let status: RsvpStatus = raw.parse().unwrap();
            assert!(status.allowed_at_registration(), "{raw} should be accepted");
            assert_eq!(status.as_str(), raw);
        }
        for raw in ["going", "interested", "not_going"] {
            let status: RsvpStatus = raw.parse().unwrap();
            assert!(!status.allowed_at_registration(), "{raw} is update-only");
        }
        assert!("yes".parse::<RsvpStatus>().is_err());
    }

    #[test]
    fn test_payment_forward_path() {
        assert!(PaymentStatus::Unpaid.can_transition_to(PaymentStatus::Pending));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::FailedNoQuota));

        assert!(!PaymentStatus::Unpaid.can_transition_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::FailedNoQuota.can_transition_to(PaymentStatus::Paid));
    }

    #[test]
    fn test_gateway_vocabulary() {
        assert_eq!(TransactionStatus::from_gateway("settlement").unwrap(), TransactionStatus::Settled);
        assert_eq!(TransactionStatus::from_gateway("Capture").unwrap(), TransactionStatus::Settled);
        assert_eq!(TransactionStatus::from_gateway("pending").unwrap(), TransactionStatus::Pending);
        assert_eq!(TransactionStatus::from_gateway("expire").unwrap(), TransactionStatus::Failed);
        assert!(TransactionStatus::from_gateway("refund").is_err());
        assert!(TransactionStatus::Settled.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_statuses_serialize_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::FailedNoQuota).unwrap();
        assert_eq!(json, "\"failed_no_quota\"");
        let json = serde_json::to_string(&RsvpStatus::NotGoing).unwrap();
        assert_eq!(json, "\"not_going\"");
    }

    #[test]
    fn test_order_ids_are_unique() {
        assert_ne!(generate_order_id(), generate_order_id());
    }
}
