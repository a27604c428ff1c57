use chrono::{DateTime, Utc};
use turnstile_core::{
    Event, PaymentStatus, Registration, RsvpStatus, StoreError, TicketType, Transaction,
    TransactionStatus,
};

pub(crate) const TICKET_TYPE_COLUMNS: &str =
    "id, event_id, label, price, quota, available, created_at";

pub(crate) const REGISTRATION_COLUMNS: &str =
    "id, user_id, event_id, ticket_type_id, rsvp_status, rsvp_at, payment_status, ticket_code";

pub(crate) const TRANSACTION_COLUMNS: &str = "id, user_id, event_id, registration_id, amount, order_id, status, payment_method, redirect_url, items, notes, created_at, updated_at";

// Internal structs for type-safe querying

#[derive(sqlx::FromRow)]
pub(crate) struct EventRow {
    id: i64,
    name: String,
    category: String,
    is_paid: bool,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            name: row.name,
            category: row.category,
            is_paid: row.is_paid,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TicketTypeRow {
    id: i64,
    event_id: i64,
    label: String,
    price: i64,
    quota: i32,
    available: bool,
    created_at: DateTime<Utc>,
}

impl From<TicketTypeRow> for TicketType {
    fn from(row: TicketTypeRow) -> Self {
        TicketType {
            id: row.id,
            event_id: row.event_id,
            label: row.label,
            price: row.price,
            quota: row.quota,
            available: row.available,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RegistrationRow {
    id: i64,
    user_id: i64,
    event_id: i64,
    ticket_type_id: Option<i64>,
    rsvp_status: String,
    rsvp_at: Option<DateTime<Utc>>,
    payment_status: String,
    ticket_code: Option<String>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = StoreError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        let rsvp_status: RsvpStatus = row
            .rsvp_status
            .parse()
            .map_err(|e| StoreError::Backend(format!("registration {}: {}", row.id, e)))?;
        let payment_status: PaymentStatus = row
            .payment_status
            .parse()
            .map_err(|e| StoreError::Backend(format!("registration {}: {}", row.id, e)))?;

        Ok(Registration {
            id: row.id,
            user_id: row.user_id,
            event_id: row.event_id,
            ticket_type_id: row.ticket_type_id,
            rsvp_status,
            rsvp_at: row.rsvp_at,
            payment_status,
            ticket_code: row.ticket_code,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TransactionRow {
    id: i64,
    user_id: i64,
    event_id: i64,
    registration_id: Option<i64>,
    amount: i64,
    order_id: String,
    status: String,
    payment_method: Option<String>,
    redirect_url: Option<String>,
    items: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status: TransactionStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Backend(format!("transaction {}: {}", row.order_id, e)))?;

        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            event_id: row.event_id,
            registration_id: row.registration_id,
            amount: row.amount,
            order_id: row.order_id,
            status,
            payment_method: row.payment_method,
            redirect_url: row.redirect_url,
            items: row.items,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn registrations(rows: Vec<RegistrationRow>) -> Result<Vec<Registration>, StoreError> {
    rows.into_iter().map(Registration::try_from).collect()
}

pub(crate) fn transactions(rows: Vec<TransactionRow>) -> Result<Vec<Transaction>, StoreError> {
    rows.into_iter().map(Transaction::try_from).collect()
}
