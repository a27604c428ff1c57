pub mod models;
pub mod payment;
pub mod repository;

pub use models::{
    Event, NewRegistration, NewTransaction, PaymentStatus, Registration, RsvpStatus, TicketType,
    Transaction, TransactionStatus,
};
pub use payment::{ChargeRequest, ChargeSession, GatewayError, PaymentGateway};
pub use repository::{ReservationStores, StoreError, StoreResult};
