pub mod error;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod notification;
pub mod orchestrator;
pub mod resiliency;

pub use error::{ReservationError, ReservationResult, ValidationError};
pub use gateway::MockPaymentGateway;
pub use ledger::PaymentLedger;
pub use notification::{NotificationOutcome, PaymentNotification};
pub use orchestrator::{PaymentSession, RegisterRequest, Registered, ReservationOrchestrator};
pub use resiliency::{CircuitBreaker, CircuitState, GuardedGateway};
