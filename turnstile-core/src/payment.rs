use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Charge to initiate with the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_id: String,
    /// Gross amount in minor currency units.
    pub amount: i64,
    pub description: String,
    pub customer: String,
}

/// What the gateway hands back for a started charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSession {
    pub order_id: String,
    pub token: Option<String>,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(String),

    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("gateway response could not be decoded: {0}")]
    Decode(String),

    #[error("gateway circuit is open")]
    CircuitOpen,
}

/// Boundary to the external payment processor. Results of a charge arrive later,
/// out of band, as notifications.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a charge and return the payment link for the customer.
    async fn initiate(&self, charge: &ChargeRequest) -> Result<ChargeSession, GatewayError>;

    /// Cancel a charge that has not settled.
    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError>;
}
