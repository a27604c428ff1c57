use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use turnstile_core::{ChargeRequest, ChargeSession, GatewayError, PaymentGateway};

/// In-process gateway for development and tests. Records every call and can be
/// switched into a failing mode to exercise the partial-failure paths.
pub struct MockPaymentGateway {
    redirect_base: String,
    failing: AtomicBool,
    charges: Mutex<Vec<ChargeRequest>>,
    cancelled: Mutex<Vec<String>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            redirect_base: "https://pay.mock.local/vtweb".to_string(),
            failing: AtomicBool::new(false),
            charges: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let gateway = Self::new();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn charges(&self) -> Vec<ChargeRequest> {
        self.charges.lock().await.clone()
    }

    pub async fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().await.clone()
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("simulated gateway outage".into()));
        }
        Ok(())
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn initiate(&self, charge: &ChargeRequest) -> Result<ChargeSession, GatewayError> {
        self.check_available()?;
        self.charges.lock().await.push(charge.clone());

        let token = format!("mock-{}", charge.order_id);
        Ok(ChargeSession {
            order_id: charge.order_id.clone(),
            redirect_url: format!("{}/{}", self.redirect_base, token),
            token: Some(token),
        })
    }

    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError> {
        self.check_available()?;
        self.cancelled.lock().await.push(order_id.to_string());
        Ok(())
    }
}
