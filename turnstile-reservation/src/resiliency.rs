use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use turnstile_core::{ChargeRequest, ChargeSession, GatewayError, PaymentGateway};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failure detected, failing fast
    HalfOpen, // Testing if the gateway is back
}

pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    last_failure: RwLock<Option<Instant>>,
    trial_started: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout: timeout,
            last_failure: RwLock::new(None),
            trial_started: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Whether a call may go through right now.
    pub async fn check(&self) -> bool {
        let state = *self.state.read().await;
        match state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.replace_stale_trial().await,
            CircuitState::Open => {
                let elapsed = self
                    .last_failure
                    .read()
                    .await
                    .map(|instant| instant.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if !elapsed {
                    return false;
                }

                // Only the caller that flips Open -> HalfOpen gets the trial.
                let mut s = self.state.write().await;
                if *s == CircuitState::Open {
                    *s = CircuitState::HalfOpen;
                    *self.trial_started.write().await = Some(Instant::now());
                    tracing::info!("Circuit Breaker [{}] moving to Half-Open", self.name);
                    return true;
                }
                false
            }
        }
    }

    /// A trial that never reported back (its caller was dropped or timed out)
    /// stops blocking recovery once it is older than the reset timeout.
    async fn replace_stale_trial(&self) -> bool {
        let state = self.state.write().await;
        if *state != CircuitState::HalfOpen {
            return false;
        }
        let mut started = self.trial_started.write().await;
        let stale = started
            .map(|instant| instant.elapsed() >= self.reset_timeout)
            .unwrap_or(true);
        if !stale {
            return false;
        }
        *started = Some(Instant::now());
        tracing::warn!("Circuit Breaker [{}] trial never reported, allowing another", self.name);
        true
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Closed;
            tracing::info!("Circuit Breaker [{}] recovered to Closed", self.name);
        }
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.last_failure.write().await = Some(Instant::now());
            tracing::error!("Circuit Breaker [{}] TRIPPED to Open. Failures: {}", self.name, count);
        }
    }
}

/// Fails fast with `CircuitOpen` while the wrapped gateway keeps failing.
pub struct GuardedGateway {
    inner: Arc<dyn PaymentGateway>,
    breaker: CircuitBreaker,
}

impl GuardedGateway {
    pub fn new(inner: Arc<dyn PaymentGateway>, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn record<T>(&self, result: Result<T, GatewayError>) -> Result<T, GatewayError> {
        // A rejection is the gateway answering; it says nothing about its health.
        let healthy = matches!(result, Ok(_) | Err(GatewayError::Rejected { .. }));
        if healthy {
            self.breaker.record_success().await;
        } else {
            self.breaker.record_failure().await;
        }
        result
    }
}

#[async_trait]
impl PaymentGateway for GuardedGateway {
    async fn initiate(&self, charge: &ChargeRequest) -> Result<ChargeSession, GatewayError> {
        if !self.breaker.check().await {
            return Err(GatewayError::CircuitOpen);
        }
        let result = self.inner.initiate(charge).await;
        self.record(result).await
    }

    async fn cancel(&self, order_id: &str) -> Result<(), GatewayError> {
        if !self.breaker.check().await {
            return Err(GatewayError::CircuitOpen);
        }
        let result = self.inner.cancel(order_id).await;
        self.record(result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockPaymentGateway;

    fn charge() -> ChargeRequest {
        ChargeRequest {
            order_id: "order-1".into(),
            amount: 10_000,
            description: "GA".into(),
            customer: "user-1".into(),
        }
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_fails_fast() {
        let mock = Arc::new(MockPaymentGateway::failing());
        let guarded = GuardedGateway::new(
            mock.clone(),
            CircuitBreaker::new("payment", 2, Duration::from_secs(60)),
        );

        for _ in 0..2 {
            let err = guarded.initiate(&charge()).await.unwrap_err();
            assert!(matches!(err, GatewayError::Transport(_)));
        }
        assert_eq!(guarded.breaker().state().await, CircuitState::Open);

        mock.set_failing(false);
        let err = guarded.initiate(&charge()).await.unwrap_err();
        assert_eq!(err, GatewayError::CircuitOpen);
        assert!(mock.charges().await.is_empty());
    }

    #[tokio::test]
    async fn test_half_open_trial_closes_on_success() {
        let mock = Arc::new(MockPaymentGateway::failing());
        let guarded = GuardedGateway::new(
            mock.clone(),
            CircuitBreaker::new("payment", 1, Duration::from_millis(20)),
        );

        guarded.initiate(&charge()).await.unwrap_err();
        assert_eq!(guarded.breaker().state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        mock.set_failing(false);

        guarded.initiate(&charge()).await.unwrap();
        assert_eq!(guarded.breaker().state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_failure_reopens() {
        let mock = Arc::new(MockPaymentGateway::failing());
        let guarded = GuardedGateway::new(
            mock.clone(),
            CircuitBreaker::new("payment", 1, Duration::from_millis(20)),
        );

        guarded.initiate(&charge()).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let err = guarded.cancel("order-1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert_eq!(guarded.breaker().state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_abandoned_trial_is_replaced_after_timeout() {
        let breaker = CircuitBreaker::new("payment", 1, Duration::from_millis(20));
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        // The trial is granted and its caller never reports back.
        assert!(breaker.check().await);
        assert!(!breaker.check().await);
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.check().await);
        assert!(!breaker.check().await);

        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert!(breaker.check().await);
    }

    /// Accepts the charge and never answers.
    struct StalledGateway;

    #[async_trait]
    impl PaymentGateway for StalledGateway {
        async fn initiate(&self, _charge: &ChargeRequest) -> Result<ChargeSession, GatewayError> {
            std::future::pending().await
        }

        async fn cancel(&self, _order_id: &str) -> Result<(), GatewayError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_timed_out_trial_does_not_wedge_breaker() {
        let guarded = GuardedGateway::new(
            Arc::new(StalledGateway),
            CircuitBreaker::new("payment", 1, Duration::from_millis(100)),
        );
        guarded.breaker().record_failure().await;
        tokio::time::sleep(Duration::from_millis(110)).await;

        let trial = tokio::time::timeout(Duration::from_millis(10), guarded.cancel("order-1")).await;
        assert!(trial.is_err());
        assert_eq!(guarded.breaker().state().await, CircuitState::HalfOpen);
        assert_eq!(guarded.cancel("order-1").await.unwrap_err(), GatewayError::CircuitOpen);

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(guarded.breaker().check().await);
        guarded.breaker().record_success().await;
        assert_eq!(guarded.breaker().state().await, CircuitState::Closed);
    }
}
