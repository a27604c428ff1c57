use std::sync::Arc;
use turnstile_reservation::{PaymentLedger, ReservationOrchestrator};
use turnstile_store::app_config::RateLimitConfig;
use turnstile_store::RedisClient;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ReservationOrchestrator>,
    pub ledger: PaymentLedger,
    pub metrics: Arc<Metrics>,
    /// Rate limiting is enabled only when Redis is configured.
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ReservationOrchestrator>,
        metrics: Arc<Metrics>,
        redis: Option<Arc<RedisClient>>,
        rate_limit: RateLimitConfig,
    ) -> Self {
        let ledger = PaymentLedger::new(orchestrator.stores().transactions.clone());
        Self {
            orchestrator,
            ledger,
            metrics,
            redis,
            rate_limit,
        }
    }
}
