use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use turnstile_reservation::NotificationOutcome;
use turnstile_shared::ReservationEvent;

/// Prometheus registry for reservation lifecycle counters, scraped via /metrics.
pub struct Metrics {
    registry: Registry,
    pub reservation_events: IntCounterVec,
    pub notifications: IntCounterVec,
    pub events_lagged: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let reservation_events = IntCounterVec::new(
            Opts::new("turnstile_reservation_events_total", "Reservation lifecycle events"),
            &["kind"],
        )?;
        registry.register(Box::new(reservation_events.clone()))?;

        let notifications = IntCounterVec::new(
            Opts::new(
                "turnstile_payment_notifications_total",
                "Payment gateway notifications by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(notifications.clone()))?;

        let events_lagged = IntCounter::new(
            "turnstile_events_lagged_total",
            "Lifecycle events dropped because the metrics recorder fell behind",
        )?;
        registry.register(Box::new(events_lagged.clone()))?;

        Ok(Self {
            registry,
            reservation_events,
            notifications,
            events_lagged,
        })
    }

    pub fn record(&self, event: &ReservationEvent) {
        self.reservation_events.with_label_values(&[event.kind()]).inc();
    }

    pub fn record_notification(&self, outcome: &NotificationOutcome) {
        let label = match outcome {
            NotificationOutcome::Recorded { .. } => "recorded",
            NotificationOutcome::Ignored { .. } => "ignored",
            NotificationOutcome::Confirmed { .. } => "confirmed",
            NotificationOutcome::ReconciliationRequired { .. } => "reconciliation_required",
        };
        self.notifications.with_label_values(&[label]).inc();
    }

    /// Text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Counts every event the orchestrator broadcasts until the channel closes.
pub fn spawn_event_recorder(
    metrics: Arc<Metrics>,
    mut events: broadcast::Receiver<ReservationEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => metrics.record(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Metrics recorder lagged, {} events dropped", skipped);
                    metrics.events_lagged.inc_by(skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
