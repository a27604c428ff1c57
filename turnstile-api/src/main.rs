use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile_api::{app, spawn_event_recorder, AppState, Metrics};
use turnstile_core::PaymentGateway;
use turnstile_reservation::{CircuitBreaker, GuardedGateway, MockPaymentGateway, ReservationOrchestrator};
use turnstile_store::app_config::{Config, GatewayMode};
use turnstile_store::{DbClient, HttpPaymentGateway, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "turnstile_api=debug,turnstile_reservation=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Turnstile API on port {}", config.server.port);

    let db = DbClient::from_config(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    if config.database.run_migrations {
        db.migrate().await.context("Failed to run migrations")?;
    }
    let stores = db.stores(config.reservation.lock_timeout());

    let gateway: Arc<dyn PaymentGateway> = match config.gateway.mode {
        GatewayMode::Mock => {
            tracing::warn!("Payment gateway in mock mode, no real charges will be created");
            Arc::new(MockPaymentGateway::new())
        }
        GatewayMode::Http => Arc::new(
            HttpPaymentGateway::new(&config.gateway).context("Failed to build gateway client")?,
        ),
    };
    let breaker = CircuitBreaker::new(
        "payment",
        config.gateway.circuit_failure_threshold as usize,
        Duration::from_secs(config.gateway.circuit_reset_secs),
    );
    let gateway: Arc<dyn PaymentGateway> = Arc::new(GuardedGateway::new(gateway, breaker));

    let orchestrator = Arc::new(ReservationOrchestrator::new(stores, gateway));

    let metrics = Arc::new(Metrics::new()?);
    spawn_event_recorder(metrics.clone(), orchestrator.subscribe());

    // Redis is optional; without it requests are not rate limited.
    let redis = match config.redis.url.as_deref() {
        Some(url) => Some(Arc::new(
            RedisClient::new(url).context("Invalid Redis URL")?,
        )),
        None => {
            tracing::info!("Redis not configured, rate limiting disabled");
            None
        }
    };

    let app_state = AppState::new(orchestrator, metrics, redis, config.rate_limit.clone());
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
