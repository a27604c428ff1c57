use anyhow::Context;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod metrics;
pub mod registrations;
pub mod state;
pub mod transactions;
pub mod webhooks;

use error::AppError;
pub use metrics::{spawn_event_recorder, Metrics};
pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::USER_AGENT]);

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .merge(registrations::routes())
        .merge(transactions::routes())
        .merge(webhooks::routes());

    if state.redis.is_some() {
        router = router.layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "turnstile" }))
}

async fn render_metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.metrics.render().context("Failed to encode metrics")?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

/// Fixed-window limit per client IP. Fails open when Redis is unreachable.
async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("ratelimit:{}", ip);

    match redis
        .check_rate_limit(&key, state.rate_limit.requests, state.rate_limit.window_seconds)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response(),
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
            next.run(req).await
        }
    }
}
