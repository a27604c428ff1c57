use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use turnstile_reservation::{NotificationOutcome, PaymentNotification};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments/notification", post(handle_payment_notification))
}

/// POST /v1/webhooks/payments/notification
/// Receive transaction status updates from the payment gateway.
///
/// Answers 200 for anything recorded, including settlements that need manual
/// reconciliation, so the gateway stops redelivering. Unknown orders get 404.
pub async fn handle_payment_notification(
    State(state): State<AppState>,
    Json(payload): Json<PaymentNotification>,
) -> Result<Json<NotificationOutcome>, AppError> {
    tracing::info!(
        "Received notification: {} for order {}",
        payload.transaction_status,
        payload.order_id
    );

    let outcome = state.orchestrator.handle_notification(&payload).await?;
    state.metrics.record_notification(&outcome);

    Ok(Json(outcome))
}
