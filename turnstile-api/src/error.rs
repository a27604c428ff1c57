use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use turnstile_reservation::{ReservationError, ValidationError};

#[derive(Debug)]
pub enum AppError {
    Reservation(ReservationError),
    Anyhow(anyhow::Error),
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        AppError::Reservation(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Anyhow(err)
    }
}

fn validation_status(err: &ValidationError) -> (StatusCode, &'static str) {
    match err {
        ValidationError::AlreadyRegistered { .. } | ValidationError::Duplicate(_) => {
            (StatusCode::CONFLICT, "already_registered")
        }
        ValidationError::SoldOut(_) => (StatusCode::CONFLICT, "sold_out"),
        ValidationError::Unavailable(_) => (StatusCode::CONFLICT, "ticket_unavailable"),
        ValidationError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        ValidationError::PaidRegistration => (StatusCode::CONFLICT, "registration_paid"),
        ValidationError::TransactionNotPending(_) => (StatusCode::CONFLICT, "transaction_not_pending"),
        ValidationError::InvalidRsvpStatus(_) => (StatusCode::BAD_REQUEST, "invalid_rsvp_status"),
        ValidationError::TicketTypeMismatch { .. } => (StatusCode::BAD_REQUEST, "ticket_type_mismatch"),
        ValidationError::MissingTicketType => (StatusCode::BAD_REQUEST, "missing_ticket_type"),
        ValidationError::UnknownGatewayStatus(_) => (StatusCode::BAD_REQUEST, "unknown_gateway_status"),
        ValidationError::PaymentNotRequired(_) => (StatusCode::BAD_REQUEST, "payment_not_required"),
    }
}

fn error_body(code: &str, message: String) -> serde_json::Value {
    json!({ "error": { "code": code, "message": message } })
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::Reservation(err) => err,
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(error_body("internal", "Internal Server Error".to_string())),
                )
                    .into_response();
            }
        };

        let message = err.to_string();
        let (status, body) = match err {
            ReservationError::Validation(ref v) => {
                let (status, code) = validation_status(v);
                (status, error_body(code, message))
            }
            ReservationError::NotFound(_) => (StatusCode::NOT_FOUND, error_body("not_found", message)),
            ReservationError::InventoryExhausted { .. } => {
                (StatusCode::CONFLICT, error_body("inventory_exhausted", message))
            }
            ReservationError::PaymentNotStarted { registration, source } => {
                let (status, message) = match *source {
                    ReservationError::Gateway(_) => (StatusCode::BAD_GATEWAY, message),
                    _ => {
                        tracing::error!("Payment not started: {}", message);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "registration saved but payment could not be started".to_string(),
                        )
                    }
                };
                let mut body = error_body("payment_not_started", message);
                body["registration"] = json!(registration);
                (status, body)
            }
            ReservationError::Gateway(_) => (StatusCode::BAD_GATEWAY, error_body("gateway_error", message)),
            ReservationError::ConcurrencyConflict(_) => {
                tracing::warn!("Concurrency conflict: {}", message);
                (StatusCode::SERVICE_UNAVAILABLE, error_body("conflict", message))
            }
            ReservationError::Store(_) => {
                tracing::error!("Internal Server Error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("internal", "Internal Server Error".to_string()),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use turnstile_core::{GatewayError, PaymentStatus, Registration, RsvpStatus, StoreError};

    #[test]
    fn test_store_failures_hide_details() {
        let response = AppError::from(ReservationError::Store(StoreError::Backend(
            "password authentication failed".into(),
        )))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ReservationError::NotFound("registration".into()), StatusCode::NOT_FOUND),
            (
                ReservationError::ConcurrencyConflict("lock".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ValidationError::InvalidRsvpStatus("x".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (ValidationError::SoldOut(1).into(), StatusCode::CONFLICT),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_internal_failures_hide_details() {
        let err = anyhow::anyhow!("buffer not utf-8").context("Failed to encode metrics");
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "internal");
        assert_eq!(body["error"]["message"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_payment_not_started_status_follows_cause() {
        let registration = Registration {
            id: 1,
            user_id: 4,
            event_id: 2,
            ticket_type_id: Some(3),
            rsvp_status: RsvpStatus::Attending,
            rsvp_at: Some(Utc::now()),
            payment_status: PaymentStatus::Pending,
            ticket_code: None,
        };

        let err = ReservationError::PaymentNotStarted {
            registration: Box::new(registration.clone()),
            source: Box::new(GatewayError::Timeout.into()),
        };
        assert_eq!(AppError::from(err).into_response().status(), StatusCode::BAD_GATEWAY);

        let err = ReservationError::PaymentNotStarted {
            registration: Box::new(registration),
            source: Box::new(StoreError::Backend("connection reset".into()).into()),
        };
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "payment_not_started");
        assert_eq!(body["registration"]["user_id"], 4);
        assert!(!body["error"]["message"].as_str().unwrap().contains("connection reset"));
    }
}
