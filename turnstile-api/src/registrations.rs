use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use turnstile_core::Registration;
use turnstile_reservation::{PaymentSession, RegisterRequest, Registered};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRegistrationRequest {
    pub user_id: i64,
    pub event_id: i64,
    #[serde(default)]
    pub ticket_type_id: Option<i64>,
    #[serde(default = "default_rsvp_status")]
    pub rsvp_status: String,
}

fn default_rsvp_status() -> String {
    "pending".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateRsvpRequest {
    pub rsvp_status: String,
}

#[derive(Debug, Serialize)]
pub struct FavoriteCategoryResponse {
    pub user_id: i64,
    pub category: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/registrations", post(create_registration))
        .route("/v1/events/{event_id}/registrations", get(list_attendees))
        .route(
            "/v1/events/{event_id}/registrations/{user_id}",
            get(get_registration).delete(cancel_registration),
        )
        .route(
            "/v1/events/{event_id}/registrations/{user_id}/confirm-payment",
            post(confirm_payment),
        )
        .route(
            "/v1/events/{event_id}/registrations/{user_id}/retry-payment",
            post(retry_payment),
        )
        .route(
            "/v1/events/{event_id}/registrations/{user_id}/rsvp",
            patch(update_rsvp),
        )
        .route("/v1/users/{user_id}/registrations", get(list_user_registrations))
        .route("/v1/users/{user_id}/favorite-category", get(favorite_category))
}

/// POST /v1/registrations
async fn create_registration(
    State(state): State<AppState>,
    Json(req): Json<CreateRegistrationRequest>,
) -> Result<(StatusCode, Json<Registered>), AppError> {
    tracing::info!(
        "Registration request: user {} event {} ticket type {:?}",
        req.user_id,
        req.event_id,
        req.ticket_type_id
    );

    let registered = state
        .orchestrator
        .register(RegisterRequest {
            user_id: req.user_id,
            event_id: req.event_id,
            ticket_type_id: req.ticket_type_id,
            rsvp_status: req.rsvp_status,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(registered)))
}

async fn list_attendees(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Json<Vec<Registration>>, AppError> {
    Ok(Json(state.orchestrator.list_attendees(event_id).await?))
}

async fn get_registration(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<Registration>, AppError> {
    Ok(Json(state.orchestrator.get_registration(user_id, event_id).await?))
}

/// DELETE /v1/events/{event_id}/registrations/{user_id}
/// Only unpaid registrations can be cancelled.
async fn cancel_registration(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    state.orchestrator.cancel_registration(user_id, event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/events/{event_id}/registrations/{user_id}/confirm-payment
/// Operator path for a settlement confirmed out of band.
async fn confirm_payment(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<Registration>, AppError> {
    Ok(Json(state.orchestrator.confirm_payment(user_id, event_id).await?))
}

async fn retry_payment(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(i64, i64)>,
) -> Result<Json<PaymentSession>, AppError> {
    Ok(Json(state.orchestrator.retry_payment(user_id, event_id).await?))
}

async fn update_rsvp(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateRsvpRequest>,
) -> Result<Json<Registration>, AppError> {
    let registration = state
        .orchestrator
        .update_rsvp_status(user_id, event_id, &req.rsvp_status)
        .await?;
    Ok(Json(registration))
}

async fn list_user_registrations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Registration>>, AppError> {
    Ok(Json(state.orchestrator.list_user_registrations(user_id).await?))
}

async fn favorite_category(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<FavoriteCategoryResponse>, AppError> {
    let category = state.orchestrator.favorite_category(user_id).await?;
    Ok(Json(FavoriteCategoryResponse { user_id, category }))
}
