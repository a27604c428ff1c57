use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use turnstile_core::Transaction;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TransactionFilter {
    pub event_id: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users/{user_id}/transactions", get(list_transactions))
        .route("/v1/users/{user_id}/transactions/{id}", delete(delete_transaction))
        .route("/v1/transactions/{order_id}", get(get_transaction))
}

/// GET /v1/users/{user_id}/transactions?event_id=
async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let transactions = match filter.event_id {
        Some(event_id) => state.ledger.list_for_event(user_id, event_id).await?,
        None => state.ledger.list_for_user(user_id).await?,
    };
    Ok(Json(transactions))
}

/// DELETE /v1/users/{user_id}/transactions/{id}
/// Settled and failed transactions are kept for audit.
async fn delete_transaction(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    state.ledger.delete_pending(id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    Ok(Json(state.ledger.find(&order_id).await?))
}
