use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::engine::payment::start_payment;
use crate::error::AppError;
use crate::models::payment::{PaymentRequest, PaymentSession};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments", post(create_payment).get(list_payments))
        .route("/payments/:id", get(get_payment))
}

async fn create_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PaymentRequest>,
) -> Result<Json<PaymentSession>, AppError> {
    Ok(Json(start_payment(&state, payload).await?))
}

async fn list_payments(State(state): State<Arc<AppState>>) -> Json<Vec<PaymentSession>> {
    let mut payments: Vec<PaymentSession> = state
        .payments
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(payments)
}

async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentSession>, AppError> {
    let payment = state
        .payments
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("payment {} not found", id)))?;

    Ok(Json(payment.value().clone()))
}
