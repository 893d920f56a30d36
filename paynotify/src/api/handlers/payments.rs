//! HTTP handler for inbound payment events.

use axum::{extract::State, http::StatusCode, response::Json};
use tracing::instrument;

use crate::{
    AppState,
    api::extract::ApiJson,
    api::models::{notifications::IdempotencyKeyResponse, payments::PaymentRequest},
    errors::Result,
};

/// Record a payment event and queue the customer's notification.
///
/// 202 means the notification was recorded and accepted for delivery, not that it was
/// delivered.
#[instrument(skip_all, fields(customer_id = request.customer_id))]
pub async fn create_payment(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PaymentRequest>,
) -> Result<(StatusCode, Json<IdempotencyKeyResponse>)> {
    let idempotency_key = state.dispatcher.notify_customer(request.customer_id, request.details).await?;
    Ok((StatusCode::ACCEPTED, Json(IdempotencyKeyResponse { idempotency_key })))
}
