//! HTTP handlers for webhook configuration and notification endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Json, Response},
};
use tracing::instrument;
use url::Url;

use crate::{
    AppState,
    api::extract::ApiJson,
    api::models::notifications::{ConfigureWebhookRequest, IdempotencyKeyResponse, NotificationResponse, ResendRequest},
    db::errors::DbError,
    errors::{Error, Result},
    types::{IdempotencyKey, new_idempotency_key},
};

/// Token from an `Authorization: Bearer <token>` header, if present and non-empty.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn validate_webhook_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::BadRequest {
        message: format!("Invalid webhook URL: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::BadRequest {
            message: "Webhook URL must use http or https".to_string(),
        });
    }
    Ok(url)
}

/// Configure a customer's webhook URL and bearer token, or send a test notification.
///
/// With `is_test` the canned test payload is queued for `url` and nothing is saved (202).
/// Otherwise the configuration overwrites the previous one (201).
#[instrument(skip_all, fields(customer_id = request.customer_id, is_test = request.is_test))]
pub async fn configure_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<ConfigureWebhookRequest>,
) -> Result<Response> {
    let token = bearer_token(&headers)
        .or(request.token.as_deref().filter(|t| !t.is_empty()))
        .ok_or_else(|| Error::BadRequest {
            message: "A bearer token is required, in the Authorization header or the request body".to_string(),
        })?
        .to_string();
    let url = validate_webhook_url(&request.url)?;

    if request.is_test {
        state.dispatcher.send_test(url.as_str(), &token)?;
        return Ok(StatusCode::ACCEPTED.into_response());
    }

    state
        .store
        .configure_webhook(request.customer_id, &token, url.as_str())
        .await
        .map_err(|e| match e {
            DbError::NotFound => Error::NotFound {
                resource: "Customer".to_string(),
                id: request.customer_id.to_string(),
            },
            other => Error::Database(other),
        })?;

    tracing::info!(customer_id = request.customer_id, "Webhook configured");
    let response = IdempotencyKeyResponse {
        idempotency_key: new_idempotency_key(),
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Redeliver a recorded notification under its original idempotency key.
#[instrument(skip_all, fields(customer_id = request.customer_id))]
pub async fn resend_notification(State(state): State<AppState>, ApiJson(request): ApiJson<ResendRequest>) -> Result<StatusCode> {
    state.resender.resend(request.idempotency_key, request.customer_id).await?;
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state))]
pub async fn get_notification(
    State(state): State<AppState>,
    Path(idempotency_key): Path<IdempotencyKey>,
) -> Result<Json<NotificationResponse>> {
    let record = state.store.lookup_notification(idempotency_key).await.map_err(|e| match e {
        DbError::NotFound => Error::NotFound {
            resource: "Notification".to_string(),
            id: idempotency_key.to_string(),
        },
        other => Error::Database(other),
    })?;

    Ok(Json(record.into()))
}
