use std::sync::Arc;

use axum::{
    body::Bytes,
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    error::HttpError,
    service::webhook::{parse_event, verify_signature, WebhookError, SIGNATURE_HEADER},
    AppState,
};

/// Gateway deliveries. 400 tells the gateway to give up on a delivery, 500
/// makes it retry, so only processing failures are reported as 500.
pub async fn gateway_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| HttpError::bad_request(WebhookError::MissingSignature.to_string()))?;

    verify_signature(
        &body,
        signature,
        &app_state.env.gateway_webhook_secret,
        app_state.env.webhook_tolerance,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!("Rejected gateway webhook: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let (event_id, event) = parse_event(&body).map_err(|e| {
        tracing::warn!("Unparseable gateway webhook: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    tracing::info!("Gateway webhook {} ({})", event_id, event.name());

    app_state
        .escrow_service
        .handle_gateway_event(event)
        .await
        .map_err(|e| {
            tracing::error!("Failed to process gateway webhook {}: {}", event_id, e);
            HttpError::server_error("Webhook processing failed")
        })?;

    Ok(Json(json!({ "status": "success" })))
}
