//! Calling-platform webhook shims
//!
//! Both routes answer 200 `{"received": true}` whatever happens downstream:
//! the platform treats non-2xx as a delivery failure and would retry events
//! that can never succeed (unknown call, malformed payload).

use std::sync::Arc;

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde::Serialize;
use serde_json::Value;

use callctl_core::{apply_event, WebhookEnvelope};

use crate::server::AppState;

/// Acknowledgement body
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

const ACK: WebhookAck = WebhookAck { received: true };

/// POST /webhooks/vapi - persist end-of-call reports and status updates
async fn vapi_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> Json<WebhookAck> {
    let envelope = match WebhookEnvelope::parse(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "Unparseable webhook payload");
            return Json(ACK);
        }
    };

    let message = &envelope.message;
    let call_id = message.call.as_ref().map(|c| c.id.as_str()).unwrap_or("-");
    tracing::info!(kind = %message.kind, call_id = %call_id, "Webhook received");

    match apply_event(state.store.as_ref(), message).await {
        Ok(applied) => tracing::debug!(?applied, "Webhook applied"),
        Err(e) => tracing::error!(kind = %message.kind, call_id = %call_id, error = %e, "Failed to persist webhook"),
    }

    Json(ACK)
}

/// POST /webhooks/vapi/log - log the event, touch nothing
async fn vapi_webhook_log(body: Bytes) -> Json<WebhookAck> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => {
            let message = payload.get("message");
            let kind = message
                .and_then(|m| m.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let call_id = message
                .and_then(|m| m.pointer("/call/id"))
                .and_then(Value::as_str)
                .unwrap_or("-");
            tracing::info!(kind = %kind, call_id = %call_id, "Webhook logged");
            tracing::debug!(payload = %payload, "Webhook payload");
        }
        Err(e) => tracing::warn!(error = %e, bytes = body.len(), "Unparseable webhook payload"),
    }

    Json(ACK)
}

/// Webhook routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhooks/vapi", post(vapi_webhook))
        .route("/webhooks/vapi/log", post(vapi_webhook_log))
}
