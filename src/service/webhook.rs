// service/webhook.rs
//
// Signature verification and typed parsing of gateway webhook deliveries.
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{models::paymentmodel::AccountCapabilities, service::payment_gateway::ConnectedAccount};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing webhook signature header")]
    MissingSignature,

    #[error("Malformed webhook signature header")]
    MalformedSignature,

    #[error("Webhook signature does not match payload")]
    SignatureMismatch,

    #[error("Webhook timestamp is outside the tolerance window")]
    StaleTimestamp,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

fn expected_signature(payload: &[u8], timestamp: i64, secret: &str) -> Result<String, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::SignatureMismatch)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a `t=<unix>,v1=<hex>` header against the raw request body.
/// Several `v1` entries may be present while a secret is being rolled.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            return Err(WebhookError::MalformedSignature);
        };
        match key {
            "t" => {
                timestamp = Some(value.parse().map_err(|_| WebhookError::MalformedSignature)?);
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedSignature);
    }

    let expected = expected_signature(payload, timestamp, secret)?;
    let matched = signatures
        .iter()
        .any(|sig| bool::from(ConstantTimeEq::ct_eq(sig.as_bytes(), expected.as_bytes())));
    if !matched {
        return Err(WebhookError::SignatureMismatch);
    }

    if (now - timestamp).unsigned_abs() > tolerance.as_secs() {
        return Err(WebhookError::StaleTimestamp);
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
}

/// A verified gateway notification, reduced to what the escrow flow acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    PaymentConfirmed { intent_id: String },
    PaymentFailed { intent_id: String, reason: Option<String> },
    PaymentCanceled { intent_id: String },
    AccountUpdated { account_id: String, capabilities: AccountCapabilities },
    Unhandled { kind: String },
}

impl GatewayEvent {
    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::PaymentConfirmed { .. } => "payment_confirmed",
            GatewayEvent::PaymentFailed { .. } => "payment_failed",
            GatewayEvent::PaymentCanceled { .. } => "payment_canceled",
            GatewayEvent::AccountUpdated { .. } => "account_updated",
            GatewayEvent::Unhandled { .. } => "unhandled",
        }
    }
}

fn object<T: serde::de::DeserializeOwned>(kind: &str, value: serde_json::Value) -> Result<T, WebhookError> {
    serde_json::from_value(value)
        .map_err(|e| WebhookError::MalformedPayload(format!("{} payload: {}", kind, e)))
}

/// Parses a delivery body. Returns the gateway's event id alongside the event.
pub fn parse_event(payload: &[u8]) -> Result<(String, GatewayEvent), WebhookError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

    let event = match raw.kind.as_str() {
        "payment_intent.amount_capturable_updated" | "payment_intent.succeeded" => {
            let intent: IntentObject = object(&raw.kind, raw.data.object)?;
            GatewayEvent::PaymentConfirmed { intent_id: intent.id }
        }
        "payment_intent.payment_failed" => {
            let intent: IntentObject = object(&raw.kind, raw.data.object)?;
            GatewayEvent::PaymentFailed {
                intent_id: intent.id,
                reason: intent.last_payment_error.and_then(|e| e.message),
            }
        }
        "payment_intent.canceled" => {
            let intent: IntentObject = object(&raw.kind, raw.data.object)?;
            GatewayEvent::PaymentCanceled { intent_id: intent.id }
        }
        "account.updated" => {
            let account: ConnectedAccount = object(&raw.kind, raw.data.object)?;
            GatewayEvent::AccountUpdated {
                capabilities: account.capabilities(),
                account_id: account.id,
            }
        }
        _ => GatewayEvent::Unhandled { kind: raw.kind },
    };

    Ok((raw.id, event))
}

/// Builds a valid signature header, as the gateway would send it.
#[cfg(test)]
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let signature = expected_signature(payload, timestamp, secret).unwrap();
    format!("t={},v1={}", timestamp, signature)
}
