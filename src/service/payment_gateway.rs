// service/payment_gateway.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{config::Config, models::paymentmodel::AccountCapabilities};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
    pub client_secret: Option<String>,
    pub transfer_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateIntentParams {
    pub amount_minor: i64,
    pub application_fee_minor: i64,
    pub currency: String,
    pub destination_account: String,
    pub metadata: Vec<(String, String)>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Refund {
    pub id: String,
    pub status: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConnectedAccount {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub details_submitted: bool,
}

impl ConnectedAccount {
    pub fn capabilities(&self) -> AccountCapabilities {
        AccountCapabilities {
            onboarding_completed: self.details_submitted,
            charges_enabled: self.charges_enabled,
            payouts_enabled: self.payouts_enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountLink {
    pub url: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    Card,
    RateLimit,
    InvalidRequest,
    Api,
    Connection,
    Authentication,
    Timeout,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?} error from payment gateway: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub code: Option<String>,
    pub message: String,
    /// Status of the intent the gateway reported alongside the error, if any.
    pub intent_status: Option<IntentStatus>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
            intent_status: None,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            GatewayErrorKind::Timeout,
            format!("gateway call timed out after {:?}", after),
        )
    }

    /// Capturing an intent that was already captured is reported as an
    /// unexpected-state error carrying the intent in `succeeded`.
    pub fn is_already_captured(&self) -> bool {
        self.code.as_deref() == Some("payment_intent_unexpected_state")
            && self.intent_status == Some(IntentStatus::Succeeded)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            GatewayErrorKind::Timeout
        } else if err.is_decode() {
            GatewayErrorKind::Api
        } else {
            GatewayErrorKind::Connection
        };
        GatewayError::new(kind, err.to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Manual-capture intent: funds are authorised now and captured later.
    async fn create_intent(&self, params: CreateIntentParams) -> Result<PaymentIntent, GatewayError>;

    async fn capture_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    async fn create_refund(
        &self,
        intent_id: &str,
        amount_minor: i64,
        reason: &str,
    ) -> Result<Refund, GatewayError>;

    async fn create_connected_account(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<ConnectedAccount, GatewayError>;

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<AccountLink, GatewayError>;

    async fn retrieve_account(&self, account_id: &str) -> Result<ConnectedAccount, GatewayError>;

    async fn delete_account(&self, account_id: &str) -> Result<(), GatewayError>;
}

// Wire shapes of the Stripe-compatible API.

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LatestCharge {
    Id(String),
    Expanded {
        #[allow(dead_code)]
        id: String,
        transfer: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct IntentBody {
    id: String,
    status: IntentStatus,
    amount: i64,
    currency: String,
    client_secret: Option<String>,
    latest_charge: Option<LatestCharge>,
}

impl From<IntentBody> for PaymentIntent {
    fn from(body: IntentBody) -> Self {
        let transfer_id = match body.latest_charge {
            Some(LatestCharge::Expanded { transfer, .. }) => transfer,
            _ => None,
        };
        PaymentIntent {
            id: body.id,
            status: body.status,
            amount: body.amount,
            currency: body.currency,
            client_secret: body.client_secret,
            transfer_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    message: Option<String>,
    payment_intent: Option<ErrorIntent>,
}

#[derive(Debug, Deserialize)]
struct ErrorIntent {
    status: IntentStatus,
}

#[derive(Debug, Deserialize)]
struct DeletedBody {
    deleted: bool,
}

/// Maps a non-2xx gateway response onto the error taxonomy.
pub(crate) fn map_error_response(status: StatusCode, body: &str) -> GatewayError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);

    let kind = match (status, parsed.as_ref().and_then(|e| e.error_type.as_deref())) {
        (StatusCode::UNAUTHORIZED, _) | (StatusCode::FORBIDDEN, _) => GatewayErrorKind::Authentication,
        (StatusCode::TOO_MANY_REQUESTS, _) => GatewayErrorKind::RateLimit,
        (_, Some("card_error")) => GatewayErrorKind::Card,
        (_, Some("invalid_request_error")) | (_, Some("idempotency_error")) => {
            GatewayErrorKind::InvalidRequest
        }
        (s, _) if s.is_server_error() => GatewayErrorKind::Api,
        (s, _) if s.is_client_error() => GatewayErrorKind::InvalidRequest,
        _ => GatewayErrorKind::Api,
    };

    match parsed {
        Some(err) => GatewayError {
            kind,
            code: err.code,
            message: err
                .message
                .unwrap_or_else(|| format!("gateway responded with {}", status)),
            intent_status: err.payment_intent.map(|pi| pi.status),
        },
        None => GatewayError::new(kind, format!("gateway responded with {}", status)),
    }
}

pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.gateway_timeout)
            .build()?;

        Ok(Self {
            client,
            api_base: config.gateway_api_base.trim_end_matches('/').to_string(),
            secret_key: config.gateway_secret_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request.bearer_auth(&self.secret_key).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let error = map_error_response(status, &body);
        tracing::warn!(
            "Payment gateway error: status={}, kind={:?}, code={:?}",
            status,
            error.kind,
            error.code
        );
        Err(error)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, params: CreateIntentParams) -> Result<PaymentIntent, GatewayError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), params.amount_minor.to_string()),
            ("currency".into(), params.currency.clone()),
            ("capture_method".into(), "manual".into()),
            ("application_fee_amount".into(), params.application_fee_minor.to_string()),
            ("transfer_data[destination]".into(), params.destination_account.clone()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
        ];
        form.extend(
            params
                .metadata
                .iter()
                .map(|(k, v)| (format!("metadata[{}]", k), v.clone())),
        );

        let request = self
            .client
            .post(self.url("payment_intents"))
            .header("Idempotency-Key", &params.idempotency_key)
            .form(&form);

        let body: IntentBody = self.send(request).await?;
        Ok(body.into())
    }

    async fn capture_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let request = self
            .client
            .post(self.url(&format!("payment_intents/{}/capture", intent_id)))
            .header("Idempotency-Key", format!("capture-{}", intent_id))
            .form(&[("expand[]", "latest_charge")]);

        let body: IntentBody = self.send(request).await?;
        Ok(body.into())
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let request = self
            .client
            .get(self.url(&format!("payment_intents/{}", intent_id)))
            .query(&[("expand[]", "latest_charge")]);

        let body: IntentBody = self.send(request).await?;
        Ok(body.into())
    }

    async fn create_refund(
        &self,
        intent_id: &str,
        amount_minor: i64,
        reason: &str,
    ) -> Result<Refund, GatewayError> {
        let amount = amount_minor.to_string();
        let request = self
            .client
            .post(self.url("refunds"))
            .header("Idempotency-Key", format!("refund-{}", intent_id))
            .form(&[
                ("payment_intent", intent_id),
                ("amount", amount.as_str()),
                ("reason", "requested_by_customer"),
                ("metadata[reason]", reason),
            ]);

        self.send(request).await
    }

    async fn create_connected_account(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<ConnectedAccount, GatewayError> {
        let user_id = user_id.to_string();
        let request = self
            .client
            .post(self.url("accounts"))
            .header("Idempotency-Key", format!("account-{}", user_id))
            .form(&[
                ("type", "express"),
                ("email", email),
                ("capabilities[card_payments][requested]", "true"),
                ("capabilities[transfers][requested]", "true"),
                ("metadata[user_id]", user_id.as_str()),
            ]);

        self.send(request).await
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<AccountLink, GatewayError> {
        let request = self.client.post(self.url("account_links")).form(&[
            ("account", account_id),
            ("refresh_url", refresh_url),
            ("return_url", return_url),
            ("type", "account_onboarding"),
        ]);

        self.send(request).await
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<ConnectedAccount, GatewayError> {
        let request = self.client.get(self.url(&format!("accounts/{}", account_id)));
        self.send(request).await
    }

    async fn delete_account(&self, account_id: &str) -> Result<(), GatewayError> {
        let request = self.client.delete(self.url(&format!("accounts/{}", account_id)));
        let body: DeletedBody = self.send(request).await?;

        if body.deleted {
            Ok(())
        } else {
            Err(GatewayError::new(
                GatewayErrorKind::Api,
                format!("gateway refused to delete account {}", account_id),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_captured_is_detected_from_code_and_intent_state() {
        let body = r#"{"error":{"type":"invalid_request_error","code":"payment_intent_unexpected_state",
            "message":"This PaymentIntent could not be captured because it has a status of succeeded.",
            "payment_intent":{"id":"pi_1","status":"succeeded"}}}"#;

        let err = map_error_response(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind, GatewayErrorKind::InvalidRequest);
        assert!(err.is_already_captured());
    }

    #[test]
    fn test_unexpected_state_on_canceled_intent_is_not_already_captured() {
        let body = r#"{"error":{"type":"invalid_request_error","code":"payment_intent_unexpected_state",
            "message":"canceled","payment_intent":{"id":"pi_1","status":"canceled"}}}"#;

        let err = map_error_response(StatusCode::BAD_REQUEST, body);
        assert!(!err.is_already_captured());
    }

    #[test]
    fn test_error_kinds_follow_status_and_type() {
        let card = r#"{"error":{"type":"card_error","code":"card_declined","message":"declined"}}"#;
        assert_eq!(map_error_response(StatusCode::PAYMENT_REQUIRED, card).kind, GatewayErrorKind::Card);
        assert_eq!(
            map_error_response(StatusCode::TOO_MANY_REQUESTS, "{}").kind,
            GatewayErrorKind::RateLimit
        );
        assert_eq!(
            map_error_response(StatusCode::UNAUTHORIZED, "not json").kind,
            GatewayErrorKind::Authentication
        );
        assert_eq!(
            map_error_response(StatusCode::BAD_GATEWAY, "").kind,
            GatewayErrorKind::Api
        );
    }

    #[test]
    fn test_intent_body_reads_expanded_charge_transfer() {
        let body = r#"{"id":"pi_9","status":"succeeded","amount":10000,"currency":"usd",
            "client_secret":"pi_9_secret","latest_charge":{"id":"ch_1","transfer":"tr_7"}}"#;
        let intent: PaymentIntent = serde_json::from_str::<IntentBody>(body).unwrap().into();
        assert_eq!(intent.status, IntentStatus::Succeeded);
        assert_eq!(intent.transfer_id.as_deref(), Some("tr_7"));

        let body = r#"{"id":"pi_9","status":"requires_capture","amount":10000,"currency":"usd",
            "client_secret":null,"latest_charge":"ch_1"}"#;
        let intent: PaymentIntent = serde_json::from_str::<IntentBody>(body).unwrap().into();
        assert_eq!(intent.status, IntentStatus::RequiresCapture);
        assert_eq!(intent.transfer_id, None);
    }

    #[test]
    fn test_unknown_intent_status_does_not_fail_parsing() {
        let body = r#"{"id":"pi_9","status":"requires_reauthorization","amount":1,"currency":"usd"}"#;
        let intent: PaymentIntent = serde_json::from_str::<IntentBody>(body).unwrap().into();
        assert_eq!(intent.status, IntentStatus::Unknown);
    }
}
