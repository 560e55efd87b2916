// service/testing.rs
//
// Scripted collaborators shared by the service and handler test suites.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::types::BigDecimal;
use std::str::FromStr;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    config::Config,
    db::{memory::MemoryLedger, TaskExt},
    models::{notificationmodel::Notification, taskmodel::*},
    service::{
        error::ServiceError,
        notification_service::NotificationDispatcher,
        payment_gateway::*,
    },
};

#[derive(Default)]
struct FakeGatewayState {
    next_id: u64,
    intents: HashMap<String, PaymentIntent>,
    created_params: Vec<CreateIntentParams>,
    accounts: HashMap<String, ConnectedAccount>,
    refunds: Vec<(String, i64, String)>,
    create_error: Option<GatewayError>,
    create_delay: Option<Duration>,
    capture_error: Option<GatewayError>,
    captures: usize,
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeGatewayState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_creates_with(&self, error: GatewayError) {
        self.state.lock().await.create_error = Some(error);
    }

    pub async fn delay_creates(&self, delay: Duration) {
        self.state.lock().await.create_delay = Some(delay);
    }

    pub async fn fail_captures_with(&self, error: GatewayError) {
        self.state.lock().await.capture_error = Some(error);
    }

    /// Simulates the poster confirming their payment method.
    pub async fn set_intent_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.state.lock().await.intents.get_mut(intent_id) {
            intent.status = status;
        }
    }

    pub async fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.state.lock().await.intents.get(intent_id).cloned()
    }

    pub async fn intents_created(&self) -> usize {
        self.state.lock().await.created_params.len()
    }

    pub async fn last_create_params(&self) -> Option<CreateIntentParams> {
        self.state.lock().await.created_params.last().cloned()
    }

    pub async fn refunds(&self) -> Vec<(String, i64, String)> {
        self.state.lock().await.refunds.clone()
    }

    pub async fn captures(&self) -> usize {
        self.state.lock().await.captures
    }

    pub async fn put_account(&self, account: ConnectedAccount) {
        self.state.lock().await.accounts.insert(account.id.clone(), account);
    }

    pub async fn has_account(&self, account_id: &str) -> bool {
        self.state.lock().await.accounts.contains_key(account_id)
    }
}

fn not_found(what: &str, id: &str) -> GatewayError {
    GatewayError {
        kind: GatewayErrorKind::InvalidRequest,
        code: Some("resource_missing".to_string()),
        message: format!("No such {}: {}", what, id),
        intent_status: None,
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, params: CreateIntentParams) -> Result<PaymentIntent, GatewayError> {
        let delay = self.state.lock().await.create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        if let Some(err) = state.create_error.clone() {
            return Err(err);
        }
        state.next_id += 1;
        let id = format!("pi_{}", state.next_id);
        let intent = PaymentIntent {
            id: id.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            amount: params.amount_minor,
            currency: params.currency.clone(),
            client_secret: Some(format!("{}_secret", id)),
            transfer_id: None,
        };
        state.intents.insert(id, intent.clone());
        state.created_params.push(params);
        Ok(intent)
    }

    async fn capture_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.capture_error.clone() {
            return Err(err);
        }
        state.next_id += 1;
        let transfer_id = format!("tr_{}", state.next_id);
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| not_found("payment_intent", intent_id))?;

        match intent.status {
            IntentStatus::RequiresCapture => {
                intent.status = IntentStatus::Succeeded;
                intent.transfer_id = Some(transfer_id);
                let captured = intent.clone();
                state.captures += 1;
                Ok(captured)
            }
            status => Err(GatewayError {
                kind: GatewayErrorKind::InvalidRequest,
                code: Some("payment_intent_unexpected_state".to_string()),
                message: format!("This PaymentIntent has a status of {:?}", status),
                intent_status: Some(status),
            }),
        }
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        self.state
            .lock()
            .await
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| not_found("payment_intent", intent_id))
    }

    async fn create_refund(
        &self,
        intent_id: &str,
        amount_minor: i64,
        reason: &str,
    ) -> Result<Refund, GatewayError> {
        let mut state = self.state.lock().await;
        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| not_found("payment_intent", intent_id))?;
        if intent.status == IntentStatus::Canceled {
            return Err(GatewayError {
                kind: GatewayErrorKind::InvalidRequest,
                code: Some("charge_already_refunded".to_string()),
                message: "already refunded".to_string(),
                intent_status: Some(IntentStatus::Canceled),
            });
        }
        intent.status = IntentStatus::Canceled;
        state.next_id += 1;
        let refund = Refund {
            id: format!("re_{}", state.next_id),
            status: "succeeded".to_string(),
            amount: amount_minor,
        };
        state
            .refunds
            .push((intent_id.to_string(), amount_minor, reason.to_string()));
        Ok(refund)
    }

    async fn create_connected_account(
        &self,
        _user_id: Uuid,
        _email: &str,
    ) -> Result<ConnectedAccount, GatewayError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let account = ConnectedAccount {
            id: format!("acct_{}", state.next_id),
            charges_enabled: false,
            payouts_enabled: false,
            details_submitted: false,
        };
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn create_onboarding_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        return_url: &str,
    ) -> Result<AccountLink, GatewayError> {
        if !self.has_account(account_id).await {
            return Err(not_found("account", account_id));
        }
        Ok(AccountLink {
            url: format!("https://connect.example.test/setup/{}?return={}", account_id, return_url),
            expires_at: 1_900_000_000,
        })
    }

    async fn retrieve_account(&self, account_id: &str) -> Result<ConnectedAccount, GatewayError> {
        self.state
            .lock()
            .await
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| not_found("account", account_id))
    }

    async fn delete_account(&self, account_id: &str) -> Result<(), GatewayError> {
        self.state
            .lock()
            .await
            .accounts
            .remove(account_id)
            .map(|_| ())
            .ok_or_else(|| not_found("account", account_id))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), ServiceError> {
        if self.fail {
            return Err(ServiceError::Other("notification channel down".to_string()));
        }
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

/// Ledger, gateway and notifier wired together the way `main` wires the real ones.
pub struct Harness {
    pub config: Config,
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            config: Config::for_tests(),
            ledger: Arc::new(MemoryLedger::new()),
            gateway: Arc::new(FakeGateway::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    pub async fn open_task(&self, poster_id: Uuid, budget: &str) -> Task {
        self.ledger
            .create_task(NewTask {
                poster_id,
                category_id: None,
                title: "Assemble wardrobe".to_string(),
                description: "Flat-pack wardrobe, two doors".to_string(),
                location: "Lagos".to_string(),
                budget: dec(budget),
            })
            .await
            .unwrap()
    }

    pub async fn bid(&self, task: &Task, tasker_id: Uuid, amount: &str) -> Bid {
        self.ledger
            .create_bid(NewBid {
                task_id: task.id,
                tasker_id,
                amount: dec(amount),
                message: "I can do this tomorrow".to_string(),
            })
            .await
            .unwrap()
            .unwrap()
    }

    /// Registers a tasker whose connected account is fully onboarded.
    pub async fn ready_tasker(&self) -> Uuid {
        let tasker_id = Uuid::new_v4();
        let account_id = format!("acct_{}", tasker_id.simple());
        self.ledger.put_account(tasker_id, &account_id, true).await;
        self.gateway
            .put_account(ConnectedAccount {
                id: account_id,
                charges_enabled: true,
                payouts_enabled: true,
                details_submitted: true,
            })
            .await;
        tasker_id
    }
}
