// service/escrow_service.rs
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::{
    config::Config,
    db::{Ledger, LedgerExt, LedgerTx, PaymentExt, StoreError},
    models::{paymentmodel::*, taskmodel::*, usermodel::AuthUser},
    service::{
        error::ServiceError,
        notification_service::{self, notify_best_effort, NotificationDispatcher},
        payment_gateway::{CreateIntentParams, GatewayError, IntentStatus, PaymentGateway},
        webhook::GatewayEvent,
    },
    utils::currency::{split_fee, to_minor_units},
};

/// Task states that still have work attached to an escrowed payment.
const ACTIVE_TASK_STATES: [TaskStatus; 3] = [
    TaskStatus::InProgress,
    TaskStatus::UnderReview,
    TaskStatus::Disputed,
];

pub const CANCELED_INTENT_REASON: &str = "payment intent canceled";

#[derive(Clone)]
pub struct EscrowService {
    ledger: Arc<dyn Ledger>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationDispatcher>,
    fee_percentage: u32,
    currency: String,
    gateway_timeout: Duration,
}

impl EscrowService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: &Config,
    ) -> Self {
        Self {
            ledger,
            gateway,
            notifier,
            fee_percentage: config.platform_fee_percentage,
            currency: config.currency.clone(),
            gateway_timeout: config.gateway_timeout,
        }
    }

    /// Authorises the bid amount at the gateway and records a pending payment
    /// inside the caller's transaction. Returns the payment and the client
    /// secret the poster needs to confirm the intent.
    pub async fn create_held_payment(
        &self,
        tx: &mut dyn LedgerTx,
        task: &Task,
        bid: &Bid,
        account: &PaymentAccount,
    ) -> Result<(Payment, Option<String>), ServiceError> {
        let split = split_fee(&bid.amount, self.fee_percentage)
            .ok_or_else(|| ServiceError::Validation("Bid amount cannot be charged".to_string()))?;

        let params = CreateIntentParams {
            amount_minor: split.gross_minor,
            application_fee_minor: split.fee_minor,
            currency: self.currency.clone(),
            destination_account: account.gateway_account_id.clone(),
            metadata: vec![
                ("task_id".to_string(), task.id.to_string()),
                ("bid_id".to_string(), bid.id.to_string()),
                ("poster_id".to_string(), task.poster_id.to_string()),
                ("tasker_id".to_string(), bid.tasker_id.to_string()),
            ],
            idempotency_key: format!("accept-{}", bid.id),
        };

        let intent = tokio::time::timeout(self.gateway_timeout, self.gateway.create_intent(params))
            .await
            .map_err(|_| GatewayError::timeout(self.gateway_timeout))??;

        let payment = tx
            .insert_payment(NewPayment {
                task_id: task.id,
                bid_id: bid.id,
                poster_id: task.poster_id,
                tasker_id: bid.tasker_id,
                amount: split.gross(),
                platform_fee: split.platform_fee(),
                tasker_amount: split.tasker_amount(),
                currency: self.currency.clone(),
                external_intent_id: intent.id.clone(),
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => ServiceError::DuplicatePayment(bid.id),
                other => other.into(),
            })?;

        tracing::info!(
            "Created escrow payment {} for bid {} (intent {}, fee {})",
            payment.id,
            bid.id,
            intent.id,
            payment.platform_fee
        );

        Ok((payment, intent.client_secret))
    }

    /// pending -> held. Anything already past pending is left alone.
    pub async fn mark_held(&self, intent_id: &str) -> Result<Option<Payment>, ServiceError> {
        let Some(payment) = self.ledger.get_payment_by_intent(intent_id).await? else {
            tracing::warn!("Confirmation for unknown payment intent {}", intent_id);
            return Ok(None);
        };

        if payment.status != PaymentStatus::Pending {
            tracing::debug!(
                "Payment {} already {}, ignoring confirmation",
                payment.id,
                payment.status.to_str()
            );
            return Ok(Some(payment));
        }

        let mut tx = self.ledger.begin_ledger_tx().await?;
        let held = tx
            .transition_payment(
                payment.id,
                &[PaymentStatus::Pending],
                PaymentStatus::Held,
                PaymentUpdate::default(),
            )
            .await?;
        tx.commit().await?;

        match held {
            Some(held) => {
                tracing::info!("Payment {} is now held in escrow", held.id);
                Ok(Some(held))
            }
            None => Ok(self.ledger.get_payment(payment.id).await?),
        }
    }

    pub async fn release(&self, payment_id: Uuid, caller: &AuthUser) -> Result<Payment, ServiceError> {
        let payment = self.settleable_by(payment_id, caller).await?;

        let mut tx = self.ledger.begin_ledger_tx().await?;
        let payment = self
            .claim(tx.as_mut(), &payment, caller, "released", |status| status == PaymentStatus::Held)
            .await?;

        let intent = self.gateway.retrieve_intent(&payment.external_intent_id).await?;
        let transfer_id = match intent.status {
            IntentStatus::RequiresCapture => {
                match self.gateway.capture_intent(&intent.id).await {
                    Ok(captured) => captured.transfer_id,
                    Err(e) if e.is_already_captured() => {
                        tracing::info!("Intent {} was already captured", intent.id);
                        None
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            IntentStatus::Succeeded => intent.transfer_id,
            other => {
                return Err(ServiceError::UnexpectedIntentState(
                    intent.id,
                    format!("{:?}", other),
                ))
            }
        };

        let released = tx
            .transition_payment(
                payment_id,
                &[PaymentStatus::Held],
                PaymentStatus::Released,
                PaymentUpdate {
                    external_transfer_id: transfer_id,
                    ..Default::default()
                },
            )
            .await?
            .ok_or(ServiceError::InvalidPaymentState(payment_id, payment.status, "released"))?;

        if tx
            .transition_bid(payment.bid_id, BidStatus::Accepted, BidStatus::Completed)
            .await?
            .is_none()
        {
            tracing::warn!("Bid {} was not accepted when its payment was released", payment.bid_id);
        }
        if tx
            .transition_task(payment.task_id, &ACTIVE_TASK_STATES, TaskStatus::Completed)
            .await?
            .is_none()
        {
            tracing::warn!("Task {} was not active when its payment was released", payment.task_id);
        }
        tx.commit().await?;

        tracing::info!("Released payment {} by {}", payment_id, caller.id);
        notify_best_effort(self.notifier.as_ref(), notification_service::payment_released(&released)).await;

        Ok(released)
    }

    pub async fn refund(
        &self,
        payment_id: Uuid,
        reason: String,
        caller: &AuthUser,
    ) -> Result<Payment, ServiceError> {
        let payment = self.settleable_by(payment_id, caller).await?;

        let mut tx = self.ledger.begin_ledger_tx().await?;
        let payment = self
            .claim(tx.as_mut(), &payment, caller, "refunded", |status| status.is_outstanding())
            .await?;

        let amount_minor = to_minor_units(&payment.amount)
            .ok_or_else(|| ServiceError::Other(format!("Payment {} has an invalid amount", payment_id)))?;
        let refund = self
            .gateway
            .create_refund(&payment.external_intent_id, amount_minor, &reason)
            .await?;
        tracing::info!("Gateway refund {} issued for payment {}", refund.id, payment_id);

        let refunded = self
            .abandon_in(tx.as_mut(), &payment, PaymentStatus::Refunded, Some(reason))
            .await?
            .ok_or(ServiceError::InvalidPaymentState(payment_id, payment.status, "refunded"))?;
        tx.commit().await?;

        notify_best_effort(self.notifier.as_ref(), notification_service::payment_refunded(&refunded)).await;
        Ok(refunded)
    }

    pub async fn handle_gateway_event(&self, event: GatewayEvent) -> Result<(), ServiceError> {
        match event {
            GatewayEvent::PaymentConfirmed { intent_id } => {
                self.mark_held(&intent_id).await?;
            }
            GatewayEvent::PaymentFailed { intent_id, reason } => {
                let Some(payment) = self.outstanding_by_intent(&intent_id).await? else {
                    return Ok(());
                };
                tracing::warn!(
                    "Payment {} failed at the gateway: {}",
                    payment.id,
                    reason.as_deref().unwrap_or("no reason given")
                );
                if let Some(failed) = self.abandon(&payment, PaymentStatus::Failed, None).await? {
                    notify_best_effort(self.notifier.as_ref(), notification_service::payment_failed(&failed))
                        .await;
                }
            }
            GatewayEvent::PaymentCanceled { intent_id } => {
                let Some(payment) = self.outstanding_by_intent(&intent_id).await? else {
                    return Ok(());
                };
                let reason = Some(CANCELED_INTENT_REASON.to_string());
                if let Some(refunded) = self.abandon(&payment, PaymentStatus::Refunded, reason).await? {
                    notify_best_effort(
                        self.notifier.as_ref(),
                        notification_service::payment_refunded(&refunded),
                    )
                    .await;
                }
            }
            GatewayEvent::AccountUpdated {
                account_id,
                capabilities,
            } => match self
                .ledger
                .update_account_capabilities(&account_id, capabilities)
                .await?
            {
                Some(account) => tracing::info!(
                    "Synced capabilities of account {} (ready: {})",
                    account.gateway_account_id,
                    account.is_payment_ready()
                ),
                None => tracing::warn!("Update for unknown connected account {}", account_id),
            },
            GatewayEvent::Unhandled { kind } => {
                tracing::info!("Ignoring gateway event of type {}", kind);
            }
        }

        Ok(())
    }

    pub async fn get_payment(&self, payment_id: Uuid, caller: &AuthUser) -> Result<Payment, ServiceError> {
        let payment = self
            .ledger
            .get_payment(payment_id)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))?;

        if !can_view(&payment, caller) {
            return Err(ServiceError::UnauthorizedPaymentAccess(caller.id, payment_id));
        }
        Ok(payment)
    }

    pub async fn get_task_payment(&self, task_id: Uuid, caller: &AuthUser) -> Result<Payment, ServiceError> {
        let payment = self
            .ledger
            .get_payment_by_task(task_id)
            .await?
            .ok_or(ServiceError::TaskPaymentNotFound(task_id))?;

        if !can_view(&payment, caller) {
            return Err(ServiceError::UnauthorizedTaskAccess(caller.id, task_id));
        }
        Ok(payment)
    }

    async fn settleable_by(&self, payment_id: Uuid, caller: &AuthUser) -> Result<Payment, ServiceError> {
        let payment = self
            .ledger
            .get_payment(payment_id)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))?;

        if payment.poster_id != caller.id && !caller.is_admin() {
            return Err(ServiceError::UnauthorizedPaymentAccess(caller.id, payment_id));
        }
        Ok(payment)
    }

    /// Locks the task and then the payment (the order acceptance uses) and
    /// checks both against the locked rows. The locks are held until the
    /// caller commits, so gateway calls for one payment never overlap.
    async fn claim(
        &self,
        tx: &mut dyn LedgerTx,
        payment: &Payment,
        caller: &AuthUser,
        action: &'static str,
        allowed: fn(PaymentStatus) -> bool,
    ) -> Result<Payment, ServiceError> {
        let task = tx
            .lock_task(payment.task_id)
            .await?
            .ok_or(ServiceError::TaskNotFound(payment.task_id))?;
        let locked = tx
            .lock_payment(payment.id)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment.id))?;

        if !allowed(locked.status) {
            return Err(ServiceError::InvalidPaymentState(locked.id, locked.status, action));
        }
        // Disputed tasks are settled by an admin.
        if task.status == TaskStatus::Disputed && !caller.is_admin() {
            return Err(ServiceError::InvalidTaskStatus(task.id, task.status));
        }
        Ok(locked)
    }

    async fn outstanding_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, ServiceError> {
        match self.ledger.get_payment_by_intent(intent_id).await? {
            None => {
                tracing::warn!("Gateway event for unknown payment intent {}", intent_id);
                Ok(None)
            }
            Some(payment) if !payment.status.is_outstanding() => {
                tracing::debug!(
                    "Payment {} already {}, ignoring event",
                    payment.id,
                    payment.status.to_str()
                );
                Ok(None)
            }
            Some(payment) => Ok(Some(payment)),
        }
    }

    /// Moves an outstanding payment to a terminal non-release state and
    /// cancels the bid and task it funded. `None` if another request settled
    /// the payment first.
    async fn abandon(
        &self,
        payment: &Payment,
        to: PaymentStatus,
        refund_reason: Option<String>,
    ) -> Result<Option<Payment>, ServiceError> {
        let mut tx = self.ledger.begin_ledger_tx().await?;
        let Some(updated) = self.abandon_in(tx.as_mut(), payment, to, refund_reason).await? else {
            return Ok(None);
        };
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn abandon_in(
        &self,
        tx: &mut dyn LedgerTx,
        payment: &Payment,
        to: PaymentStatus,
        refund_reason: Option<String>,
    ) -> Result<Option<Payment>, ServiceError> {
        let Some(updated) = tx
            .transition_payment(
                payment.id,
                &PaymentStatus::OUTSTANDING,
                to,
                PaymentUpdate {
                    refund_reason,
                    ..Default::default()
                },
            )
            .await?
        else {
            return Ok(None);
        };

        if tx
            .transition_bid(payment.bid_id, BidStatus::Accepted, BidStatus::Cancelled)
            .await?
            .is_none()
        {
            tracing::warn!("Bid {} was not accepted when its payment was {}", payment.bid_id, to.to_str());
        }
        if tx
            .transition_task(payment.task_id, &ACTIVE_TASK_STATES, TaskStatus::Cancelled)
            .await?
            .is_none()
        {
            tracing::warn!("Task {} was not active when its payment was {}", payment.task_id, to.to_str());
        }

        tracing::info!("Payment {} moved to {}", updated.id, to.to_str());
        Ok(Some(updated))
    }
}

fn can_view(payment: &Payment, caller: &AuthUser) -> bool {
    caller.is_admin() || caller.id == payment.poster_id || caller.id == payment.tasker_id
}
