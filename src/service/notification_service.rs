// service/notification_service.rs
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::{Ledger, NotificationExt},
    models::{notificationmodel::*, paymentmodel::Payment, taskmodel::*},
    service::error::ServiceError,
    utils::currency::format_amount,
};

/// Fire-and-forget delivery of user notifications.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), ServiceError>;
}

/// Sends a notification and swallows any failure after logging it.
pub async fn notify_best_effort(dispatcher: &dyn NotificationDispatcher, notification: Notification) {
    let receiver_id = notification.receiver_id;
    let kind = notification.kind;
    if let Err(e) = dispatcher.send(notification).await {
        tracing::warn!(
            "Failed to send {} notification to {}: {}",
            kind.to_str(),
            receiver_id,
            e
        );
    }
}

#[derive(Clone)]
pub struct NotificationService {
    ledger: Arc<dyn Ledger>,
}

impl NotificationService {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn get_user_notifications(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredNotification>, ServiceError> {
        Ok(self.ledger.get_user_notifications(user_id, limit.clamp(1, 100)).await?)
    }
}

#[async_trait]
impl NotificationDispatcher for NotificationService {
    async fn send(&self, notification: Notification) -> Result<(), ServiceError> {
        tracing::info!(
            "Notification {} for user {}: {}",
            notification.kind.to_str(),
            notification.receiver_id,
            notification.title
        );

        self.ledger.save_notification(&notification).await?;
        Ok(())
    }
}

pub fn bid_accepted(bid: &Bid, task: &Task) -> Notification {
    Notification {
        receiver_id: bid.tasker_id,
        kind: NotificationKind::BidAccepted,
        title: "Your bid was accepted".to_string(),
        text: format!("Your bid on \"{}\" was accepted. You can start working on it.", task.title),
        reference_id: Some(task.id),
    }
}

pub fn bid_rejected(bid: &Bid, task: &Task) -> Notification {
    Notification {
        receiver_id: bid.tasker_id,
        kind: NotificationKind::BidRejected,
        title: "Your bid was not selected".to_string(),
        text: format!("Another tasker was chosen for \"{}\".", task.title),
        reference_id: Some(task.id),
    }
}

pub fn task_submitted_for_review(task: &Task) -> Notification {
    Notification {
        receiver_id: task.poster_id,
        kind: NotificationKind::TaskSubmittedForReview,
        title: "Task ready for review".to_string(),
        text: format!("\"{}\" was marked as done and is waiting for your review.", task.title),
        reference_id: Some(task.id),
    }
}

pub fn task_disputed(task: &Task, receiver_id: Uuid) -> Notification {
    Notification {
        receiver_id,
        kind: NotificationKind::TaskDisputed,
        title: "A dispute was opened".to_string(),
        text: format!("A dispute was opened on \"{}\". Escrowed funds stay on hold.", task.title),
        reference_id: Some(task.id),
    }
}

pub fn payment_released(payment: &Payment) -> Notification {
    Notification {
        receiver_id: payment.tasker_id,
        kind: NotificationKind::PaymentReleased,
        title: "Payment released".to_string(),
        text: format!(
            "{} was released to you.",
            format_amount(&payment.tasker_amount, &payment.currency)
        ),
        reference_id: Some(payment.task_id),
    }
}

pub fn payment_refunded(payment: &Payment) -> Notification {
    Notification {
        receiver_id: payment.tasker_id,
        kind: NotificationKind::PaymentRefunded,
        title: "Payment refunded".to_string(),
        text: format!(
            "The escrowed payment of {} was refunded to the poster.",
            format_amount(&payment.amount, &payment.currency)
        ),
        reference_id: Some(payment.task_id),
    }
}

pub fn payment_failed(payment: &Payment) -> Notification {
    Notification {
        receiver_id: payment.poster_id,
        kind: NotificationKind::PaymentFailed,
        title: "Payment failed".to_string(),
        text: "The payment for your task could not be completed and the task was cancelled."
            .to_string(),
        reference_id: Some(payment.task_id),
    }
}
