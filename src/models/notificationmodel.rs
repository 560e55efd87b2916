use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BidAccepted,
    BidRejected,
    TaskSubmittedForReview,
    TaskDisputed,
    PaymentReleased,
    PaymentRefunded,
    PaymentFailed,
}

impl NotificationKind {
    pub fn to_str(&self) -> &str {
        match self {
            NotificationKind::BidAccepted => "bid_accepted",
            NotificationKind::BidRejected => "bid_rejected",
            NotificationKind::TaskSubmittedForReview => "task_submitted_for_review",
            NotificationKind::TaskDisputed => "task_disputed",
            NotificationKind::PaymentReleased => "payment_released",
            NotificationKind::PaymentRefunded => "payment_refunded",
            NotificationKind::PaymentFailed => "payment_failed",
        }
    }
}

/// Outgoing notification handed to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub receiver_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub text: String,
    pub reference_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredNotification {
    pub id: Uuid,
    pub receiver_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub text: String,
    pub reference_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
