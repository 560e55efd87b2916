use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Held,
    Released,
    Refunded,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn to_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Held => "held",
            PaymentStatus::Released => "released",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Funds are reserved at the gateway but not yet settled either way.
    pub const OUTSTANDING: [PaymentStatus; 2] = [PaymentStatus::Pending, PaymentStatus::Held];

    pub fn is_outstanding(&self) -> bool {
        Self::OUTSTANDING.contains(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub bid_id: Uuid,
    pub poster_id: Uuid,
    pub tasker_id: Uuid,
    pub amount: BigDecimal,
    pub platform_fee: BigDecimal,
    pub tasker_amount: BigDecimal,
    pub currency: String,
    pub external_intent_id: String,
    pub external_transfer_id: Option<String>,
    pub status: PaymentStatus,
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub task_id: Uuid,
    pub bid_id: Uuid,
    pub poster_id: Uuid,
    pub tasker_id: Uuid,
    pub amount: BigDecimal,
    pub platform_fee: BigDecimal,
    pub tasker_amount: BigDecimal,
    pub currency: String,
    pub external_intent_id: String,
}

/// Extra columns written alongside a payment status change.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub refund_reason: Option<String>,
    pub external_transfer_id: Option<String>,
}

/// A tasker's connected account at the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct PaymentAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway_account_id: String,
    pub onboarding_completed: bool,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentAccount {
    pub fn is_payment_ready(&self) -> bool {
        self.onboarding_completed && self.charges_enabled && self.payouts_enabled
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCapabilities {
    pub onboarding_completed: bool,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
}
