use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    UnderReview,
    Completed,
    Cancelled,
    Disputed,
}

impl TaskStatus {
    pub fn to_str(&self) -> &str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::UnderReview => "under_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Disputed => "disputed",
        }
    }

    /// States from which a task may be completed or cancelled by its poster.
    pub const SETTLEABLE: [TaskStatus; 2] = [TaskStatus::InProgress, TaskStatus::UnderReview];

    pub fn is_settleable(&self) -> bool {
        Self::SETTLEABLE.contains(self)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "bid_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    // markers set on an accepted bid once its payment settles
    Completed,
    Cancelled,
}

impl BidStatus {
    pub fn to_str(&self) -> &str {
        match self {
            BidStatus::Pending => "pending",
            BidStatus::Accepted => "accepted",
            BidStatus::Rejected => "rejected",
            BidStatus::Completed => "completed",
            BidStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub poster_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub location: String,
    pub budget: BigDecimal,
    pub assigned_tasker_id: Option<Uuid>,
    pub payment_ref: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct Bid {
    pub id: Uuid,
    pub task_id: Uuid,
    pub tasker_id: Uuid,
    pub amount: BigDecimal,
    pub message: String,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub poster_id: Uuid,
    pub category_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub location: String,
    pub budget: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct NewBid {
    pub task_id: Uuid,
    pub tasker_id: Uuid,
    pub amount: BigDecimal,
    pub message: String,
}
