use num_traits::Zero;
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{paymentmodel::Payment, taskmodel::*};

fn positive_amount(amount: &BigDecimal) -> Result<(), ValidationError> {
    if amount <= &BigDecimal::zero() {
        let mut err = ValidationError::new("positive_amount");
        err.message = Some("Amount must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTaskDto {
    #[validate(length(min = 3, max = 120, message = "Title must be between 3 and 120 characters"))]
    pub title: String,

    #[validate(length(min = 10, max = 2000, message = "Description must be between 10 and 2000 characters"))]
    pub description: String,

    #[validate(length(min = 1, message = "Location is required"))]
    pub location: String,

    #[validate(custom = "positive_amount")]
    pub budget: BigDecimal,

    pub category_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PlaceBidDto {
    #[validate(custom = "positive_amount")]
    pub amount: BigDecimal,

    #[validate(length(max = 1000, message = "Message must be at most 1000 characters"))]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateBidDto {
    #[validate(custom = "positive_amount")]
    pub amount: Option<BigDecimal>,

    #[validate(length(max = 1000, message = "Message must be at most 1000 characters"))]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptBidResponseDto {
    pub bid: Bid,
    pub task: Task,
    pub payment: Payment,
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: None,
        }
    }
}
