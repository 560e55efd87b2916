use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RefundPaymentDto {
    #[validate(length(min = 3, max = 500, message = "Reason must be between 3 and 500 characters"))]
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateAccountDto {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationQueryDto {
    pub limit: Option<i64>,
}
