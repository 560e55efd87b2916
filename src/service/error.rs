use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    db::StoreError,
    error::HttpError,
    models::{paymentmodel::PaymentStatus, taskmodel::*},
    service::payment_gateway::{GatewayError, GatewayErrorKind},
};

/// Coarse classification every service error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    BadRequest,
    FailedPrecondition,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Task {0} not found")]
    TaskNotFound(Uuid),

    #[error("Bid {0} not found")]
    BidNotFound(Uuid),

    #[error("Payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error("No payment found for task {0}")]
    TaskPaymentNotFound(Uuid),

    #[error("No payment account found for user {0}")]
    PaymentAccountNotFound(Uuid),

    #[error("User {0} is not authorized to perform this action on task {1}")]
    UnauthorizedTaskAccess(Uuid, Uuid),

    #[error("User {0} is not authorized to perform this action on bid {1}")]
    UnauthorizedBidAccess(Uuid, Uuid),

    #[error("User {0} is not authorized to perform this action on payment {1}")]
    UnauthorizedPaymentAccess(Uuid, Uuid),

    #[error("Bid {0} has already been processed")]
    BidAlreadyProcessed(Uuid),

    #[error("Bid {0} was processed by another request")]
    BidProcessedConcurrently(Uuid),

    #[error("Task {0} is not open for bids")]
    TaskNotOpen(Uuid),

    #[error("Task {0} is in status {1:?} and cannot be changed this way")]
    InvalidTaskStatus(Uuid, TaskStatus),

    #[error("You have already placed a bid on task {0}")]
    DuplicateBid(Uuid),

    #[error("A payment already exists for bid {0}")]
    DuplicatePayment(Uuid),

    #[error("Tasker {0} has not completed payment account onboarding")]
    TaskerAccountNotReady(Uuid),

    #[error("Payment {0} is {1:?} and cannot be {2}")]
    InvalidPaymentState(Uuid, PaymentStatus, &'static str),

    #[error("Payment intent {0} is in an unexpected state: {1}")]
    UnexpectedIntentState(String, String),

    #[error("Payment account for user {0} still has outstanding escrow payments")]
    AccountHasOutstandingPayments(Uuid),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::TaskNotFound(_)
            | ServiceError::BidNotFound(_)
            | ServiceError::PaymentNotFound(_)
            | ServiceError::TaskPaymentNotFound(_)
            | ServiceError::PaymentAccountNotFound(_) => ErrorKind::NotFound,

            ServiceError::UnauthorizedTaskAccess(_, _)
            | ServiceError::UnauthorizedBidAccess(_, _)
            | ServiceError::UnauthorizedPaymentAccess(_, _) => ErrorKind::Forbidden,

            ServiceError::BidAlreadyProcessed(_)
            | ServiceError::BidProcessedConcurrently(_)
            | ServiceError::TaskNotOpen(_)
            | ServiceError::InvalidTaskStatus(_, _)
            | ServiceError::DuplicateBid(_)
            | ServiceError::DuplicatePayment(_)
            | ServiceError::AccountHasOutstandingPayments(_) => ErrorKind::Conflict,

            ServiceError::InvalidPaymentState(_, _, _)
            | ServiceError::UnexpectedIntentState(_, _)
            | ServiceError::Validation(_) => ErrorKind::BadRequest,

            ServiceError::TaskerAccountNotReady(_) => ErrorKind::FailedPrecondition,

            ServiceError::Gateway(err) => match err.kind {
                GatewayErrorKind::Card | GatewayErrorKind::InvalidRequest => ErrorKind::BadRequest,
                GatewayErrorKind::RateLimit | GatewayErrorKind::Api => ErrorKind::FailedPrecondition,
                GatewayErrorKind::Connection
                | GatewayErrorKind::Authentication
                | GatewayErrorKind::Timeout => ErrorKind::Internal,
            },

            // a unique index firing means another request got there first
            ServiceError::Store(StoreError::UniqueViolation(_)) => ErrorKind::Conflict,
            ServiceError::Store(_) | ServiceError::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to posters and taskers. Gateway and storage
    /// details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Gateway(err) => match err.kind {
                GatewayErrorKind::Card => "The payment method was declined".to_string(),
                GatewayErrorKind::InvalidRequest => {
                    "The payment provider rejected the request".to_string()
                }
                GatewayErrorKind::RateLimit | GatewayErrorKind::Api => {
                    "The payment provider is temporarily unavailable, please retry".to_string()
                }
                _ => "Payment processing failed, please retry later".to_string(),
            },
            ServiceError::Store(StoreError::UniqueViolation(_)) => {
                "The request conflicts with a concurrent change, please retry".to_string()
            }
            ServiceError::Store(_) | ServiceError::Other(_) => {
                "Something went wrong, please try again later".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        if error.kind() == ErrorKind::Internal {
            tracing::error!("Internal service error: {}", error);
        }
        HttpError::new(error.public_message(), error.status_code())
    }
}
