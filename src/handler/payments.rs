use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{paymentdtos::RefundPaymentDto, taskdtos::ApiResponse},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn payments_handler() -> Router {
    Router::new()
        .route("/:payment_id", get(get_payment))
        .route("/:payment_id/release", put(release_payment))
        .route("/:payment_id/refund", put(refund_payment))
}

pub async fn get_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let payment = app_state
        .escrow_service
        .get_payment(payment_id, &auth.user)
        .await?;

    Ok(Json(ApiResponse::success("Payment retrieved successfully", payment)))
}

pub async fn release_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let payment = app_state.escrow_service.release(payment_id, &auth.user).await?;

    Ok(Json(ApiResponse::success("Payment released to tasker", payment)))
}

pub async fn refund_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<RefundPaymentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let payment = app_state
        .escrow_service
        .refund(payment_id, body.reason, &auth.user)
        .await?;

    Ok(Json(ApiResponse::success("Payment refunded to poster", payment)))
}
