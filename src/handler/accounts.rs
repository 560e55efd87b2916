use std::sync::Arc;

use axum::{
    extract::Query,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::{
        paymentdtos::{CreateAccountDto, NotificationQueryDto},
        taskdtos::ApiResponse,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn accounts_handler() -> Router {
    Router::new()
        .route("/", post(create_account).delete(delete_account))
        .route("/me", get(get_my_account))
        .route("/onboarding-link", post(create_onboarding_link))
        .route("/refresh", put(refresh_account))
}

pub fn notifications_handler() -> Router {
    Router::new().route("/", get(get_notifications))
}

pub async fn create_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateAccountDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let account = app_state
        .account_service
        .create_account(auth.user.id, &body.email)
        .await?;

    Ok(Json(ApiResponse::success("Payment account ready for onboarding", account)))
}

pub async fn get_my_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let account = app_state.account_service.get_account(auth.user.id).await?;

    Ok(Json(ApiResponse::success("Payment account retrieved successfully", account)))
}

pub async fn create_onboarding_link(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let link = app_state.account_service.onboarding_link(auth.user.id).await?;

    Ok(Json(ApiResponse::success("Onboarding link created", link)))
}

pub async fn refresh_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let account = app_state.account_service.refresh_account(auth.user.id).await?;

    Ok(Json(ApiResponse::success("Payment account refreshed", account)))
}

pub async fn delete_account(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.account_service.delete_account(auth.user.id).await?;

    Ok(Json(ApiResponse::message("Payment account deleted")))
}

pub async fn get_notifications(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(query): Query<NotificationQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let notifications = app_state
        .notification_service
        .get_user_notifications(auth.user.id, query.limit.unwrap_or(20))
        .await?;

    Ok(Json(ApiResponse::success("Notifications retrieved successfully", notifications)))
}
