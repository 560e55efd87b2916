use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::taskdtos::*,
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

pub fn tasks_handler() -> Router {
    Router::new()
        .route("/", post(create_task))
        .route("/:task_id", get(get_task))
        .route("/:task_id/bids", post(place_bid).get(list_task_bids))
        .route("/:task_id/review", put(submit_for_review))
        .route("/:task_id/dispute", put(open_dispute))
        .route("/:task_id/payment", get(get_task_payment))
}

pub fn bids_handler() -> Router {
    Router::new()
        .route("/:bid_id", put(update_bid).delete(withdraw_bid))
        .route("/:bid_id/accept", put(accept_bid))
}

pub async fn create_task(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateTaskDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let task = app_state.task_service.create_task(auth.user.id, body).await?;

    Ok(Json(ApiResponse::success("Task created successfully", task)))
}

pub async fn get_task(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let task = app_state.task_service.get_task(task_id).await?;

    Ok(Json(ApiResponse::success("Task retrieved successfully", task)))
}

pub async fn place_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
    Json(body): Json<PlaceBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let bid = app_state
        .bid_service
        .place_bid(task_id, auth.user.id, body)
        .await?;

    Ok(Json(ApiResponse::success("Bid placed successfully", bid)))
}

pub async fn list_task_bids(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let bids = app_state
        .bid_service
        .list_task_bids(task_id, &auth.user)
        .await?;

    Ok(Json(ApiResponse::success("Bids retrieved successfully", bids)))
}

pub async fn update_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
    Json(body): Json<UpdateBidDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let bid = app_state
        .bid_service
        .update_bid(bid_id, auth.user.id, body)
        .await?;

    Ok(Json(ApiResponse::success("Bid updated successfully", bid)))
}

pub async fn withdraw_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state.bid_service.withdraw_bid(bid_id, auth.user.id).await?;

    Ok(Json(ApiResponse::message("Bid withdrawn successfully")))
}

pub async fn accept_bid(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(bid_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let result = app_state.bid_service.accept_bid(bid_id, auth.user.id).await?;

    Ok(Json(ApiResponse::success(
        "Bid accepted, confirm the payment to fund escrow",
        AcceptBidResponseDto {
            bid: result.bid,
            task: result.task,
            payment: result.payment,
            client_secret: result.client_secret,
        },
    )))
}

pub async fn submit_for_review(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let task = app_state
        .task_service
        .submit_for_review(task_id, auth.user.id)
        .await?;

    Ok(Json(ApiResponse::success("Task submitted for review", task)))
}

pub async fn open_dispute(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let task = app_state.task_service.open_dispute(task_id, &auth.user).await?;

    Ok(Json(ApiResponse::success("Dispute opened", task)))
}

pub async fn get_task_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let payment = app_state
        .escrow_service
        .get_task_payment(task_id, &auth.user)
        .await?;

    Ok(Json(ApiResponse::success("Payment retrieved successfully", payment)))
}
