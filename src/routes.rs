use std::sync::Arc;

use axum::{middleware, routing::{get, post}, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        accounts::{accounts_handler, notifications_handler},
        payments::payments_handler,
        tasks::{bids_handler, tasks_handler},
        webhook::gateway_webhook,
    },
    middleware::auth,
    AppState,
};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_route = Router::new()
        .route("/healthchecker", get(health_check))
        .nest("/tasks", tasks_handler().layer(middleware::from_fn(auth)))
        .nest("/bids", bids_handler().layer(middleware::from_fn(auth)))
        .nest("/payments", payments_handler().layer(middleware::from_fn(auth)))
        .nest("/accounts", accounts_handler().layer(middleware::from_fn(auth)))
        .nest(
            "/notifications",
            notifications_handler().layer(middleware::from_fn(auth)),
        )
        // signed by the gateway, no user token
        .route("/webhooks/gateway", post(gateway_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new().nest("/api", api_route)
}
