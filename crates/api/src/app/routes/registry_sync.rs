use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/sync", get(poll_sync).post(start_sync).delete(cancel_sync))
}

/// 202 with the RUNNING status; 409 while another run holds the status.
pub async fn start_sync(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.facade().start_registry_sync().await {
        Ok(status) => (StatusCode::ACCEPTED, Json(dto::sync_status_to_json(&status))).into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}

pub async fn cancel_sync(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.facade().cancel_registry_sync().await {
        Ok(status) => (StatusCode::OK, Json(dto::sync_status_to_json(&status))).into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}

pub async fn poll_sync(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.facade().poll_registry_sync().await {
        Ok(status) => (StatusCode::OK, Json(dto::sync_status_to_json(&status))).into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}
