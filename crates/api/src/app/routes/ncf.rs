use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_sequences))
        .route("/derive/:ncf", get(derive_type))
        .route("/:doc_type", get(get_sequence))
        .route("/:doc_type/allocate", post(allocate))
        .route("/:doc_type/active", put(set_active))
        .route("/:doc_type/expiry", put(set_expiry))
        .route("/:doc_type/max", put(set_max_number))
}

/// Issue the next number. Any error means the sale must not be recorded.
pub async fn allocate(
    Extension(services): Extension<Arc<AppServices>>,
    Path(doc_type): Path<String>,
    body: Option<Json<dto::AllocateRequest>>,
) -> axum::response::Response {
    let doc_type = match errors::parse_ncf_type(&doc_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();

    match services
        .facade()
        .issue_number_for_sale_to(doc_type, body.buyer_tax_id.as_deref())
        .await
    {
        Ok(ncf) => (StatusCode::CREATED, Json(dto::ncf_to_json(&ncf))).into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}

pub async fn list_sequences(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.facade().allocator().list().await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}

pub async fn get_sequence(
    Extension(services): Extension<Arc<AppServices>>,
    Path(doc_type): Path<String>,
) -> axum::response::Response {
    let doc_type = match errors::parse_ncf_type(&doc_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    match services.facade().allocator().sequence_info(doc_type).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}

pub async fn set_active(
    Extension(services): Extension<Arc<AppServices>>,
    Path(doc_type): Path<String>,
    Json(body): Json<dto::SetActiveRequest>,
) -> axum::response::Response {
    let doc_type = match errors::parse_ncf_type(&doc_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    match services.facade().allocator().set_active(doc_type, body.active).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}

pub async fn set_expiry(
    Extension(services): Extension<Arc<AppServices>>,
    Path(doc_type): Path<String>,
    Json(body): Json<dto::SetExpiryRequest>,
) -> axum::response::Response {
    let doc_type = match errors::parse_ncf_type(&doc_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    match services
        .facade()
        .allocator()
        .set_expiry(doc_type, body.expiry_date)
        .await
    {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}

pub async fn set_max_number(
    Extension(services): Extension<Arc<AppServices>>,
    Path(doc_type): Path<String>,
    Json(body): Json<dto::SetMaxNumberRequest>,
) -> axum::response::Response {
    let doc_type = match errors::parse_ncf_type(&doc_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    match services
        .facade()
        .allocator()
        .set_max_number(doc_type, body.max_number)
        .await
    {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}

pub async fn derive_type(
    Extension(services): Extension<Arc<AppServices>>,
    Path(ncf): Path<String>,
) -> axum::response::Response {
    match services.facade().allocator().derive_type(&ncf) {
        Ok(doc_type) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "doc_type": doc_type,
                "name": doc_type.name(),
            })),
        )
            .into_response(),
        Err(e) => errors::compliance_error_to_response(e),
    }
}
