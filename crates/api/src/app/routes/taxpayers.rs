use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use fiscalpos_core::ComplianceError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(search_taxpayers))
        .route("/:id", get(get_taxpayer))
}

pub async fn get_taxpayer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match services.facade().lookup_taxpayer(&id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(dto::taxpayer_to_json(&record))).into_response(),
        Ok(None) => errors::compliance_error_to_response(ComplianceError::NotFound),
        Err(e) => errors::compliance_error_to_response(e),
    }
}

pub async fn search_taxpayers(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SearchTaxpayersQuery>,
) -> axum::response::Response {
    match services
        .facade()
        .search_taxpayers(&query.q, query.limit.unwrap_or(0))
        .await
    {
        Ok(records) => {
            let items = records.iter().map(dto::taxpayer_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::compliance_error_to_response(e),
    }
}
