use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use fiscalpos_core::ComplianceError;
use fiscalpos_fiscal::NcfType;

pub fn compliance_error_to_response(err: ComplianceError) -> axum::response::Response {
    let status = match &err {
        ComplianceError::Validation(_) | ComplianceError::MalformedNumber(_) => StatusCode::BAD_REQUEST,
        ComplianceError::NotFound => StatusCode::NOT_FOUND,
        ComplianceError::AlreadyRunning { .. } => StatusCode::CONFLICT,
        ComplianceError::Exhausted { .. }
        | ComplianceError::InactiveType { .. }
        | ComplianceError::Expired { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ComplianceError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status == StatusCode::SERVICE_UNAVAILABLE {
        tracing::error!(error = %err, "storage unavailable");
    }
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_ncf_type(s: &str) -> Result<NcfType, axum::response::Response> {
    s.parse::<NcfType>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_ncf_type",
            "type must be one of: B01, B02, B14, B15, B16",
        )
    })
}
