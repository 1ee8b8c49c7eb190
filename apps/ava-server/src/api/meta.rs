use axum::response::Response;
use serde_json::json;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Meta",
    responses((status = 200, description = "Service healthy", body = crate::openapi::HealthOk))
)]
pub async fn healthz() -> Response {
    crate::responses::json_ok(json!({"ok": true}))
}
