use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ava_core::{mask_email, LookupRequest, ProjectRecord};
use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::{responses, AppState};

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ProjectLookupResponse {
    #[schema(value_type = Vec<Object>)]
    pub projects: Vec<ProjectRecord>,
    pub count: usize,
}

/// Look up project records by email, session token or free text.
#[utoipa::path(
    post,
    path = "/api/project-lookup",
    tag = "Projects",
    request_body = LookupRequest,
    responses(
        (status = 200, description = "Matching records", body = ProjectLookupResponse),
        (status = 400, description = "Malformed body"),
        (status = 405, description = "Method not allowed")
    )
)]
pub async fn project_lookup(
    State(state): State<AppState>,
    payload: Result<Json<LookupRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            debug!(target: "ava::resolver", error = %rejection, "rejecting lookup body");
            return responses::bad_request("Invalid JSON body");
        }
    };
    let projects = state.resolver().lookup(&request).await;
    info!(
        target: "ava::resolver",
        email = %request.email.as_deref().map(mask_email).unwrap_or_default(),
        has_token = request.session_token.is_some(),
        count = projects.len(),
        "project lookup served"
    );
    let count = projects.len();
    Json(ProjectLookupResponse { projects, count }).into_response()
}
