use axum::routing::{get, post};
use axum::Router;

use crate::{api, responses, AppState};

pub(crate) mod paths {
    pub const CHAT: &str = "/api/chat";
    pub const PROJECT_LOOKUP: &str = "/api/project-lookup";
    pub const HEALTHZ: &str = "/healthz";
}

async fn method_not_allowed() -> axum::response::Response {
    responses::method_not_allowed()
}

/// Routes with JSON 405 bodies for unsupported methods.
pub(crate) fn build_router() -> Router<AppState> {
    Router::new()
        .route(
            paths::CHAT,
            post(api::chat::chat).fallback(method_not_allowed),
        )
        .route(
            paths::PROJECT_LOOKUP,
            post(api::projects::project_lookup).fallback(method_not_allowed),
        )
        .route(paths::HEALTHZ, get(api::meta::healthz))
}
