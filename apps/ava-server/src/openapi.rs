use utoipa::{OpenApi, ToSchema};

#[allow(dead_code)]
#[derive(ToSchema)]
pub struct HealthOk {
    pub ok: bool,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::chat::chat,
        crate::api::projects::project_lookup,
        crate::api::meta::healthz,
    ),
    components(schemas(
        HealthOk,
        crate::api::chat::ChatRequest,
        crate::api::chat::ChatResponse,
        crate::api::chat::HistoryEntry,
        crate::api::chat::ProjectLookupReq,
        ava_core::LookupRequest,
        crate::api::projects::ProjectLookupResponse,
    )),
    tags(
        (name = "Chat", description = "Assistant conversation"),
        (name = "Projects", description = "Customer project records"),
        (name = "Meta", description = "Service health")
    )
)]
pub struct ApiDoc;
