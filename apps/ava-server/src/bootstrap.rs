use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use ava_core::{
    AdmissionController, AuthContext, Config, MemoryRecordStore, Orchestrator, RecordQuery,
    RecordStore, Resolver, ServerConfig, StoreError, StoreRow,
};
use axum::http::{header, HeaderValue, Method};
use tracing::{info, warn};
use utoipa::OpenApi as _;

use crate::openai::OpenAiCompletion;
use crate::postgrest::PostgrestStore;
use crate::tasks::{self, TaskManager};
use crate::{access_log, http_client, router, security, AppState};

pub(crate) struct BootstrapOutput {
    pub router: axum::Router<()>,
    pub addr: SocketAddr,
    pub background_tasks: TaskManager,
}

/// Store used when neither a fixture nor a remote URL is configured.
struct UnconfiguredStore;

#[async_trait]
impl RecordStore for UnconfiguredStore {
    async fn fetch(
        &self,
        _query: &RecordQuery,
        _auth: Option<&AuthContext>,
    ) -> Result<Vec<StoreRow>, StoreError> {
        Err(StoreError::NotConfigured)
    }
}

fn build_store(cfg: &Config, client: &reqwest::Client) -> anyhow::Result<Arc<dyn RecordStore>> {
    if let Some(path) = cfg.store.fixture.as_deref() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading store fixture {path}"))?;
        let rows: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing store fixture {path}"))?;
        let store = MemoryRecordStore::from_json(rows);
        info!(target: "ava::store", path, rows = store.len(), "serving records from fixture");
        return Ok(Arc::new(store));
    }
    match (cfg.store.url.as_deref(), cfg.store.anon_key.as_deref()) {
        (Some(url), Some(key)) => {
            let store = PostgrestStore::new(client.clone(), url, &cfg.store.table, key);
            info!(target: "ava::store", endpoint = store.endpoint(), "using PostgREST record store");
            Ok(Arc::new(store))
        }
        (Some(_), None) => {
            warn!(target: "ava::store", "store.url set without store.anon_key; lookups disabled");
            Ok(Arc::new(UnconfiguredStore))
        }
        _ => {
            warn!(target: "ava::store", "no record store configured; lookups disabled");
            Ok(Arc::new(UnconfiguredStore))
        }
    }
}

pub(crate) fn build(cfg: &Config) -> anyhow::Result<BootstrapOutput> {
    let addr: SocketAddr = format!("{}:{}", cfg.server.bind, cfg.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.server.bind, cfg.server.port))?;
    let client = http_client::client_with_timeout(Duration::from_secs(
        cfg.completion.timeout_secs.max(1),
    ))
    .context("building HTTP client")?;

    let store = build_store(cfg, &client)?;
    let resolver = Arc::new(Resolver::new(store, cfg.store.resolver_options()));

    let completion = OpenAiCompletion::new(client, &cfg.completion);
    if !completion.is_configured() {
        warn!(target: "ava::completion", "no completion API key configured; chat replies will fail");
    }
    let orchestrator = Arc::new(Orchestrator::new(
        resolver.clone(),
        Arc::new(completion),
        cfg.assistant.orchestrator_options(),
    ));

    let admission = Arc::new(AdmissionController::in_memory(cfg.rate_limit.policy()));
    let mut background_tasks = TaskManager::new();
    background_tasks.push(tasks::spawn_admission_sweeper(
        admission.clone(),
        cfg.rate_limit.sweep_interval(),
    ));

    let state = AppState::new(admission, orchestrator, resolver);
    let router = attach_global_layers(attach_http_layers(
        router::build_router().with_state(state),
        &cfg.server,
    )?);

    Ok(BootstrapOutput {
        router,
        addr,
        background_tasks,
    })
}

fn cors_layer(allow_origin: &str) -> anyhow::Result<tower_http::cors::CorsLayer> {
    use tower_http::cors::{AllowOrigin, CorsLayer};

    let origin = if allow_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(allow_origin.trim())
            .with_context(|| format!("invalid cors_allow_origin {allow_origin:?}"))?;
        AllowOrigin::exact(value)
    };
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

pub(crate) fn attach_http_layers(
    router: axum::Router<()>,
    server: &ServerConfig,
) -> anyhow::Result<axum::Router<()>> {
    use tower::limit::ConcurrencyLimitLayer;
    use tower_http::trace::TraceLayer;

    Ok(router
        .layer(cors_layer(&server.cors_allow_origin)?)
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(server.concurrency_limit.max(1))))
}

pub(crate) fn attach_global_layers(router: axum::Router<()>) -> axum::Router<()> {
    router
        .layer(axum::middleware::from_fn(access_log::access_log_mw))
        .layer(axum::middleware::from_fn(security::client_addr_mw))
}

pub(crate) fn ensure_openapi_export() -> Result<Option<String>, std::io::Error> {
    match std::env::var("OPENAPI_OUT") {
        Ok(path) if !path.trim().is_empty() => {
            export_openapi(&path)?;
            Ok(Some(path))
        }
        _ => Ok(None),
    }
}

fn export_openapi(path: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let yaml = crate::openapi::ApiDoc::openapi()
        .to_yaml()
        .map_err(std::io::Error::other)?;
    std::fs::write(path, yaml)
}
