use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{error, info};

mod access_log;
mod api;
mod app_state;
mod bootstrap;
mod config;
mod http_client;
mod openai;
mod openapi;
mod postgrest;
mod responses;
mod router;
mod security;
mod tasks;
#[cfg(test)]
mod test_support;

pub(crate) use app_state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match bootstrap::ensure_openapi_export() {
        Ok(Some(_)) => return Ok(()),
        Ok(None) => {}
        Err(err) => {
            eprintln!("error: failed to write generated OPENAPI_OUT: {err}");
            std::process::exit(2);
        }
    }

    ava_otel::init();
    let cfg = config::load().context("loading configuration")?;
    let bootstrap::BootstrapOutput {
        router,
        addr,
        background_tasks,
    } = bootstrap::build(&cfg)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "ava-server listening");

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }

    info!("shutting down background tasks");
    background_tasks
        .shutdown_with_grace(Duration::from_secs(5))
        .await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}

#[cfg(test)]
mod http_tests {
    use std::sync::Arc;

    use super::*;
    use crate::router::paths;
    use crate::test_support::{build_state, ScriptedCompletion};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn app(completion: Arc<ScriptedCompletion>, limit: u32) -> Router {
        bootstrap::attach_global_layers(router::build_router().with_state(build_state(completion, limit)))
    }

    fn post_json(path: &str, body: &str, client: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", client)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let resp = app.clone().oneshot(req).await.expect("response");
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, headers, body)
    }

    #[tokio::test]
    async fn chat_returns_reply_and_usage() {
        let completion = Arc::new(ScriptedCompletion::replying("Hi, I'm Ava!"));
        let app = app(completion.clone(), 20);
        let (status, _, body) = send(
            &app,
            post_json(paths::CHAT, r#"{"message":"hello"}"#, "203.0.113.1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "Hi, I'm Ava!");
        assert_eq!(body["usage"]["total_tokens"], 48);
        assert_eq!(completion.call_count(), 1);
    }

    #[tokio::test]
    async fn chat_uses_token_email_for_project_questions() {
        let completion = Arc::new(ScriptedCompletion::replying("Install is scheduled."));
        let app = app(completion.clone(), 20);
        let payload = URL_SAFE_NO_PAD.encode(json!({"email": "Sam@Example.com"}).to_string());
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig");
        let mut req = post_json(
            paths::CHAT,
            r#"{"message":"What is my project status?","conversationHistory":[{"role":"assistant","content":"Hello!"}]}"#,
            "203.0.113.2",
        );
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().expect("header"),
        );
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        let calls = completion.calls.lock().expect("calls");
        let sent = &calls[0];
        assert_eq!(sent.len(), 3);
        assert!(sent[0].content.contains("Current Milestone: Install Scheduled"));
        assert!(sent[0].content.contains("1 Main St, Provo, UT 84601"));
    }

    #[tokio::test]
    async fn chat_validates_input() {
        let completion = Arc::new(ScriptedCompletion::replying("unused"));
        let app = app(completion.clone(), 20);
        let (status, _, body) =
            send(&app, post_json(paths::CHAT, r#"{"conversationHistory":[]}"#, "198.51.100.1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Message is required"}));

        let (status, _, body) = send(&app, post_json(paths::CHAT, "{not json", "198.51.100.1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Invalid JSON body"}));
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_project_lookup_falls_back_to_message() {
        let completion = Arc::new(ScriptedCompletion::replying("Which email is on the account?"));
        let app = app(completion.clone(), 20);
        for body in [
            r#"{"message":"Where is my project?","projectLookup":{}}"#,
            r#"{"message":"Where is my project?","projectLookup":{"email":"  "}}"#,
        ] {
            let (status, _, reply) = send(&app, post_json(paths::CHAT, body, "198.51.100.4")).await;
            assert_eq!(status, StatusCode::OK, "{body}");
            assert_eq!(reply["reply"], "Which email is on the account?");
        }
        assert_eq!(completion.call_count(), 2);
        let calls = completion.calls.lock().expect("calls");
        assert!(calls[0][0].content.contains("ask them to provide their email address"));
    }

    #[tokio::test]
    async fn wrong_method_is_json_405() {
        let app = app(Arc::new(ScriptedCompletion::replying("unused")), 20);
        for path in [paths::CHAT, paths::PROJECT_LOOKUP] {
            let req = Request::builder()
                .method("GET")
                .uri(path)
                .body(Body::empty())
                .expect("request");
            let (status, _, body) = send(&app, req).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(body, json!({"error": "Method not allowed"}));
        }
    }

    #[tokio::test]
    async fn chat_is_rate_limited_per_client() {
        let app = app(Arc::new(ScriptedCompletion::replying("ok")), 2);
        for _ in 0..2 {
            let (status, _, _) =
                send(&app, post_json(paths::CHAT, r#"{"message":"hi"}"#, "192.0.2.7")).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, headers, body) =
            send(&app, post_json(paths::CHAT, r#"{"message":"hi"}"#, "192.0.2.7")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let retry = body["retryAfter"].as_u64().expect("retryAfter");
        assert!((1..=60).contains(&retry));
        assert_eq!(
            headers.get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some(retry.to_string().as_str())
        );

        let (status, _, _) =
            send(&app, post_json(paths::CHAT, r#"{"message":"hi"}"#, "192.0.2.8")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn completion_failure_is_generic_500() {
        let app = app(Arc::new(ScriptedCompletion::failing()), 20);
        let (status, _, body) =
            send(&app, post_json(paths::CHAT, r#"{"message":"hi"}"#, "192.0.2.9")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to get response from AI"}));
    }

    #[tokio::test]
    async fn project_lookup_returns_records_and_count() {
        let app = app(Arc::new(ScriptedCompletion::replying("unused")), 20);
        let (status, _, body) = send(
            &app,
            post_json(paths::PROJECT_LOOKUP, r#"{"email":"SAM@example.com"}"#, "192.0.2.10"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        let project = &body["projects"][0];
        assert_eq!(project["project_id"], "AV-7");
        assert_eq!(project["parsed_payload"]["city"], "Provo");

        let (status, _, body) = send(
            &app,
            post_json(paths::PROJECT_LOOKUP, r#"{"session_token":"","query":"AV-7"}"#, "192.0.2.10"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (status, _, body) =
            send(&app, post_json(paths::PROJECT_LOOKUP, "{}", "192.0.2.10")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"projects": [], "count": 0}));
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let app = app(Arc::new(ScriptedCompletion::replying("unused")), 20);
        let req = Request::builder()
            .uri(paths::HEALTHZ)
            .body(Body::empty())
            .expect("request");
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }
}
