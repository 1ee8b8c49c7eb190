use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

tokio::task_local! {
    static CLIENT_ADDR: Option<String>;
}

pub async fn client_addr_mw(req: Request<axum::body::Body>, next: Next) -> Response {
    let ip = extract_client_addr(&req);
    CLIENT_ADDR
        .scope(ip, async move { next.run(req).await })
        .await
}

pub fn client_addr() -> Option<String> {
    CLIENT_ADDR.try_with(|opt| opt.clone()).unwrap_or(None)
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the peer IP.
fn extract_client_addr<B>(req: &Request<B>) -> Option<String> {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| {
            raw.split(',').find_map(|part| {
                let trimmed = part.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
        });
    if forwarded.is_some() {
        return forwarded;
    }

    if let Some(real) = req
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        return Some(real);
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}
