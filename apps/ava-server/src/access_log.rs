use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::MatchedPath;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use once_cell::sync::Lazy;
use sha2::Digest as _;

#[derive(Clone, Debug, Default)]
struct Cfg {
    enabled: bool,
    sample_n: u64,
    ua: bool,
    ua_hash: bool,
}

impl Cfg {
    fn from_env() -> Self {
        let flag = |key: &str| std::env::var(key).ok().as_deref() == Some("1");
        Self {
            enabled: flag("AVA_ACCESS_LOG"),
            sample_n: std::env::var("AVA_ACCESS_SAMPLE_N")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1)
                .max(1),
            ua: flag("AVA_ACCESS_UA"),
            ua_hash: flag("AVA_ACCESS_UA_HASH"),
        }
    }
}

static CFG: Lazy<Cfg> = Lazy::new(Cfg::from_env);

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Only the hash is kept when both options are on.
fn user_agent_field(cfg: &Cfg, headers: &HeaderMap) -> Option<(&'static str, String)> {
    if !(cfg.ua || cfg.ua_hash) {
        return None;
    }
    let ua = headers.get(header::USER_AGENT)?.to_str().ok()?;
    if cfg.ua_hash {
        let digest = sha2::Sha256::digest(ua.as_bytes());
        Some(("ua_hash", hex::encode(digest)))
    } else {
        Some(("ua", ua.to_string()))
    }
}

fn sampled(cfg: &Cfg, n: u64) -> bool {
    cfg.sample_n <= 1 || n % cfg.sample_n == 0
}

pub async fn access_log_mw(req: Request<axum::body::Body>, next: Next) -> Response {
    let cfg = &*CFG;
    if !cfg.enabled {
        return next.run(req).await;
    }
    let started = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let ua = user_agent_field(cfg, req.headers());
    let remote = crate::security::client_addr();
    let res = next.run(req).await;
    let n = COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    if !sampled(cfg, n) {
        return res;
    }
    let (ua_key, ua_value) = ua.unwrap_or(("ua", String::new()));
    tracing::info!(
        target: ava_otel::ACCESS_TARGET,
        method = %method,
        path = %path,
        status = res.status().as_u16(),
        dur_ms = started.elapsed().as_millis() as u64,
        remote = remote.as_deref().unwrap_or("-"),
        ua_kind = ua_key,
        ua = %ua_value,
        "request"
    );
    res
}
