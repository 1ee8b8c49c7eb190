use std::path::{Path, PathBuf};

use ava_core::{load_config, Config, ConfigError};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub(crate) enum StartupConfigError {
    #[error(transparent)]
    File(#[from] ConfigError),
    #[error("invalid {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Load the config file (`AVA_CONFIG`, else `configs/default.toml` when it
/// exists, else built-in defaults) and apply environment overrides.
pub(crate) fn load() -> Result<Config, StartupConfigError> {
    let mut cfg = match discovered_config_path() {
        Some((path, source)) => {
            let cfg = load_config(&path)?;
            info!(path = %path.display(), source, "loaded config");
            cfg
        }
        None => {
            info!("no config file found; using defaults");
            Config::default()
        }
    };
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

fn discovered_config_path() -> Option<(PathBuf, &'static str)> {
    if let Ok(explicit) = std::env::var("AVA_CONFIG") {
        if !explicit.trim().is_empty() {
            return Some((PathBuf::from(explicit), "env"));
        }
    }
    let default = Path::new("configs/default.toml");
    default
        .exists()
        .then(|| (default.to_path_buf(), "search"))
}

fn parse_env<T: std::str::FromStr>(
    var: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, StartupConfigError> {
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|_| StartupConfigError::InvalidEnv { var, value })
    })
    .transpose()
}

fn parse_flag(var: &'static str, raw: Option<String>) -> Result<Option<bool>, StartupConfigError> {
    match raw {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(StartupConfigError::InvalidEnv { var, value }),
        },
    }
}

/// First non-empty value among `keys`.
fn first_of<F>(get: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|k| get(k))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

pub(crate) fn apply_env_overrides<F>(cfg: &mut Config, get: F) -> Result<(), StartupConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = first_of(&get, &["AVA_BIND"]) {
        cfg.server.bind = bind;
    }
    if let Some(port) = parse_env("AVA_PORT", get("AVA_PORT"))? {
        cfg.server.port = port;
    }
    if let Some(limit) = parse_env::<usize>("AVA_HTTP_MAX_CONC", get("AVA_HTTP_MAX_CONC"))? {
        cfg.server.concurrency_limit = limit.max(1);
    }
    if let Some(limit) = parse_env("AVA_RATE_LIMIT", get("AVA_RATE_LIMIT"))? {
        cfg.rate_limit.limit = limit;
    }
    if let Some(secs) = parse_env("AVA_RATE_WINDOW_SECS", get("AVA_RATE_WINDOW_SECS"))? {
        cfg.rate_limit.window_secs = secs;
    }
    if let Some(url) = first_of(&get, &["AVA_STORE_URL", "SUPABASE_URL"]) {
        cfg.store.url = Some(url);
    }
    if let Some(key) = first_of(&get, &["AVA_STORE_KEY", "SUPABASE_ANON_KEY"]) {
        cfg.store.anon_key = Some(key);
    }
    if let Some(table) = first_of(&get, &["AVA_STORE_TABLE"]) {
        cfg.store.table = table;
    }
    if let Some(fixture) = first_of(&get, &["AVA_STORE_FIXTURE"]) {
        cfg.store.fixture = Some(fixture);
    }
    if let Some(flag) = parse_flag("AVA_FRAGMENT_MATCH", get("AVA_FRAGMENT_MATCH"))? {
        cfg.store.fragment_match = flag;
    }
    if let Some(key) = first_of(&get, &["AVA_OPENAI_API_KEY", "OPENAI_API_KEY"]) {
        cfg.completion.api_key = Some(key);
    }
    if let Some(base) = first_of(&get, &["AVA_OPENAI_BASE_URL"]) {
        cfg.completion.base_url = base;
    }
    if let Some(model) = first_of(&get, &["AVA_OPENAI_MODEL"]) {
        cfg.completion.model = model;
    }
    if let Some(secs) = parse_env::<u64>("AVA_HTTP_TIMEOUT_SECS", get("AVA_HTTP_TIMEOUT_SECS"))? {
        cfg.completion.timeout_secs = secs.max(1);
    }
    Ok(())
}
