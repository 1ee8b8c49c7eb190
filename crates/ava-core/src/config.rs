use std::path::Path;
use std::time::Duration;

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::admission::AdmissionPolicy;
use crate::orchestrator::OrchestratorOptions;
use crate::prompt::Persona;
use crate::resolver::ResolverOptions;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config failed validation: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Maximum in-flight HTTP requests.
    pub concurrency_limit: usize,
    /// Value for `Access-Control-Allow-Origin` on API routes.
    pub cors_allow_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
            concurrency_limit: 1024,
            cors_allow_origin: "*".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests admitted per client within one window.
    pub limit: u32,
    pub window_secs: u64,
    /// How often expired counters are reclaimed.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 20,
            window_secs: 60,
            sweep_interval_secs: 300,
        }
    }
}

impl RateLimitConfig {
    pub fn policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            limit: self.limit,
            window: Duration::from_secs(self.window_secs.max(1)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Base URL of the PostgREST endpoint (e.g. <https://project.supabase.co>).
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub table: String,
    /// Columns searched by free-text lookups.
    pub search_fields: Vec<String>,
    /// Enables the username-fragment stage of the email cascade.
    pub fragment_match: bool,
    /// JSON file with an array of rows to serve from memory instead of `url`.
    pub fixture: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let resolver = ResolverOptions::default();
        Self {
            url: None,
            anon_key: None,
            table: "podio_data".into(),
            search_fields: resolver.search_fields,
            fragment_match: resolver.fragment_match,
            fixture: None,
        }
    }
}

impl StoreConfig {
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            search_fields: self.search_fields.clone(),
            fragment_match: self.fragment_match,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "gpt-3.5-turbo".into(),
            max_tokens: 500,
            temperature: 0.7,
            timeout_secs: 20,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AssistantConfig {
    pub name: String,
    pub company: String,
    pub domain: String,
    pub history_limit: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let persona = Persona::default();
        Self {
            name: persona.name,
            company: persona.company,
            domain: persona.domain,
            history_limit: OrchestratorOptions::default().history_limit,
        }
    }
}

impl AssistantConfig {
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            persona: Persona {
                name: self.name.clone(),
                company: self.company.clone(),
                domain: self.domain.clone(),
            },
            history_limit: self.history_limit,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
}

static CONFIG_SCHEMA: Lazy<Option<Validator>> = Lazy::new(|| {
    let compiled = serde_json::to_value(schemars::schema_for!(Config))
        .map_err(|e| e.to_string())
        .and_then(|value| validator_for(&value).map_err(|e| e.to_string()));
    match compiled {
        Ok(validator) => Some(validator),
        Err(error) => {
            warn!(target: "ava::config", %error, "config schema unavailable; only type checks apply");
            None
        }
    }
});

/// JSON schema describing the configuration file.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).unwrap_or_default()
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let raw: toml::Value = toml::from_str(content)?;
    let json_value =
        serde_json::to_value(&raw).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .as_ref()
        .map(|validator| {
            validator
                .iter_errors(&json_value)
                .map(|e| e.to_string())
                .collect()
        })
        .unwrap_or_default();
    if !validation_errors.is_empty() {
        return Err(ConfigError::Invalid(validation_errors.join(", ")));
    }
    Ok(toml::from_str(content)?)
}
