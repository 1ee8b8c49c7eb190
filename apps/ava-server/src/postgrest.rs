//! Record store backed by a PostgREST endpoint (Supabase REST API).

use async_trait::async_trait;
use ava_core::{AuthContext, RecordQuery, RecordStore, StoreError, StoreRow};
use serde_json::Value;
use tracing::debug;

pub(crate) struct PostgrestStore {
    client: reqwest::Client,
    endpoint: String,
    anon_key: String,
}

impl PostgrestStore {
    pub(crate) fn new(
        client: reqwest::Client,
        base_url: &str,
        table: &str,
        anon_key: impl Into<String>,
    ) -> Self {
        let base = base_url.trim().trim_end_matches('/');
        Self {
            client,
            endpoint: format!("{base}/rest/v1/{table}"),
            anon_key: anon_key.into(),
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RecordStore for PostgrestStore {
    async fn fetch(
        &self,
        query: &RecordQuery,
        auth: Option<&AuthContext>,
    ) -> Result<Vec<StoreRow>, StoreError> {
        let params = query_params(query);
        let bearer = auth
            .map(|a| a.access_token.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.anon_key);
        debug!(
            target: "ava::store",
            endpoint = %self.endpoint,
            authenticated = auth.is_some(),
            "querying record store"
        );
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).chars().take(512).collect(),
            });
        }
        decode_rows(&bytes)
    }
}

fn decode_rows(bytes: &[u8]) -> Result<Vec<StoreRow>, StoreError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Decode(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()),
        other => Err(StoreError::Decode(format!(
            "expected an array of rows, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Query-string pairs for one lookup.
pub(crate) fn query_params(query: &RecordQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    match query {
        RecordQuery::EmailEquals(email) => {
            params.push(("email".into(), format!("eq.{email}")));
        }
        RecordQuery::EmailEqualsIgnoreCase(email) => {
            params.push(("email".into(), format!("ilike.{}", escape_like(email))));
        }
        RecordQuery::EmailContains(fragment) => {
            params.push(("email".into(), format!("ilike.*{}*", escape_like(fragment))));
        }
        RecordQuery::TextSearch { term, fields } => {
            let pattern = quote_or_value(&format!("*{}*", escape_like(term)));
            let filters: Vec<String> = fields
                .iter()
                .map(|field| format!("{field}.ilike.{pattern}"))
                .collect();
            params.push(("or".into(), format!("({})", filters.join(","))));
            params.push(("order".into(), "updated_at.desc.nullslast".into()));
        }
    }
    params
}

/// Escape LIKE metacharacters so user input only matches literally.
///
/// `*` is left alone: PostgREST rewrites it to `%` before the escape is
/// seen, so there is no way to match a literal `*`.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Double-quote a value inside an `or=(...)` list so commas and parentheses stay literal.
fn quote_or_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for ch in raw.chars() {
        if matches!(ch, '"' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
