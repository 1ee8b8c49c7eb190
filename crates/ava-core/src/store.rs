//! Record store seam and an in-process implementation.

use std::cmp::Reverse;

use async_trait::async_trait;
use serde_json::Value;

use crate::record::StoreRow;

/// Credential forwarded to the store so it can re-validate the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub access_token: String,
}

impl AuthContext {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .finish()
    }
}

/// The lookups the resolver needs from a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordQuery {
    /// `email` equal to the value, case-sensitive.
    EmailEquals(String),
    /// `email` equal to the value ignoring case.
    EmailEqualsIgnoreCase(String),
    /// `email` contains the fragment anywhere, ignoring case.
    EmailContains(String),
    /// Any of `fields` contains `term` ignoring case; newest `updated_at` first.
    TextSearch { term: String, fields: Vec<String> },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store is not configured")]
    NotConfigured,
    #[error("record store transport error: {0}")]
    Transport(String),
    #[error("record store returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("record store response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch(
        &self,
        query: &RecordQuery,
        auth: Option<&AuthContext>,
    ) -> Result<Vec<StoreRow>, StoreError>;
}

/// Rows held in memory, matched with the same semantics as the remote store.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecordStore {
    rows: Vec<StoreRow>,
}

impl MemoryRecordStore {
    pub fn new(rows: Vec<StoreRow>) -> Self {
        Self { rows }
    }

    /// Build from a JSON array of objects; non-object entries are skipped.
    pub fn from_json(value: Value) -> Self {
        let rows = match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn field_str<'a>(row: &'a StoreRow, name: &str) -> Option<&'a str> {
    row.get(name).and_then(Value::as_str)
}

fn field_text(row: &StoreRow, name: &str) -> Option<String> {
    match row.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch(
        &self,
        query: &RecordQuery,
        _auth: Option<&AuthContext>,
    ) -> Result<Vec<StoreRow>, StoreError> {
        let matches: Vec<StoreRow> = match query {
            RecordQuery::EmailEquals(email) => self
                .rows
                .iter()
                .filter(|row| field_str(row, "email") == Some(email.as_str()))
                .cloned()
                .collect(),
            RecordQuery::EmailEqualsIgnoreCase(email) => {
                let needle = email.to_lowercase();
                self.rows
                    .iter()
                    .filter(|row| field_str(row, "email").is_some_and(|e| e.to_lowercase() == needle))
                    .cloned()
                    .collect()
            }
            RecordQuery::EmailContains(fragment) => {
                let needle = fragment.to_lowercase();
                self.rows
                    .iter()
                    .filter(|row| {
                        field_str(row, "email").is_some_and(|e| e.to_lowercase().contains(&needle))
                    })
                    .cloned()
                    .collect()
            }
            RecordQuery::TextSearch { term, fields } => {
                let needle = term.to_lowercase();
                let mut hits: Vec<StoreRow> = self
                    .rows
                    .iter()
                    .filter(|row| {
                        fields.iter().any(|f| {
                            field_text(row, f).is_some_and(|v| v.to_lowercase().contains(&needle))
                        })
                    })
                    .cloned()
                    .collect();
                // RFC 3339 strings in one offset sort lexically; rows without a timestamp go last.
                hits.sort_by_key(|row| Reverse(field_str(row, "updated_at").map(str::to_string)));
                hits
            }
        };
        Ok(matches)
    }
}
