//! Canonical project records and payload handling.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// One row as returned by the record store, before normalisation.
pub type StoreRow = Map<String, Value>;

/// Upstream payload exactly as stored: a JSON-encoded string or an already
/// structured value. Never rewritten.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(Value);

impl RawPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_null()
    }

    /// Materialise the typed view. A string is decoded as JSON; any other
    /// non-null value is taken as already structured.
    pub fn parse(&self) -> Result<Option<Value>, serde_json::Error> {
        match &self.0 {
            Value::Null => Ok(None),
            Value::String(text) => serde_json::from_str(text).map(Some),
            other => Ok(Some(other.clone())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub milestone: Option<String>,
    #[serde(default)]
    pub raw_payload: RawPayload,
    /// Decoded `raw_payload`; response-scoped, never written back.
    #[serde(default)]
    pub parsed_payload: Option<Value>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProjectRecord {
    /// Normalise a store row. Rows without an `id` are rejected.
    pub fn from_row(row: &StoreRow) -> Option<Self> {
        let id = row.get("id").and_then(scalar_string)?;
        let project_id = row
            .get("project_id")
            .and_then(scalar_string)
            .unwrap_or_else(|| id.clone());
        let email = row
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string);
        let milestone = row
            .get("milestone")
            .and_then(scalar_string)
            .or_else(|| legacy_milestone(row));
        let raw_payload = RawPayload::new(row.get("raw_payload").cloned().unwrap_or(Value::Null));
        let updated_at = row
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(parse_timestamp);

        let mut record = Self {
            id,
            email,
            project_id,
            milestone,
            raw_payload,
            parsed_payload: None,
            updated_at,
        };
        record.decode_payload();
        Some(record)
    }

    /// Fill `parsed_payload` from `raw_payload`. A malformed payload only
    /// affects this record: the raw value stays as it was.
    pub fn decode_payload(&mut self) {
        self.parsed_payload = match self.raw_payload.parse() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    target: "ava::resolver",
                    record = %self.id,
                    error = %err,
                    "raw_payload is not valid JSON"
                );
                None
            }
        };
    }

    /// String field from the decoded payload, if present and non-empty.
    pub fn payload_field(&self, name: &str) -> Option<String> {
        self.parsed_payload
            .as_ref()?
            .get(name)
            .and_then(scalar_string)
            .filter(|s| !s.trim().is_empty())
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn legacy_milestone(row: &StoreRow) -> Option<String> {
    let status = row
        .get("status")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    match row.get("progress_percentage").and_then(Value::as_f64) {
        Some(pct) => Some(format!("{status} ({pct}%)")),
        None => Some(status.to_string()),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
