//! Record resolution: an ordered cascade of email match strategies plus a
//! single-stage free-text search.
//!
//! Stages run strictly in order and the first stage that yields at least one
//! record ends the cascade. A store failure is logged and counts as an empty
//! stage; it never escapes the resolver.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::identity::{self, mask_email};
use crate::record::{ProjectRecord, StoreRow};
use crate::store::{AuthContext, RecordQuery, RecordStore};

/// One stage of the email cascade.
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    /// Store query for this stage, or `None` when the stage does not apply to the input.
    fn plan(&self, email: &str) -> Option<RecordQuery>;
}

pub struct ExactMatch;

impl MatchStrategy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn plan(&self, email: &str) -> Option<RecordQuery> {
        non_empty(email.trim()).map(|e| RecordQuery::EmailEquals(e.to_string()))
    }
}

pub struct CaseInsensitiveMatch;

impl MatchStrategy for CaseInsensitiveMatch {
    fn name(&self) -> &'static str {
        "case_insensitive"
    }

    fn plan(&self, email: &str) -> Option<RecordQuery> {
        non_empty(email.trim()).map(|e| RecordQuery::EmailEqualsIgnoreCase(e.to_string()))
    }
}

/// Matches on the local part alone. Tolerates domain typos and aliases at the
/// cost of false positives: `jane` also finds `janet@...`.
pub struct UsernameFragmentMatch;

impl UsernameFragmentMatch {
    pub fn fragment(email: &str) -> Option<&str> {
        let local = email.trim().split('@').next().unwrap_or_default();
        non_empty(local.trim())
    }
}

impl MatchStrategy for UsernameFragmentMatch {
    fn name(&self) -> &'static str {
        "username_fragment"
    }

    fn plan(&self, email: &str) -> Option<RecordQuery> {
        Self::fragment(email).map(|f| RecordQuery::EmailContains(f.to_string()))
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Lookup inputs accepted by the project-lookup surface.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LookupRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "sessionToken", alias = "session_token")]
    pub session_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverOptions {
    pub search_fields: Vec<String>,
    pub fragment_match: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            search_fields: vec!["email".into(), "project_id".into(), "milestone".into()],
            fragment_match: true,
        }
    }
}

pub struct Resolver {
    store: Arc<dyn RecordStore>,
    strategies: Vec<Box<dyn MatchStrategy>>,
    search_fields: Vec<String>,
}

impl Resolver {
    pub fn new(store: Arc<dyn RecordStore>, options: ResolverOptions) -> Self {
        let mut strategies: Vec<Box<dyn MatchStrategy>> =
            vec![Box::new(ExactMatch), Box::new(CaseInsensitiveMatch)];
        if options.fragment_match {
            strategies.push(Box::new(UsernameFragmentMatch));
        }
        Self::with_strategies(store, strategies, options.search_fields)
    }

    pub fn with_strategies(
        store: Arc<dyn RecordStore>,
        strategies: Vec<Box<dyn MatchStrategy>>,
        search_fields: Vec<String>,
    ) -> Self {
        Self {
            store,
            strategies,
            search_fields,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve_by_email(
        &self,
        email: &str,
        auth: Option<&AuthContext>,
    ) -> Vec<ProjectRecord> {
        let masked = mask_email(email.trim());
        for strategy in &self.strategies {
            let Some(query) = strategy.plan(email) else {
                debug!(target: "ava::resolver", stage = strategy.name(), "stage skipped");
                continue;
            };
            let rows = self.attempt(strategy.name(), &query, auth).await;
            if !rows.is_empty() {
                info!(
                    target: "ava::resolver",
                    stage = strategy.name(),
                    email = %masked,
                    count = rows.len(),
                    "records resolved"
                );
                return normalise(rows);
            }
        }
        debug!(target: "ava::resolver", email = %masked, "no records matched");
        Vec::new()
    }

    pub async fn search_free_text(&self, term: &str) -> Vec<ProjectRecord> {
        let term = term.trim();
        if term.is_empty() || self.search_fields.is_empty() {
            return Vec::new();
        }
        let query = RecordQuery::TextSearch {
            term: term.to_string(),
            fields: self.search_fields.clone(),
        };
        let rows = self.attempt("free_text", &query, None).await;
        info!(
            target: "ava::resolver",
            term_len = term.len(),
            count = rows.len(),
            "free-text search finished"
        );
        normalise(rows)
    }

    /// Explicit email first, then the email claimed by the session token, then
    /// the free-text query.
    pub async fn lookup(&self, req: &LookupRequest) -> Vec<ProjectRecord> {
        let token = req
            .session_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let auth = token.map(AuthContext::new);
        let explicit = req
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        let claimed = token.and_then(identity::extract_email);

        if let Some(email) = explicit.or(claimed) {
            return self.resolve_by_email(&email, auth.as_ref()).await;
        }
        match req.query.as_deref() {
            Some(query) => self.search_free_text(query).await,
            None => Vec::new(),
        }
    }

    async fn attempt(
        &self,
        stage: &'static str,
        query: &RecordQuery,
        auth: Option<&AuthContext>,
    ) -> Vec<StoreRow> {
        match self.store.fetch(query, auth).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(target: "ava::resolver", stage, error = %err, "store lookup failed");
                Vec::new()
            }
        }
    }
}

fn normalise(rows: Vec<StoreRow>) -> Vec<ProjectRecord> {
    rows.iter()
        .filter_map(|row| {
            let record = ProjectRecord::from_row(row);
            if record.is_none() {
                warn!(target: "ava::resolver", "store row without id skipped");
            }
            record
        })
        .collect()
}
