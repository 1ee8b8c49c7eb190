//! Conversation orchestration: optional record enrichment, prompt assembly and
//! a single completion call per request.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::completion::{ChatMessage, CompletionService, Role};
use crate::identity::{self, mask_email};
use crate::prompt::{self, Persona};
use crate::record::ProjectRecord;
use crate::resolver::{LookupRequest, Resolver};

/// Reply used when the provider answers without any text.
pub const EMPTY_REPLY: &str = "Sorry, I could not generate a response.";

/// One prior turn as sent by the widget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

/// Structured lookup carried alongside a chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitLookup {
    pub email: String,
}

#[derive(Clone, Debug, Default)]
pub struct ChatTurn {
    pub message: String,
    pub history: Vec<HistoryTurn>,
    /// Raw bearer token, if the request carried one.
    pub bearer: Option<String>,
    pub lookup: Option<ExplicitLookup>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatReply {
    pub reply: String,
    pub usage: Option<Value>,
    pub records: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message is required")]
    EmptyMessage,
    /// Deliberately generic; the provider error is only logged.
    #[error("Failed to get response from AI")]
    Completion,
}

#[derive(Clone, Debug)]
pub struct OrchestratorOptions {
    pub persona: Persona,
    /// Prior turns forwarded to the completion service, newest kept.
    pub history_limit: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            persona: Persona::default(),
            history_limit: 20,
        }
    }
}

pub struct Orchestrator {
    resolver: Arc<Resolver>,
    completion: Arc<dyn CompletionService>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<Resolver>,
        completion: Arc<dyn CompletionService>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            resolver,
            completion,
            options,
        }
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        self.resolver.clone()
    }

    pub async fn respond(&self, turn: ChatTurn) -> Result<ChatReply, ChatError> {
        let message = turn.message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let bearer = turn
            .bearer
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let customer_email = bearer.and_then(identity::extract_email);
        let wants_lookup = prompt::mentions_project(message) || turn.lookup.is_some();
        debug!(
            target: "ava::chat",
            message_len = message.len(),
            wants_lookup,
            has_token = bearer.is_some(),
            history = turn.history.len(),
            "processing message"
        );

        let records = if wants_lookup {
            self.enrich(message, bearer, turn.lookup.as_ref()).await
        } else {
            Vec::new()
        };

        let system = prompt::build_system_prompt(
            &self.options.persona,
            customer_email.as_deref(),
            &records,
        );
        let messages = self.assemble(system, &turn.history, message);

        let started = Instant::now();
        match self.completion.complete(&messages).await {
            Ok(completion) => {
                let reply = completion
                    .text
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| EMPTY_REPLY.to_string());
                info!(
                    target: "ava::chat",
                    records = records.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "reply generated"
                );
                Ok(ChatReply {
                    reply,
                    usage: completion.usage,
                    records: records.len(),
                })
            }
            Err(err) => {
                error!(
                    target: "ava::chat",
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "completion failed"
                );
                Err(ChatError::Completion)
            }
        }
    }

    async fn enrich(
        &self,
        message: &str,
        bearer: Option<&str>,
        lookup: Option<&ExplicitLookup>,
    ) -> Vec<ProjectRecord> {
        let request = LookupRequest {
            query: Some(message.to_string()),
            email: lookup.map(|l| l.email.clone()),
            session_token: bearer.map(str::to_string),
        };
        let records = self.resolver.lookup(&request).await;
        if let Some(l) = lookup {
            debug!(
                target: "ava::chat",
                email = %mask_email(&l.email),
                count = records.len(),
                "explicit lookup finished"
            );
        }
        records
    }

    fn assemble(&self, system: String, history: &[HistoryTurn], message: &str) -> Vec<ChatMessage> {
        let skip = history.len().saturating_sub(self.options.history_limit);
        let mut messages = Vec::with_capacity(history.len() - skip + 2);
        messages.push(ChatMessage::new(Role::System, system));
        for turn in history.iter().skip(skip) {
            let role = match Role::from_label(&turn.role) {
                // Callers may not inject system instructions through history.
                Role::System => Role::User,
                other => other,
            };
            messages.push(ChatMessage::new(role, turn.content.clone()));
        }
        messages.push(ChatMessage::new(Role::User, message));
        messages
    }
}
