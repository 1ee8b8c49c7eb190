use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ava_core::{
    bearer_token, Admission, ChatError, ChatTurn, ExplicitLookup, HistoryTurn, UNKNOWN_CLIENT,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use utoipa::ToSchema;

use crate::{responses, security, AppState};

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct HistoryEntry {
    /// `user` or `assistant`; anything else is sent as `user`.
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ProjectLookupReq {
    /// Blank or missing falls back to the message and session token.
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "conversationHistory")]
    pub conversation_history: Vec<HistoryEntry>,
    #[serde(default, rename = "projectLookup")]
    pub project_lookup: Option<ProjectLookupReq>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub usage: Option<Value>,
}

impl ChatRequest {
    fn into_turn(self, bearer: Option<String>) -> ChatTurn {
        ChatTurn {
            message: self.message.unwrap_or_default(),
            history: self
                .conversation_history
                .into_iter()
                .map(|h| HistoryTurn {
                    role: h.role,
                    content: h.content,
                })
                .collect(),
            bearer,
            lookup: self
                .project_lookup
                .and_then(|l| l.email)
                .filter(|email| !email.trim().is_empty())
                .map(|email| ExplicitLookup { email }),
        }
    }
}

/// Admission runs before the body is inspected, so every attempt counts.
async fn admit(state: &AppState) -> Option<Response> {
    let key = security::client_addr().unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    match state.admission().admit(&key).await {
        Admission::Allowed { .. } => None,
        Admission::Denied { retry_after_secs } => Some(responses::rate_limited(retry_after_secs)),
    }
}

/// Chat with the assistant.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "Chat",
    request_body = ChatRequest,
    params(("Authorization" = Option<String>, Header, description = "Optional `Bearer <session token>`")),
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Missing message or malformed body"),
        (status = 405, description = "Method not allowed"),
        (status = 429, description = "Rate limited; carries retryAfter"),
        (status = 500, description = "Completion service failed")
    )
)]
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    if let Some(denied) = admit(&state).await {
        return denied;
    }
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            debug!(target: "ava::chat", error = %rejection, "rejecting chat body");
            return responses::bad_request("Invalid JSON body");
        }
    };
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string);

    match state.orchestrator().respond(req.into_turn(bearer)).await {
        Ok(reply) => Json(ChatResponse {
            reply: reply.reply,
            usage: reply.usage,
        })
        .into_response(),
        Err(err @ ChatError::EmptyMessage) => responses::bad_request(&err.to_string()),
        Err(err @ ChatError::Completion) => responses::internal(&err.to_string()),
    }
}
