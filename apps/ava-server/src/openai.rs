//! Completion service speaking the OpenAI chat-completions protocol.

use async_trait::async_trait;
use ava_core::{ChatMessage, Completion, CompletionConfig, CompletionError, CompletionService};
use serde_json::{json, Value};
use tracing::debug;

pub(crate) struct OpenAiCompletion {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiCompletion {
    pub(crate) fn new(client: reqwest::Client, cfg: &CompletionConfig) -> Self {
        let base_url = cfg.base_url.trim().trim_end_matches('/');
        Self {
            client,
            api_url: format!("{base_url}/v1/chat/completions"),
            api_key: cfg
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        }
    }

    pub(crate) fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, CompletionError> {
        let key = self.api_key.as_deref().ok_or(CompletionError::NotConfigured)?;
        debug!(
            target: "ava::completion",
            model = %self.model,
            messages = messages.len(),
            "requesting completion"
        );
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(key)
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).chars().take(512).collect(),
            });
        }
        parse_completion(&bytes)
    }
}

fn parse_completion(bytes: &[u8]) -> Result<Completion, CompletionError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| CompletionError::Decode(e.to_string()))?;
    let choices = value
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| CompletionError::Decode("missing choices".into()))?;
    let text = choices
        .first()
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Completion {
        text,
        usage: value.get("usage").filter(|u| !u.is_null()).cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ava_core::Role;

    #[test]
    fn parses_text_and_usage() {
        let body = br#"{
            "choices": [{"message": {"role": "assistant", "content": "Your install is next week."}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 7, "total_tokens": 17}
        }"#;
        let completion = parse_completion(body).expect("completion");
        assert_eq!(completion.text.as_deref(), Some("Your install is next week."));
        assert_eq!(completion.usage.expect("usage")["total_tokens"], 17);
    }

    #[test]
    fn empty_choices_mean_no_text() {
        let completion = parse_completion(br#"{"choices": []}"#).expect("completion");
        assert!(completion.text.is_none());
        assert!(completion.usage.is_none());
        assert!(matches!(
            parse_completion(br#"{"error": {"message": "bad"}}"#),
            Err(CompletionError::Decode(_))
        ));
    }

    #[test]
    fn request_body_uses_configured_model() {
        let cfg = CompletionConfig {
            base_url: "https://llm.internal/".into(),
            api_key: Some("  ".into()),
            ..CompletionConfig::default()
        };
        let svc = OpenAiCompletion::new(reqwest::Client::new(), &cfg);
        assert!(!svc.is_configured());
        assert_eq!(svc.api_url, "https://llm.internal/v1/chat/completions");
        let body = svc.request_body(&[ChatMessage::new(Role::User, "hi")]);
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let svc = OpenAiCompletion::new(reqwest::Client::new(), &CompletionConfig::default());
        let err = svc
            .complete(&[ChatMessage::new(Role::User, "hi")])
            .await
            .expect_err("not configured");
        assert!(matches!(err, CompletionError::NotConfigured));
    }
}
