use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ava_core::{
    AdmissionController, AdmissionPolicy, ChatMessage, Completion, CompletionError,
    CompletionService, MemoryRecordStore, Orchestrator, OrchestratorOptions, Resolver,
    ResolverOptions,
};
use once_cell::sync::Lazy;
use serde_json::json;

use crate::AppState;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub(crate) mod env {
    use super::*;

    pub(crate) struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
        saved: HashMap<String, Option<String>>,
    }

    pub(crate) fn guard() -> EnvGuard {
        EnvGuard {
            _lock: ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner()),
            saved: HashMap::new(),
        }
    }

    impl EnvGuard {
        fn remember(&mut self, key: &str) {
            self.saved
                .entry(key.to_string())
                .or_insert_with(|| std::env::var(key).ok());
        }

        pub(crate) fn set(&mut self, key: &str, value: impl AsRef<str>) {
            self.remember(key);
            std::env::set_var(key, value.as_ref());
        }

        pub(crate) fn remove(&mut self, key: &str) {
            self.remember(key);
            std::env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain() {
                match value {
                    Some(val) => std::env::set_var(&key, val),
                    None => std::env::remove_var(&key),
                }
            }
        }
    }
}

/// Completion double that records what it was sent.
#[derive(Default)]
pub(crate) struct ScriptedCompletion {
    pub(crate) reply: Option<String>,
    pub(crate) fail: bool,
    pub(crate) calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompletion {
    pub(crate) fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, CompletionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        if self.fail {
            return Err(CompletionError::Transport("connection reset".into()));
        }
        Ok(Completion {
            text: self.reply.clone(),
            usage: Some(json!({"prompt_tokens": 40, "completion_tokens": 8, "total_tokens": 48})),
        })
    }
}

pub(crate) fn sample_store() -> MemoryRecordStore {
    MemoryRecordStore::from_json(json!([
        {
            "id": 7,
            "email": "sam@example.com",
            "project_id": "AV-7",
            "milestone": "Install Scheduled",
            "raw_payload": "{\"address\":\"1 Main St\",\"city\":\"Provo\",\"state\":\"UT\",\"zip\":\"84601\"}",
            "updated_at": "2024-05-01T12:00:00Z"
        }
    ]))
}

/// State wired with the sample store and the given completion double.
pub(crate) fn build_state(completion: Arc<ScriptedCompletion>, limit: u32) -> AppState {
    let resolver = Arc::new(Resolver::new(
        Arc::new(sample_store()),
        ResolverOptions::default(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        resolver.clone(),
        completion,
        OrchestratorOptions::default(),
    ));
    let admission = Arc::new(AdmissionController::in_memory(AdmissionPolicy {
        limit,
        ..AdmissionPolicy::default()
    }));
    AppState::new(admission, orchestrator, resolver)
}
