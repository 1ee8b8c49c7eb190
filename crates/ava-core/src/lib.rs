//! Core of the support-chat service: request admission, claimed-identity
//! extraction, project record resolution and conversation orchestration.
//!
//! Nothing in this crate talks HTTP. External collaborators sit behind
//! traits: [`RateLimitStore`], [`RecordStore`], [`MatchStrategy`] and
//! [`CompletionService`].

pub mod admission;
pub mod completion;
mod config;
pub mod identity;
pub mod orchestrator;
pub mod prompt;
pub mod record;
pub mod resolver;
pub mod store;

pub use admission::{
    Admission, AdmissionController, AdmissionPolicy, MemoryRateLimitStore, RateLimitEntry,
    RateLimitStore, UNKNOWN_CLIENT,
};
pub use completion::{ChatMessage, Completion, CompletionError, CompletionService, Role};
pub use config::{
    config_schema_json, load_config, parse_config, AssistantConfig, CompletionConfig, Config,
    ConfigError, RateLimitConfig, ServerConfig, StoreConfig,
};
pub use identity::{bearer_token, extract_email, mask_email};
pub use orchestrator::{
    ChatError, ChatReply, ChatTurn, ExplicitLookup, HistoryTurn, Orchestrator,
    OrchestratorOptions,
};
pub use prompt::Persona;
pub use record::{ProjectRecord, RawPayload, StoreRow};
pub use resolver::{LookupRequest, MatchStrategy, Resolver, ResolverOptions};
pub use store::{AuthContext, MemoryRecordStore, RecordQuery, RecordStore, StoreError};
