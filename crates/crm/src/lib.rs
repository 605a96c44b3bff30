//! HTTP client for the conversation-audit CRM.
//!
//! Two endpoints matter to the dispatch pipeline: creating a conversation
//! and posting its message batch. Both go through a shared connection pool,
//! a lazily-resolved API key, and bounded retry for transient failures.

pub mod client;
pub mod error;
pub mod retry;
pub mod secret;
pub mod wire;

pub use {
    client::{CallResult, CrmClient},
    error::{Error, Result},
    retry::{API_KEY_HEADER, RetryPolicy},
    secret::{EnvSecretSource, SecretSource, StaticSecretSource},
    wire::{CreateConversationRequest, OutboundMessage, SenderRole, conversation_id_from_body},
};
