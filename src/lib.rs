//! # a3s-preview
//!
//! Session token caching and debounced live-preview chat for A3S agent
//! builders.
//!
//! ## Overview
//!
//! While an operator edits an agent (persona, domain expertise, knowledge
//! documents, web search, ...), `a3s-preview` keeps a short preview
//! conversation in sync with the configuration:
//!
//! - configuration snapshots are fingerprinted and debounced, so a burst of
//!   edits produces exactly one preview request for the final state
//! - a short-lived, agent-scoped session token is reused until it nears
//!   expiry and dropped when the edited agent changes
//! - the first real message typed by the operator stops automatic previews,
//!   and any preview reply still in flight is discarded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use a3s_preview::{AgentContext, ConfigurationSnapshot, PreviewConfig, PreviewController};
//! use a3s_preview::provider::http::HttpBackend;
//!
//! # async fn example() -> a3s_preview::Result<()> {
//! let config = PreviewConfig::new().with_base_url("https://api.example.com/v1");
//! let controller = PreviewController::new(config.clone(), HttpBackend::new(&config)?);
//!
//! controller.set_agent(Some(AgentContext::new(42, "agt_8f3k2")));
//! controller.configuration_changed(
//!     ConfigurationSnapshot::default()
//!         .with_persona("sales_rep")
//!         .with_documents([12, 7]),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **TokenIssuer** / **ChatTransport** traits: remote collaborators
//!   (`http` for the platform API, `memory` for tests)
//! - **TokenCache**: reuse-or-refresh session tokens, single-flight
//! - **Debouncer**: cancellable quiet-period timer
//! - **ConversationLog**: preview/real messages and the real-activity marker
//! - **PreviewController**: ties the above into the preview state machine

pub mod config;
pub mod controller;
pub mod conversation;
pub mod debounce;
pub mod error;
pub mod provider;
pub mod snapshot;
pub mod token;
pub mod types;

// Re-export core types
pub use config::PreviewConfig;
pub use controller::{PreviewController, PreviewEvent, PreviewState};
pub use conversation::ConversationLog;
pub use debounce::Debouncer;
pub use error::{PreviewError, Result};
pub use provider::{ChatTransport, TokenIssuer};
pub use snapshot::ConfigurationSnapshot;
pub use token::TokenCache;
pub use types::{
    AgentContext, ChatRequest, ChatResponse, ConversationMessage, CustomerContext, MessageOrigin,
    MessageRole, SessionContext, SessionToken, TokenGrant,
};

// Re-export backends for convenience
pub use provider::http::HttpBackend;
pub use provider::memory::MemoryBackend;

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
