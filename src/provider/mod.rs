//! Backend traits for the remote collaborators of a preview session
//!
//! The token issuer and the chat transport are separate traits so that the
//! cache and the controller can be exercised against scripted backends. The
//! HTTP backend implements both against the platform REST API.

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse, TokenGrant};
use async_trait::async_trait;

pub mod http;
pub mod memory;

/// Mints agent-scoped session tokens
///
/// The caller only ever supplies the agent's public identifier; the agent's
/// long-lived secret stays on the server.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Issue a new token for the agent
    async fn issue_token(&self, agent_public_id: &str) -> Result<TokenGrant>;

    /// Backend name (e.g., "http", "memory")
    fn name(&self) -> &str;
}

/// Sends chat messages to an agent
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one message authorized by `session_token`
    async fn send(
        &self,
        agent_public_id: &str,
        session_token: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse>;

    /// Backend name (e.g., "http", "memory")
    fn name(&self) -> &str;
}
