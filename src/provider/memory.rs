//! In-memory backend for development and testing
//!
//! Issues sequential tokens and answers chat messages with a canned or
//! echoed reply. Every call is recorded so tests can count round trips.
//! Clones share state.

use crate::error::{PreviewError, Result};
use crate::lock;
use crate::provider::{ChatTransport, TokenIssuer};
use crate::types::{ChatRequest, ChatResponse, TokenGrant};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A chat call as seen by the memory backend
#[derive(Debug, Clone)]
pub struct RecordedChat {
    pub agent_public_id: String,
    pub session_token: String,
    pub request: ChatRequest,
}

#[derive(Default)]
struct Inner {
    token_calls: AtomicU64,
    fail_tokens: AtomicBool,
    fail_chat: AtomicBool,
    token_ttl_secs: AtomicU64,
    chat_delay_ms: AtomicU64,
    issued: Mutex<Vec<String>>,
    chats: Mutex<Vec<RecordedChat>>,
    replies: Mutex<VecDeque<ChatResponse>>,
}

/// Scripted token issuer and chat transport
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend issuing one-hour tokens and echoing messages
    pub fn new() -> Self {
        let inner = Inner::default();
        inner.token_ttl_secs.store(3600, Ordering::SeqCst);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Lifetime of tokens issued from now on
    pub fn set_token_ttl(&self, secs: u64) {
        self.inner.token_ttl_secs.store(secs, Ordering::SeqCst);
    }

    /// Make the token endpoint fail
    pub fn fail_tokens(&self, fail: bool) {
        self.inner.fail_tokens.store(fail, Ordering::SeqCst);
    }

    /// Make the chat endpoint fail
    pub fn fail_chat(&self, fail: bool) {
        self.inner.fail_chat.store(fail, Ordering::SeqCst);
    }

    /// Delay every chat reply (pairs with paused tokio time in tests)
    pub fn set_chat_delay(&self, delay: Duration) {
        self.inner
            .chat_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Queue a reply; without queued replies the message is echoed
    pub fn push_reply(&self, reply: ChatResponse) {
        lock(&self.inner.replies).push_back(reply);
    }

    /// Number of token issue calls, failed ones included
    pub fn token_calls(&self) -> u64 {
        self.inner.token_calls.load(Ordering::SeqCst)
    }

    /// Agent public ids tokens were issued for, in order
    pub fn issued_for(&self) -> Vec<String> {
        lock(&self.inner.issued).clone()
    }

    /// Successful and failed chat calls, in order
    pub fn chats(&self) -> Vec<RecordedChat> {
        lock(&self.inner.chats).clone()
    }

    /// Number of chat calls
    pub fn chat_calls(&self) -> usize {
        lock(&self.inner.chats).len()
    }
}

#[async_trait]
impl TokenIssuer for MemoryBackend {
    async fn issue_token(&self, agent_public_id: &str) -> Result<TokenGrant> {
        let n = self.inner.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.fail_tokens.load(Ordering::SeqCst) {
            return Err(PreviewError::TokenIssuance(format!(
                "memory backend refused token for {}",
                agent_public_id
            )));
        }

        lock(&self.inner.issued).push(agent_public_id.to_string());
        Ok(TokenGrant {
            token: format!("tok-{}-{}", agent_public_id, n),
            expires_in: self.inner.token_ttl_secs.load(Ordering::SeqCst) as f64,
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl ChatTransport for MemoryBackend {
    async fn send(
        &self,
        agent_public_id: &str,
        session_token: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        lock(&self.inner.chats).push(RecordedChat {
            agent_public_id: agent_public_id.to_string(),
            session_token: session_token.to_string(),
            request: request.clone(),
        });

        let delay = self.inner.chat_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.inner.fail_chat.load(Ordering::SeqCst) {
            return Err(PreviewError::ChatTransport(
                "memory backend chat failure".to_string(),
            ));
        }

        let queued = lock(&self.inner.replies).pop_front();
        Ok(queued.unwrap_or_else(|| ChatResponse::text(format!("Echo: {}", request.message))))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
