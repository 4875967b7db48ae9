//! Session token cache
//!
//! Hands out a usable session token for the active agent, calling the
//! issuer only when the cached token is missing, about to expire, or scoped
//! to a different agent. Refreshes are single-flight: concurrent callers
//! wait for the refresh already in progress and reuse its token.

use crate::error::{PreviewError, Result};
use crate::lock;
use crate::provider::TokenIssuer;
use crate::types::{AgentContext, SessionToken};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Reuse-or-refresh cache for one agent's session token
pub struct TokenCache {
    issuer: Arc<dyn TokenIssuer>,
    safety_window: Duration,

    /// Current token, if any
    cached: Mutex<Option<SessionToken>>,

    /// Public id of the agent currently being edited
    bound_agent: Mutex<Option<String>>,

    /// Serializes refreshes
    refresh: tokio::sync::Mutex<()>,
}

impl TokenCache {
    /// Create an empty cache
    pub fn new(issuer: Arc<dyn TokenIssuer>, safety_window: Duration) -> Self {
        Self {
            issuer,
            safety_window,
            cached: Mutex::new(None),
            bound_agent: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Return a usable token for `agent`, refreshing it if needed
    ///
    /// Fails with `NotReady` when no agent is loaded. Issuer failures are
    /// returned as-is and nothing is retried.
    pub async fn ensure_token(&self, agent: Option<&AgentContext>) -> Result<SessionToken> {
        let agent = agent.ok_or(PreviewError::NotReady)?;

        if let Some(token) = self.usable(&agent.public_id) {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.usable(&agent.public_id) {
            return Ok(token);
        }

        let grant = self.issuer.issue_token(&agent.public_id).await.map_err(|e| match e {
            PreviewError::TokenIssuance(_) => e,
            other => PreviewError::TokenIssuance(other.to_string()),
        })?;
        let token = SessionToken::from_grant(grant, &agent.public_id, Instant::now());

        let still_bound = lock(&self.bound_agent)
            .as_deref()
            .map_or(true, |bound| bound == agent.public_id);
        if still_bound {
            *lock(&self.cached) = Some(token.clone());
        }

        tracing::debug!(
            agent = %agent.public_id,
            issuer = self.issuer.name(),
            cached = still_bound,
            "Session token refreshed"
        );
        Ok(token)
    }

    /// Track the active agent, dropping the cached token when it changes
    ///
    /// Tokens are not portable across agents, so a switch clears the cache
    /// even if the token has not expired.
    pub fn bind_agent(&self, public_id: Option<&str>) {
        let mut bound = lock(&self.bound_agent);
        if bound.as_deref() == public_id {
            return;
        }

        tracing::debug!(
            from = ?bound.as_deref(),
            to = ?public_id,
            "Active agent changed, invalidating session token"
        );
        *bound = public_id.map(str::to_string);
        *lock(&self.cached) = None;
    }

    /// Drop the cached token
    pub fn invalidate(&self) {
        *lock(&self.cached) = None;
    }

    /// Current token without refreshing
    pub fn cached(&self) -> Option<SessionToken> {
        lock(&self.cached).clone()
    }

    fn usable(&self, public_id: &str) -> Option<SessionToken> {
        let cached = lock(&self.cached);
        cached
            .as_ref()
            .filter(|t| t.agent_public_id == public_id)
            .filter(|t| t.is_usable(Instant::now(), self.safety_window))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryBackend;

    fn cache(backend: &MemoryBackend) -> TokenCache {
        TokenCache::new(Arc::new(backend.clone()), Duration::from_millis(5000))
    }

    fn agent(public_id: &str) -> AgentContext {
        AgentContext::new(1, public_id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_without_agent() {
        let backend = MemoryBackend::new();
        let cache = cache(&backend);

        let err = cache.ensure_token(None).await.unwrap_err();
        assert!(matches!(err, PreviewError::NotReady));
        assert_eq!(backend.token_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reuses_token_within_lifetime() {
        let backend = MemoryBackend::new();
        backend.set_token_ttl(60);
        let cache = cache(&backend);
        let agent = agent("pub-a");

        let first = cache.ensure_token(Some(&agent)).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        let second = cache.ensure_token(Some(&agent)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.token_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_inside_safety_window() {
        let backend = MemoryBackend::new();
        backend.set_token_ttl(60);
        let cache = cache(&backend);
        let agent = agent("pub-a");

        let first = cache.ensure_token(Some(&agent)).await.unwrap();
        // 56s in: 4s left, inside the 5s window
        tokio::time::advance(Duration::from_secs(56)).await;
        let second = cache.ensure_token(Some(&agent)).await.unwrap();

        assert_ne!(first.value, second.value);
        assert_eq!(backend.token_calls(), 2);

        let third = cache.ensure_token(Some(&agent)).await.unwrap();
        assert_eq!(second, third);
        assert_eq!(backend.token_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_computed_from_expires_in() {
        let backend = MemoryBackend::new();
        backend.set_token_ttl(120);
        let cache = cache(&backend);

        let start = Instant::now();
        let token = cache.ensure_token(Some(&agent("pub-a"))).await.unwrap();
        assert_eq!(token.expires_at, start + Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_switch_invalidates_unexpired_token() {
        let backend = MemoryBackend::new();
        let cache = cache(&backend);

        cache.bind_agent(Some("pub-a"));
        cache.ensure_token(Some(&agent("pub-a"))).await.unwrap();
        assert!(cache.cached().is_some());

        cache.bind_agent(Some("pub-b"));
        assert!(cache.cached().is_none());

        let token = cache.ensure_token(Some(&agent("pub-b"))).await.unwrap();
        assert_eq!(token.agent_public_id, "pub-b");
        assert_eq!(backend.issued_for(), vec!["pub-a", "pub-b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebinding_same_agent_keeps_token() {
        let backend = MemoryBackend::new();
        let cache = cache(&backend);

        cache.bind_agent(Some("pub-a"));
        cache.ensure_token(Some(&agent("pub-a"))).await.unwrap();
        cache.bind_agent(Some("pub-a"));

        assert!(cache.cached().is_some());
        cache.ensure_token(Some(&agent("pub-a"))).await.unwrap();
        assert_eq!(backend.token_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_for_other_agent_is_not_reused() {
        let backend = MemoryBackend::new();
        let cache = cache(&backend);

        cache.ensure_token(Some(&agent("pub-a"))).await.unwrap();
        let token = cache.ensure_token(Some(&agent("pub-b"))).await.unwrap();

        assert_eq!(token.agent_public_id, "pub-b");
        assert_eq!(backend.token_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issuer_failure_propagates_without_retry() {
        let backend = MemoryBackend::new();
        backend.fail_tokens(true);
        let cache = cache(&backend);

        let err = cache.ensure_token(Some(&agent("pub-a"))).await.unwrap_err();
        assert!(matches!(err, PreviewError::TokenIssuance(_)));
        assert_eq!(backend.token_calls(), 1);
        assert!(cache.cached().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refresh_is_single_flight() {
        let backend = MemoryBackend::new();
        let cache = cache(&backend);
        let agent = agent("pub-a");

        let (a, b, c) = tokio::join!(
            cache.ensure_token(Some(&agent)),
            cache.ensure_token(Some(&agent)),
            cache.ensure_token(Some(&agent)),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(backend.token_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refresh() {
        let backend = MemoryBackend::new();
        let cache = cache(&backend);
        let agent = agent("pub-a");

        cache.ensure_token(Some(&agent)).await.unwrap();
        cache.invalidate();
        cache.ensure_token(Some(&agent)).await.unwrap();

        assert_eq!(backend.token_calls(), 2);
    }
}
