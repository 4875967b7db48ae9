//! HTTP backend for the platform REST API
//!
//! - `POST {base}/agents/{agentId}/session-token` → `TokenGrant`
//! - `POST {base}/chat/{agentPublicId}` with `X-Session-Token` → `ChatResponse`

use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result};
use crate::provider::{ChatTransport, TokenIssuer};
use crate::types::{ChatRequest, ChatResponse, TokenGrant};
use async_trait::async_trait;
use reqwest::Url;

/// Header carrying the agent session token on chat requests
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

/// Token issuer and chat transport backed by `reqwest`
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    base: Url,
    admin_token: Option<String>,
}

impl HttpBackend {
    /// Build a backend from validated config
    pub fn new(config: &PreviewConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("a3s-preview/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PreviewError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| PreviewError::Config(format!("Invalid baseUrl {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(PreviewError::Config(format!(
                "baseUrl cannot carry a path: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            base,
            admin_token: config.admin_token.clone(),
        })
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of the session token endpoint
    pub fn token_url(&self, agent_public_id: &str) -> Url {
        self.endpoint(&["agents", agent_public_id, "session-token"])
    }

    /// URL of the chat endpoint
    pub fn chat_url(&self, agent_public_id: &str) -> Url {
        self.endpoint(&["chat", agent_public_id])
    }

    /// Append path segments to the base URL, percent-encoding each one
    fn endpoint(&self, parts: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejected cannot-be-a-base URLs
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(parts);
        }
        url
    }
}

/// Collapse an error body into a single bounded line for logs and errors
fn summarize_body(body: &str) -> String {
    let line = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() > 200 {
        let truncated: String = line.chars().take(200).collect();
        format!("{}…", truncated)
    } else {
        line
    }
}

#[async_trait]
impl TokenIssuer for HttpBackend {
    async fn issue_token(&self, agent_public_id: &str) -> Result<TokenGrant> {
        let url = self.token_url(agent_public_id);

        let mut request = self.client.post(url.clone());
        if let Some(admin) = &self.admin_token {
            request = request.bearer_auth(admin);
        }

        let response = request.send().await.map_err(|e| {
            PreviewError::TokenIssuance(format!("Failed to reach {}: {}", url, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PreviewError::TokenIssuance(format!(
                "{} returned {}: {}",
                url,
                status,
                summarize_body(&body)
            )));
        }

        let grant: TokenGrant = response.json().await.map_err(|e| {
            PreviewError::TokenIssuance(format!("Failed to parse token response: {}", e))
        })?;

        tracing::debug!(
            agent = %agent_public_id,
            expires_in_secs = grant.expires_in,
            "Session token issued"
        );
        Ok(grant)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[async_trait]
impl ChatTransport for HttpBackend {
    async fn send(
        &self,
        agent_public_id: &str,
        session_token: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        let url = self.chat_url(agent_public_id);

        let response = self
            .client
            .post(url.clone())
            .header(SESSION_TOKEN_HEADER, session_token)
            .json(request)
            .send()
            .await
            .map_err(|e| PreviewError::ChatTransport(format!("Failed to reach {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PreviewError::ChatTransport(format!(
                "{} returned {}: {}",
                url,
                status,
                summarize_body(&body)
            )));
        }

        response.json().await.map_err(|e| {
            PreviewError::ChatTransport(format!("Failed to parse chat response: {}", e))
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
