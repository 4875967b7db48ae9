//! Core types for the a3s-preview system
//!
//! Wire types (`TokenGrant`, `ChatRequest`, `ChatResponse`) mirror the
//! backend's snake_case JSON. Conversation types are local to the client.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// The loaded agent record a preview session is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    /// Numeric agent id (used for visitor scoping)
    pub id: u64,

    /// Public identifier used in chat and token URLs
    pub public_id: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AgentContext {
    /// Create an agent context
    pub fn new(id: u64, public_id: impl Into<String>) -> Self {
        Self {
            id,
            public_id: public_id.into(),
            name: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Visitor id for automatic preview turns
    pub fn preview_visitor_id(&self) -> String {
        format!("builder-preview-{}", self.id)
    }

    /// Visitor id for manual test messages
    pub fn test_visitor_id(&self) -> String {
        format!("builder-test-{}", self.id)
    }
}

/// A short-lived, agent-scoped chat credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Opaque token value
    pub value: String,

    /// Absolute expiry on the runtime clock
    pub expires_at: Instant,

    /// Public id of the agent this token was issued for
    pub agent_public_id: String,
}

impl SessionToken {
    /// Build a token from an issuer grant received at `issued_at`
    pub fn from_grant(grant: TokenGrant, agent_public_id: &str, issued_at: Instant) -> Self {
        let lifetime = grant.lifetime();
        Self {
            value: grant.token,
            expires_at: issued_at + lifetime,
            agent_public_id: agent_public_id.to_string(),
        }
    }

    /// Whether the token can still be used at `now`
    ///
    /// A token within `safety_window` of its expiry is treated as expired so
    /// that it cannot lapse in the middle of a request.
    pub fn is_usable(&self, now: Instant, safety_window: Duration) -> bool {
        match self.expires_at.checked_sub(safety_window) {
            Some(deadline) => deadline > now,
            None => false,
        }
    }
}

/// Response of `POST /agents/{agentId}/session-token`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Token value
    pub token: String,

    /// Lifetime in seconds; any JSON number is accepted
    pub expires_in: f64,
}

/// Longest token lifetime honoured; larger grants are clamped
const MAX_TOKEN_LIFETIME_SECS: f64 = 30.0 * 24.0 * 3600.0;

impl TokenGrant {
    /// Lifetime as a duration, clamped to `0..=30 days`
    ///
    /// Negative, NaN and infinite values count as already expired.
    pub fn lifetime(&self) -> Duration {
        if !self.expires_in.is_finite() || self.expires_in <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.expires_in.min(MAX_TOKEN_LIFETIME_SECS))
    }
}

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Where a conversation message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    /// Synthesized by the automatic preview
    Preview,
    /// Typed by the operator, or a reply to such a message
    Real,
}

/// A single message in the builder's conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    /// Unique message id (`preview-user-<uuid>`, `assistant-<uuid>`, ...)
    pub id: String,

    /// Preview or real
    pub origin: MessageOrigin,

    /// Author role
    pub role: MessageRole,

    /// Message text
    pub content: String,

    /// Free-form annotations (user intelligence, sentiment, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

impl ConversationMessage {
    fn build(prefix: &str, origin: MessageOrigin, role: MessageRole, content: String) -> Self {
        Self {
            id: format!("{}-{}", prefix, uuid::Uuid::new_v4()),
            origin,
            role,
            content,
            metadata: serde_json::Map::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Synthetic user prompt of a preview round
    pub fn preview_user(content: impl Into<String>) -> Self {
        Self::build("preview-user", MessageOrigin::Preview, MessageRole::User, content.into())
    }

    /// Assistant reply of a preview round
    pub fn preview_assistant(content: impl Into<String>) -> Self {
        Self::build(
            "preview-assistant",
            MessageOrigin::Preview,
            MessageRole::Assistant,
            content.into(),
        )
    }

    /// Assistant bubble explaining that the preview failed
    pub fn preview_error(content: impl Into<String>) -> Self {
        Self::build(
            "preview-error",
            MessageOrigin::Preview,
            MessageRole::Assistant,
            content.into(),
        )
    }

    /// Message typed by the operator
    pub fn user(content: impl Into<String>) -> Self {
        Self::build("user", MessageOrigin::Real, MessageRole::User, content.into())
    }

    /// Assistant reply to an operator message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build("assistant", MessageOrigin::Real, MessageRole::Assistant, content.into())
    }

    /// Inline error bubble on the manual chat path
    pub fn error(content: impl Into<String>) -> Self {
        Self::build("error", MessageOrigin::Real, MessageRole::Assistant, content.into())
    }

    /// Copy the annotations of a chat response into this message
    pub fn with_customer_context(mut self, context: Option<&CustomerContext>) -> Self {
        if let Some(ctx) = context {
            for (key, value) in [
                ("escalation", &ctx.escalation),
                ("sentiment", &ctx.sentiment),
                ("userIntelligence", &ctx.user_intelligence),
            ] {
                if let Some(value) = value {
                    self.metadata.insert(key.to_string(), value.clone());
                }
            }
        }
        self
    }

    /// Whether this message counts as real user activity
    pub fn is_real_user(&self) -> bool {
        self.role == MessageRole::User && self.origin == MessageOrigin::Real
    }
}

/// Extra context sent with a chat message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Marks a non-billed builder preview turn
    #[serde(default)]
    pub preview: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    #[serde(default)]
    pub document_count: usize,

    #[serde(default)]
    pub web_search: bool,
}

/// Body of `POST /chat/{agentPublicId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// Public id of the agent being addressed
    pub agent_id: String,

    pub visitor_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_context: Option<SessionContext>,
}

/// Annotations derived by the backend about the visitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_intelligence: Option<serde_json::Value>,
}

/// Response of `POST /chat/{agentPublicId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Assistant reply text
    pub response: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_context: Option<CustomerContext>,

    /// Model that produced the reply
    #[serde(default)]
    pub model: String,

    /// Provider token usage, passed through untouched
    #[serde(default)]
    pub usage: serde_json::Value,
}

impl ChatResponse {
    /// Plain text response without annotations
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            conversation_id: None,
            customer_context: None,
            model: String::new(),
            usage: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_prefixes() {
        assert!(ConversationMessage::preview_user("hi").id.starts_with("preview-user-"));
        assert!(ConversationMessage::preview_assistant("hi")
            .id
            .starts_with("preview-assistant-"));
        assert!(ConversationMessage::user("hi").id.starts_with("user-"));
        assert!(ConversationMessage::assistant("hi").id.starts_with("assistant-"));
    }

    #[test]
    fn test_is_real_user() {
        assert!(ConversationMessage::user("hello").is_real_user());
        assert!(!ConversationMessage::preview_user("hello").is_real_user());
        assert!(!ConversationMessage::assistant("hello").is_real_user());
        assert!(!ConversationMessage::error("oops").is_real_user());
    }

    #[test]
    fn test_visitor_ids() {
        let agent = AgentContext::new(42, "pub-abc");
        assert_eq!(agent.preview_visitor_id(), "builder-preview-42");
        assert_eq!(agent.test_visitor_id(), "builder-test-42");
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_usable_respects_safety_window() {
        let now = Instant::now();
        let token = SessionToken::from_grant(
            TokenGrant {
                token: "t".to_string(),
                expires_in: 10.0,
            },
            "pub-abc",
            now,
        );
        let window = Duration::from_millis(5000);

        assert!(token.is_usable(now, window));
        assert!(token.is_usable(now + Duration::from_millis(4999), window));
        assert!(!token.is_usable(now + Duration::from_millis(5000), window));
        assert!(!token.is_usable(now + Duration::from_secs(11), window));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_shorter_than_window_is_never_usable() {
        let now = Instant::now();
        let token = SessionToken::from_grant(
            TokenGrant {
                token: "t".to_string(),
                expires_in: 3.0,
            },
            "pub-abc",
            now,
        );
        assert!(!token.is_usable(now, Duration::from_millis(5000)));
    }

    #[test]
    fn test_token_grant_accepts_any_json_number() {
        let grant: TokenGrant =
            serde_json::from_str(r#"{"token":"t","expires_in":3600.0}"#).unwrap();
        assert_eq!(grant.lifetime(), Duration::from_secs(3600));

        let grant: TokenGrant = serde_json::from_str(r#"{"token":"t","expires_in":90}"#).unwrap();
        assert_eq!(grant.lifetime(), Duration::from_secs(90));

        let grant: TokenGrant = serde_json::from_str(r#"{"token":"t","expires_in":1.5}"#).unwrap();
        assert_eq!(grant.lifetime(), Duration::from_millis(1500));
    }

    #[test]
    fn test_token_grant_lifetime_is_clamped() {
        let grant = |expires_in: f64| TokenGrant {
            token: "t".to_string(),
            expires_in,
        };
        assert_eq!(grant(-5.0).lifetime(), Duration::ZERO);
        assert_eq!(grant(f64::NAN).lifetime(), Duration::ZERO);
        assert_eq!(grant(f64::INFINITY).lifetime(), Duration::ZERO);
        assert_eq!(grant(1e300).lifetime(), Duration::from_secs(30 * 24 * 3600));
    }

    #[test]
    fn test_chat_request_skips_empty_fields() {
        let req = ChatRequest {
            message: "hello".to_string(),
            conversation_id: None,
            agent_id: "pub-abc".to_string(),
            visitor_id: "builder-test-1".to_string(),
            session_context: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"agent_id\":\"pub-abc\""));
        assert!(!json.contains("conversation_id"));
        assert!(!json.contains("session_context"));
    }

    #[test]
    fn test_preview_session_context_serialization() {
        let ctx = SessionContext {
            preview: true,
            domain_category: Some("real_estate".to_string()),
            persona: Some("sales_rep".to_string()),
            document_count: 2,
            web_search: false,
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["preview"], true);
        assert_eq!(json["persona"], "sales_rep");
        assert_eq!(json["document_count"], 2);
    }

    #[test]
    fn test_chat_response_minimal_body() {
        let resp: ChatResponse = serde_json::from_str(r#"{"response": "Hi there"}"#).unwrap();
        assert_eq!(resp.response, "Hi there");
        assert!(resp.conversation_id.is_none());
        assert!(resp.customer_context.is_none());
        assert!(resp.usage.is_null());
    }

    #[test]
    fn test_customer_context_copied_to_metadata() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{
                "response": "Sure",
                "conversation_id": "conv-1",
                "customer_context": {
                    "sentiment": "positive",
                    "user_intelligence": {"intent": "pricing"}
                },
                "model": "gpt-4o-mini",
                "usage": {"total_tokens": 12}
            }"#,
        )
        .unwrap();

        let msg = ConversationMessage::assistant(&resp.response)
            .with_customer_context(resp.customer_context.as_ref());
        assert_eq!(msg.metadata["sentiment"], "positive");
        assert_eq!(msg.metadata["userIntelligence"]["intent"], "pricing");
        assert!(!msg.metadata.contains_key("escalation"));
    }
}
