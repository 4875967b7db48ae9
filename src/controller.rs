//! Agent preview session controller
//!
//! Drives the live preview next to the agent builder:
//!
//! - every configuration change is fingerprinted; a new fingerprint arms a
//!   debounce timer and only the last change in a burst is previewed
//! - when the timer fires, a session token is ensured and a synthetic prompt
//!   describing the configuration is sent; the reply replaces the log
//! - the first real operator message suspends automatic previews until the
//!   chat is cleared, and any preview reply still in flight is discarded
//!
//! All state sits behind one mutex that is never held across an await, so
//! the real-activity check and the commit of a preview round are atomic
//! with respect to `send_message`.

use crate::config::PreviewConfig;
use crate::conversation::ConversationLog;
use crate::debounce::Debouncer;
use crate::error::{PreviewError, Result};
use crate::lock;
use crate::provider::{ChatTransport, TokenIssuer};
use crate::snapshot::ConfigurationSnapshot;
use crate::token::TokenCache;
use crate::types::{AgentContext, ChatRequest, ChatResponse, ConversationMessage, SessionContext};
use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;

/// Bubble shown when a manual test message fails
const MANUAL_SEND_FAILED: &str = "The agent could not reply right now. Please try again.";

/// Where the automatic preview currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PreviewState {
    /// Nothing previewed yet
    Idle,
    /// Timer pending
    Armed,
    /// Preview request in flight
    Running,
    /// Log reflects the settled fingerprint
    Settled,
    /// Real conversation started; no more automatic previews
    Suspended,
}

/// Lifecycle events for observers (UI, logs, tests)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewEvent {
    /// Debounce timer (re)started
    Armed { fingerprint: String },
    /// Pending timer cleared without side effects
    Cancelled { fingerprint: String },
    /// Preview request sent
    Started { fingerprint: String },
    /// Preview round committed to the log
    Settled { fingerprint: String },
    /// Preview failed; an error bubble was shown if allowed
    Failed { fingerprint: String, error: String },
    /// Preview reply dropped because it was superseded or real activity began
    Discarded { fingerprint: String },
    /// Automatic previews stopped for this session
    Suspended,
}

struct Shared {
    state: PreviewState,
    agent: Option<AgentContext>,

    /// Public id of the last loaded agent; survives the agent being unloaded
    session_agent: Option<String>,

    log: ConversationLog,
    debouncer: Debouncer,

    /// Snapshot waiting on the pending timer
    armed: Option<ConfigurationSnapshot>,

    /// Fingerprint whose preview round the log shows
    settled: Option<String>,

    /// Fingerprint of the preview request in flight
    attempted: Option<String>,

    /// Id of the newest preview round started; older replies are stale
    round: u64,

    /// Bumped by `clear_chat` so manual replies from before the clear are dropped
    chat_epoch: u64,

    /// Backend conversation id for manual messages
    conversation_id: Option<String>,
}

impl Shared {
    /// State to fall back to once nothing is pending or in flight
    fn resting_state(&self) -> PreviewState {
        if self.log.has_real_activity() {
            PreviewState::Suspended
        } else if self.debouncer.is_armed() {
            PreviewState::Armed
        } else if self.attempted.is_some() {
            PreviewState::Running
        } else if self.settled.is_some() {
            PreviewState::Settled
        } else {
            PreviewState::Idle
        }
    }

    /// Fingerprint the log will reflect once in-flight work lands
    fn target_fingerprint(&self) -> Option<&str> {
        self.attempted.as_deref().or(self.settled.as_deref())
    }
}

struct Inner {
    config: PreviewConfig,
    tokens: TokenCache,
    transport: Arc<dyn ChatTransport>,
    shared: Mutex<Shared>,
    events: broadcast::Sender<PreviewEvent>,
}

impl Inner {
    fn emit(&self, event: PreviewEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    async fn chat(&self, agent: &AgentContext, request: &ChatRequest) -> Result<ChatResponse> {
        let token = self.tokens.ensure_token(Some(agent)).await?;
        self.transport
            .send(&agent.public_id, &token.value, request)
            .await
            .map_err(|e| match e {
                PreviewError::ChatTransport(_) => e,
                other => PreviewError::ChatTransport(other.to_string()),
            })
    }

    /// Body of a fired debounce timer
    async fn run_preview(self: Arc<Self>, generation: u64) {
        let (agent, snapshot, fingerprint, round) = {
            let mut shared = lock(&self.shared);
            if !shared.debouncer.take_if_current(generation) {
                return;
            }
            let Some(snapshot) = shared.armed.take() else {
                return;
            };
            let Some(agent) = shared.agent.clone() else {
                shared.state = shared.resting_state();
                return;
            };
            if shared.log.has_real_activity() {
                shared.state = PreviewState::Suspended;
                return;
            }
            let fingerprint = match snapshot.fingerprint() {
                Ok(fp) => fp,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to fingerprint armed snapshot");
                    shared.state = shared.resting_state();
                    return;
                }
            };

            shared.round += 1;
            shared.attempted = Some(fingerprint.clone());
            shared.state = PreviewState::Running;
            (agent, snapshot, fingerprint, shared.round)
        };

        tracing::info!(agent = %agent.public_id, fingerprint = %fingerprint, "Running preview");
        self.emit(PreviewEvent::Started {
            fingerprint: fingerprint.clone(),
        });

        let prompt = snapshot.preview_prompt();
        let request = ChatRequest {
            message: prompt.clone(),
            conversation_id: None,
            agent_id: agent.public_id.clone(),
            visitor_id: agent.preview_visitor_id(),
            session_context: Some(SessionContext {
                preview: true,
                domain_category: snapshot.domain_category.clone(),
                persona: snapshot.persona.clone(),
                document_count: snapshot.document_count(),
                web_search: snapshot.web_search,
            }),
        };
        let result = self.chat(&agent, &request).await;

        let mut shared = lock(&self.shared);
        if shared.round != round {
            // Superseded by a newer round, a chat clear or an agent switch
            drop(shared);
            tracing::debug!(fingerprint = %fingerprint, "Dropping stale preview reply");
            self.emit(PreviewEvent::Discarded { fingerprint });
            return;
        }
        shared.attempted = None;

        if shared.log.has_real_activity() {
            shared.state = PreviewState::Suspended;
            drop(shared);
            tracing::debug!(fingerprint = %fingerprint, "Real activity during preview, discarding reply");
            self.emit(PreviewEvent::Discarded { fingerprint });
            return;
        }

        match result {
            Ok(response) => {
                let user = ConversationMessage::preview_user(prompt);
                let assistant = ConversationMessage::preview_assistant(response.response)
                    .with_customer_context(response.customer_context.as_ref());
                shared.log.replace_with_preview_round(user, assistant);
                shared.settled = Some(fingerprint.clone());
                shared.state = shared.resting_state();
                drop(shared);

                tracing::info!(fingerprint = %fingerprint, model = %response.model, "Preview settled");
                self.emit(PreviewEvent::Settled { fingerprint });
            }
            Err(e) => {
                shared
                    .log
                    .append_preview_error(ConversationMessage::preview_error(e.user_message()));
                shared.settled = Some(fingerprint.clone());
                shared.state = shared.resting_state();
                drop(shared);

                tracing::warn!(fingerprint = %fingerprint, error = %e, "Preview failed");
                self.emit(PreviewEvent::Failed {
                    fingerprint,
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Preview session for one agent builder view
///
/// Dropping the controller cancels any pending preview timer.
pub struct PreviewController {
    inner: Arc<Inner>,
}

impl PreviewController {
    /// Create a controller backed by one service acting as issuer and transport
    pub fn new<B>(config: PreviewConfig, backend: B) -> Self
    where
        B: TokenIssuer + ChatTransport + 'static,
    {
        let backend = Arc::new(backend);
        Self::with_parts(config, backend.clone(), backend)
    }

    /// Create a controller from separate issuer and transport
    pub fn with_parts(
        config: PreviewConfig,
        issuer: Arc<dyn TokenIssuer>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Shared {
            state: PreviewState::Idle,
            agent: None,
            session_agent: None,
            log: ConversationLog::new(),
            debouncer: Debouncer::new(config.quiet_period()),
            armed: None,
            settled: None,
            attempted: None,
            round: 0,
            chat_epoch: 0,
            conversation_id: None,
        };

        Self {
            inner: Arc::new(Inner {
                tokens: TokenCache::new(issuer, config.token_safety_window()),
                transport,
                config,
                shared: Mutex::new(shared),
                events,
            }),
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.inner.config
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.inner.tokens
    }

    /// Set or clear the loaded agent
    ///
    /// `None` (agent unavailable) cancels any pending timer. Loading an
    /// agent other than the last one loaded, even with an unloaded gap in
    /// between, drops its session token and starts a fresh session.
    pub fn set_agent(&self, agent: Option<AgentContext>) {
        let inner = &self.inner;
        inner
            .tokens
            .bind_agent(agent.as_ref().map(|a| a.public_id.as_str()));

        let mut shared = lock(&inner.shared);
        let previous = shared.agent.as_ref().map(|a| a.public_id.clone());
        let next = agent.as_ref().map(|a| a.public_id.clone());
        shared.agent = agent;

        let cancelled = shared.debouncer.pending_key().map(str::to_string);
        match &next {
            None => {
                shared.debouncer.cancel();
                shared.armed = None;
            }
            Some(id) => {
                let switched = shared
                    .session_agent
                    .as_deref()
                    .map_or(false, |last| last != id.as_str());
                if switched {
                    reset_session(&mut shared);
                }
                shared.session_agent = Some(id.clone());
            }
        }
        // Reloading the same agent keeps its pending timer
        let cancelled = cancelled.filter(|_| !shared.debouncer.is_armed());
        shared.state = shared.resting_state();
        drop(shared);

        if previous != next {
            tracing::info!(from = ?previous, to = ?next, "Preview agent changed");
        }
        if let Some(fingerprint) = cancelled {
            inner.emit(PreviewEvent::Cancelled { fingerprint });
        }
    }

    /// Feed the current builder configuration
    ///
    /// Returns `true` if a preview timer was (re)armed. Ignored while no
    /// agent is loaded, after real activity, or when the fingerprint is the
    /// one already armed or shown.
    pub fn configuration_changed(&self, snapshot: ConfigurationSnapshot) -> Result<bool> {
        let fingerprint = snapshot.fingerprint()?;
        let inner = &self.inner;
        let mut shared = lock(&inner.shared);

        if shared.log.has_real_activity() {
            shared.state = PreviewState::Suspended;
            return Ok(false);
        }
        if shared.agent.is_none() {
            tracing::debug!(fingerprint = %fingerprint, "Agent not loaded, skipping preview");
            return Ok(false);
        }
        if shared.debouncer.pending_key() == Some(fingerprint.as_str()) {
            return Ok(false);
        }
        if shared.target_fingerprint() == Some(fingerprint.as_str()) {
            // Back to what is already shown or in flight
            let cancelled = shared.debouncer.pending_key().map(str::to_string);
            shared.debouncer.cancel();
            shared.armed = None;
            shared.state = shared.resting_state();
            drop(shared);
            if let Some(fingerprint) = cancelled {
                inner.emit(PreviewEvent::Cancelled { fingerprint });
            }
            return Ok(false);
        }

        let weak: Weak<Inner> = Arc::downgrade(inner);
        shared.debouncer.arm(fingerprint.clone(), move |generation| async move {
            if let Some(inner) = weak.upgrade() {
                inner.run_preview(generation).await;
            }
        });
        shared.armed = Some(snapshot);
        shared.state = PreviewState::Armed;
        drop(shared);

        tracing::debug!(fingerprint = %fingerprint, "Preview armed");
        inner.emit(PreviewEvent::Armed { fingerprint });
        Ok(true)
    }

    /// Clear any pending preview timer without side effects
    ///
    /// Used when the view is left or the preview step is hidden.
    pub fn cancel_pending(&self) -> bool {
        let mut shared = lock(&self.inner.shared);
        let Some(fingerprint) = shared.debouncer.pending_key().map(str::to_string) else {
            return false;
        };
        shared.debouncer.cancel();
        shared.armed = None;
        shared.state = shared.resting_state();
        drop(shared);

        tracing::debug!(fingerprint = %fingerprint, "Pending preview cancelled");
        self.inner.emit(PreviewEvent::Cancelled { fingerprint });
        true
    }

    /// Send a real test message typed by the operator
    ///
    /// Suspends automatic previews immediately. On failure an inline error
    /// bubble is appended and the error is returned.
    pub async fn send_message(&self, text: &str) -> Result<ConversationMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PreviewError::EmptyMessage);
        }

        let inner = &self.inner;
        let (agent, conversation_id, epoch, cancelled, suspended) = {
            let mut shared = lock(&inner.shared);
            let agent = shared.agent.clone().ok_or(PreviewError::NotReady)?;

            shared.log.append_real(ConversationMessage::user(text));
            let cancelled = shared.debouncer.pending_key().map(str::to_string);
            shared.debouncer.cancel();
            shared.armed = None;
            let suspended = shared.state != PreviewState::Suspended;
            shared.state = PreviewState::Suspended;

            (agent, shared.conversation_id.clone(), shared.chat_epoch, cancelled, suspended)
        };

        if let Some(fingerprint) = cancelled {
            inner.emit(PreviewEvent::Cancelled { fingerprint });
        }
        if suspended {
            tracing::info!(agent = %agent.public_id, "Real conversation started, automatic preview suspended");
            inner.emit(PreviewEvent::Suspended);
        }

        let request = ChatRequest {
            message: text.to_string(),
            conversation_id,
            agent_id: agent.public_id.clone(),
            visitor_id: agent.test_visitor_id(),
            session_context: None,
        };
        let result = inner.chat(&agent, &request).await;

        let mut shared = lock(&inner.shared);
        let current = shared.chat_epoch == epoch;
        match result {
            Ok(response) => {
                let message = ConversationMessage::assistant(response.response)
                    .with_customer_context(response.customer_context.as_ref());
                if current {
                    if response.conversation_id.is_some() {
                        shared.conversation_id = response.conversation_id;
                    }
                    shared.log.append_real(message.clone());
                }
                Ok(message)
            }
            Err(e) => {
                if current {
                    shared.log.append_real(ConversationMessage::error(MANUAL_SEND_FAILED));
                }
                drop(shared);
                tracing::warn!(agent = %agent.public_id, error = %e, "Test message failed");
                Err(e)
            }
        }
    }

    /// Clear the conversation and re-enable automatic previews
    ///
    /// The next configuration change arms a preview again, even if it
    /// matches the configuration previewed before the clear.
    pub fn clear_chat(&self) {
        let mut shared = lock(&self.inner.shared);
        let cancelled = shared.debouncer.pending_key().map(str::to_string);
        reset_session(&mut shared);
        shared.state = PreviewState::Idle;
        drop(shared);

        tracing::debug!("Chat cleared");
        if let Some(fingerprint) = cancelled {
            self.inner.emit(PreviewEvent::Cancelled { fingerprint });
        }
    }

    pub fn state(&self) -> PreviewState {
        lock(&self.inner.shared).state
    }

    pub fn agent(&self) -> Option<AgentContext> {
        lock(&self.inner.shared).agent.clone()
    }

    pub fn messages(&self) -> Vec<ConversationMessage> {
        lock(&self.inner.shared).log.messages().to_vec()
    }

    pub fn has_real_activity(&self) -> bool {
        lock(&self.inner.shared).log.has_real_activity()
    }

    /// Fingerprint of the configuration the log currently previews
    pub fn settled_fingerprint(&self) -> Option<String> {
        lock(&self.inner.shared).settled.clone()
    }

    /// Backend conversation id of the manual chat
    pub fn conversation_id(&self) -> Option<String> {
        lock(&self.inner.shared).conversation_id.clone()
    }
}

/// Forget everything tied to the current conversation
fn reset_session(shared: &mut Shared) {
    shared.debouncer.cancel();
    shared.armed = None;
    shared.log.reset();
    shared.settled = None;
    shared.attempted = None;
    shared.conversation_id = None;
    shared.round += 1;
    shared.chat_epoch += 1;
}
