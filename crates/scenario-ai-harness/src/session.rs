use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Configuration used to create a `Session`.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Human-readable session name, used in logs.
    pub name: String,
    /// Key used to serialize overlapping requests. Defaults to the session id.
    pub conversation_key: Option<String>,
}

impl SessionConfig {
    /// Creates a named session config.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conversation_key: None,
        }
    }

    /// Requests sharing a conversation key run one at a time.
    pub fn conversation_key(mut self, key: impl Into<String>) -> Self {
        self.conversation_key = Some(key.into());
        self
    }
}

/// Per-game-session state passed into every request.
///
/// Clones share the same state, so a session can be handed to concurrent
/// tasks (timers, proactive NPC chat, user actions).
#[derive(Clone, Debug)]
pub struct Session {
    session_id: uuid::Uuid,
    config: SessionConfig,
    conversation_key: String,
    offline_notice_shown: Arc<AtomicBool>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let session_id = uuid::Uuid::new_v4();
        let conversation_key = config
            .conversation_key
            .clone()
            .unwrap_or_else(|| session_id.to_string());
        Self {
            session_id,
            config,
            conversation_key,
            offline_notice_shown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle to the same session bound to another conversation.
    ///
    /// Requests made through the handle are serialized against `key` only, so
    /// a proactive NPC chat and a scenario request can overlap. Session id and
    /// offline-notice state stay shared.
    pub fn for_conversation(&self, key: impl Into<String>) -> Session {
        Session {
            conversation_key: key.into(),
            ..self.clone()
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.session_id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Key that serializes requests. Defaults to the session id.
    pub fn conversation_key(&self) -> &str {
        &self.conversation_key
    }

    /// True once the offline notice has been surfaced in this session.
    pub fn offline_notice_shown(&self) -> bool {
        self.offline_notice_shown.load(Ordering::SeqCst)
    }

    /// Marks the offline notice as shown; returns true only for the first caller.
    pub(crate) fn claim_offline_notice(&self) -> bool {
        !self.offline_notice_shown.swap(true, Ordering::SeqCst)
    }
}
