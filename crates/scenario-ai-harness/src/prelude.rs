//! Common imports for typical usage.
//!
//! Re-exports the request, event and recovery types most callers need.
pub use crate::{
    ChatMessage, ConnectionConfig, Conversation, FragmentSource, HarnessError, Intent,
    IntentPayload, Orchestrator, OrchestratorBuilder, RecoveryError, RunOutcome, RunStream,
    Session, SessionConfig, StreamEvent,
};
