use std::pin::Pin;

use crate::config::ConnectionConfig;
use crate::conversation::Conversation;
use crate::errors::ProviderError;

/// Lazy, finite, single-consumer sequence of text fragments from a transport.
pub type FragmentStream =
    Pin<Box<dyn futures::Stream<Item = Result<String, ProviderError>> + Send + 'static>>;

/// Request passed from the orchestrator to a transport.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub run_id: uuid::Uuid,
    pub config: ConnectionConfig,
    pub history: Conversation,
}

/// Contract implemented by chat endpoints.
///
/// Transports only move text; fallback policy lives in the orchestrator.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Opens a streaming completion. Errors may occur at connect time or
    /// mid-stream as `Err` items.
    async fn stream_chat(&self, req: &ChatRequest) -> Result<FragmentStream, ProviderError>;

    /// Issues a single non-streaming completion and returns its full text.
    async fn complete_chat(&self, req: &ChatRequest) -> Result<String, ProviderError>;
}
