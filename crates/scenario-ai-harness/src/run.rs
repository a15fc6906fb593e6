use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};

use crate::errors::{HarnessError, ProviderError};
use crate::fallback::{OFFLINE_NOTICE, fallback_payload, fallback_text};
use crate::ingest::{Accumulator, EmissionMode, Recovery};
use crate::intent::{Intent, IntentPayload};
use crate::orchestrator::SingleFlight;
use crate::provider::{ChatRequest, ChatTransport};
use crate::session::Session;
use crate::stream::{FragmentSource, StreamEvent};

/// Final text of a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    /// Best-known full text after folding every fragment.
    pub text: String,
    /// Where the final text came from.
    pub source: FragmentSource,
    /// Number of fragments received.
    pub fragments: u64,
}

/// Streaming handle returned by `Orchestrator::request`.
///
/// Owns the accumulator for this call: every fragment read through
/// `next_event()` is folded into the best-known full text.
pub struct RunStream {
    run_id: uuid::Uuid,
    session_id: uuid::Uuid,
    last_message: String,
    rx: mpsc::Receiver<StreamEvent>,
    accumulator: Accumulator,
    recovery: Recovery,
    source: Option<FragmentSource>,
    saw_terminal: bool,
}

impl RunStream {
    pub(crate) fn new(
        run_id: uuid::Uuid,
        session_id: uuid::Uuid,
        last_message: String,
        rx: mpsc::Receiver<StreamEvent>,
        recovery: Recovery,
    ) -> Self {
        Self {
            run_id,
            session_id,
            last_message,
            rx,
            accumulator: Accumulator::new(),
            recovery,
            source: None,
            saw_terminal: false,
        }
    }

    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Best-known full text so far.
    pub fn text(&self) -> &str {
        self.accumulator.text()
    }

    /// Intent of the last message in the request history.
    pub fn intent(&self) -> Intent {
        Intent::classify(&self.last_message)
    }

    /// Waits for and returns the next event, folding fragments into the buffer.
    ///
    /// Returns `None` after the channel is closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.rx.recv().await;
        match &event {
            Some(StreamEvent::Fragment { text, source, .. }) => {
                if self.accumulator.push(text) == EmissionMode::Snapshot {
                    debug!(run_id = %self.run_id, "fragment replaced buffered text");
                }
                self.source = Some(*source);
            }
            Some(StreamEvent::Completed { source, .. }) => {
                self.source = Some(*source);
                self.saw_terminal = true;
            }
            _ => {}
        }
        event
    }

    /// Drains the stream and returns the accumulated text.
    pub async fn finish(mut self) -> Result<RunOutcome, HarnessError> {
        while !self.saw_terminal {
            if self.next_event().await.is_none() {
                break;
            }
        }
        let source = match (self.saw_terminal, self.source) {
            (true, Some(source)) => source,
            _ => {
                return Err(HarnessError::protocol_msg(format!(
                    "run {} ended without completion",
                    self.run_id
                )));
            }
        };
        let fragments = self.accumulator.fragment_count();
        Ok(RunOutcome {
            text: self.accumulator.into_text(),
            source,
            fragments,
        })
    }

    /// Drains the stream and recovers a JSON value from the text.
    pub async fn finish_structured(self) -> Result<serde_json::Value, HarnessError> {
        let recovery = self.recovery.clone();
        let outcome = self.finish().await?;
        Ok(recovery.recover(&outcome.text)?)
    }

    /// Like `finish_structured`, but replaces a recovery failure with the
    /// canned payload for the request's intent.
    pub async fn finish_structured_or_fallback(self) -> Result<serde_json::Value, HarnessError> {
        let intent = self.intent();
        let run_id = self.run_id;
        match self.finish_structured().await {
            Err(HarnessError::Recovery(err)) => {
                warn!(run_id = %run_id, %intent, error = %err, "using fallback payload");
                fallback_payload(intent)
                    .to_value()
                    .map_err(|e| HarnessError::protocol_msg(format!("fallback serialization: {e}")))
            }
            other => other,
        }
    }

    /// Drains the stream and decodes the typed payload for the request's intent.
    ///
    /// Text that cannot be recovered or does not match the intent's schema is
    /// replaced by the canned payload.
    pub async fn finish_payload(self) -> Result<IntentPayload, HarnessError> {
        let intent = self.intent();
        let run_id = self.run_id;
        let value = match self.finish_structured().await {
            Ok(value) => value,
            Err(HarnessError::Recovery(err)) => {
                warn!(run_id = %run_id, %intent, error = %err, "using fallback payload");
                return Ok(fallback_payload(intent).clone());
            }
            Err(err) => return Err(err),
        };
        match IntentPayload::decode(intent, value) {
            Ok(payload) => Ok(payload),
            Err(err) => {
                warn!(run_id = %run_id, %intent, error = %err, "payload shape mismatch, using fallback");
                Ok(fallback_payload(intent).clone())
            }
        }
    }
}

pub(crate) struct RunTask {
    pub transport: Arc<dyn ChatTransport>,
    pub request: ChatRequest,
    pub session: Session,
    pub single_flight: SingleFlight,
    pub tx: mpsc::Sender<StreamEvent>,
}

impl RunTask {
    pub(crate) async fn run(self) {
        let key = self.session.conversation_key().to_string();
        let guard = self.single_flight.acquire(&key).await;
        self.drive(guard).await;
        self.single_flight.release(&key);
    }

    async fn drive(&self, _guard: OwnedMutexGuard<()>) {
        let run_id = self.request.run_id;
        let started = StreamEvent::Started {
            run_id,
            session_id: self.session.id(),
            model: self.request.config.model.clone(),
        };
        if !self.send(started).await {
            return;
        }

        let mut seq = 0_u64;
        let stream_error = match self.transport.stream_chat(&self.request).await {
            Ok(mut stream) => loop {
                tokio::select! {
                    _ = self.tx.closed() => {
                        debug!(run_id = %run_id, "run stream receiver dropped");
                        return;
                    }
                    next = stream.next() => match next {
                        Some(Ok(text)) => {
                            if text.is_empty() {
                                continue;
                            }
                            if !self.fragment(&mut seq, text, FragmentSource::Stream).await {
                                return;
                            }
                        }
                        Some(Err(err)) => break err,
                        None => {
                            self.complete(FragmentSource::Stream).await;
                            return;
                        }
                    }
                }
            },
            Err(err) => err,
        };

        warn!(
            run_id = %run_id,
            transport = self.transport.name(),
            error = %stream_error,
            fragments = seq,
            "stream failed, falling back to non-streaming request"
        );
        match self.transport.complete_chat(&self.request).await {
            Ok(text) => {
                if self.fragment(&mut seq, text, FragmentSource::NonStreaming).await {
                    self.complete(FragmentSource::NonStreaming).await;
                }
            }
            Err(err) => self.offline(&mut seq, err).await,
        }
    }

    async fn offline(&self, seq: &mut u64, err: ProviderError) {
        let run_id = self.request.run_id;
        let intent = Intent::classify(self.request.history.last_content());
        warn!(run_id = %run_id, error = %err, %intent, "request failed, using offline fallback");
        if self.session.claim_offline_notice() {
            info!(session = self.session.name(), "switched to offline simulation mode");
            let notice = StreamEvent::OfflineNotice {
                run_id,
                message: OFFLINE_NOTICE.to_string(),
            };
            if !self.send(notice).await {
                return;
            }
        }
        let source = FragmentSource::Fallback(intent);
        if self.fragment(seq, fallback_text(intent).to_string(), source).await {
            self.complete(source).await;
        }
    }

    async fn fragment(&self, seq: &mut u64, text: String, source: FragmentSource) -> bool {
        let event = StreamEvent::Fragment {
            run_id: self.request.run_id,
            seq: *seq,
            text,
            source,
        };
        *seq = seq.saturating_add(1);
        self.send(event).await
    }

    async fn complete(&self, source: FragmentSource) {
        let run_id = self.request.run_id;
        debug!(run_id = %run_id, ?source, "run completed");
        let _ = self.send(StreamEvent::Completed { run_id, source }).await;
    }

    async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}
