use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::conversation::Conversation;
use crate::errors::HarnessError;
use crate::ingest::Recovery;
use crate::provider::{ChatRequest, ChatTransport};
use crate::run::{RunStream, RunTask};
use crate::session::Session;

const DEFAULT_STREAM_BUFFER_CAPACITY: usize = 128;
const NOT_CONFIGURED: &str = "Please configure LLM settings first.";

/// Per-conversation mutual exclusion for in-flight requests.
#[derive(Clone, Default)]
pub(crate) struct SingleFlight {
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = Arc::clone(&self.slots.entry(key.to_string()).or_default());
        slot.lock_owned().await
    }

    /// Drops the slot for `key` once no request holds or awaits it.
    pub(crate) fn release(&self, key: &str) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Entry point: turns a conversation into a stream of text fragments with
/// transport fallbacks and offline content.
#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn ChatTransport>,
    config: Option<ConnectionConfig>,
    recovery: Recovery,
    stream_buffer_capacity: usize,
    single_flight: SingleFlight,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Current connection configuration, if any.
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// Replaces the connection configuration used by later requests.
    pub fn set_config(&mut self, config: Option<ConnectionConfig>) {
        self.config = config;
    }

    /// Starts a request for `history` and returns its event stream.
    ///
    /// Fails fast, without touching the transport, when no usable connection
    /// configuration is set. Once started, the stream always ends with text:
    /// streamed, retried without streaming, or canned for the last message's
    /// intent. Requests sharing the session's conversation key run one at a
    /// time.
    pub async fn request(
        &self,
        session: &Session,
        history: impl Into<Conversation>,
    ) -> Result<RunStream, HarnessError> {
        let config = match &self.config {
            Some(config) if config.is_configured() => config.clone(),
            _ => return Err(HarnessError::Config(NOT_CONFIGURED.to_string())),
        };
        let history = history.into();
        if history.is_empty() {
            return Err(HarnessError::Validation(
                "request requires at least one message".into(),
            ));
        }

        let run_id = uuid::Uuid::new_v4();
        let last_message = history.last_content().to_string();
        info!(
            run_id = %run_id,
            session = session.name(),
            transport = self.transport.name(),
            model = %config.model,
            messages = history.len(),
            "starting request"
        );

        let (tx, rx) = mpsc::channel(self.stream_buffer_capacity);
        let task = RunTask {
            transport: Arc::clone(&self.transport),
            request: ChatRequest {
                run_id,
                config,
                history,
            },
            session: session.clone(),
            single_flight: self.single_flight.clone(),
            tx,
        };
        tokio::spawn(task.run());
        debug!(run_id = %run_id, "request task spawned");

        Ok(RunStream::new(
            run_id,
            session.id(),
            last_message,
            rx,
            self.recovery.clone(),
        ))
    }
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    transport: Option<Arc<dyn ChatTransport>>,
    config: Option<ConnectionConfig>,
    recovery: Option<Recovery>,
    stream_buffer_capacity: Option<usize>,
}

impl OrchestratorBuilder {
    pub fn transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// `None` leaves the orchestrator unconfigured; every request then fails
    /// with a configuration error.
    pub fn config(mut self, config: Option<ConnectionConfig>) -> Self {
        self.config = config;
        self
    }

    /// Recovery pipeline used by `RunStream::finish_structured`.
    pub fn recovery(mut self, recovery: Recovery) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<Orchestrator, HarnessError> {
        let transport = self
            .transport
            .ok_or_else(|| HarnessError::Validation("a chat transport is required".into()))?;
        let stream_buffer_capacity = self
            .stream_buffer_capacity
            .unwrap_or(DEFAULT_STREAM_BUFFER_CAPACITY);
        if stream_buffer_capacity == 0 {
            return Err(HarnessError::Validation(
                "stream buffer capacity must be > 0".into(),
            ));
        }
        Ok(Orchestrator {
            transport,
            config: self.config,
            recovery: self.recovery.unwrap_or_default(),
            stream_buffer_capacity,
            single_flight: SingleFlight::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ProviderError, RecoveryError};
    use crate::fallback::{OFFLINE_NOTICE, provide_fallback};
    use crate::intent::{Intent, IntentPayload};
    use crate::provider::FragmentStream;
    use crate::session::SessionConfig;
    use crate::stream::{FragmentSource, StreamEvent};
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone)]
    enum StreamBehavior {
        Fail(ProviderError),
        Items(Vec<Result<String, ProviderError>>),
        Pending,
    }

    struct FakeTransport {
        stream_calls: AtomicUsize,
        complete_calls: AtomicUsize,
        streams: Vec<StreamBehavior>,
        completion: Result<String, ProviderError>,
    }

    impl FakeTransport {
        fn new(streams: Vec<StreamBehavior>, completion: Result<String, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                stream_calls: AtomicUsize::new(0),
                complete_calls: AtomicUsize::new(0),
                streams,
                completion,
            })
        }

        fn streaming(items: &[&str]) -> Arc<Self> {
            let items = items.iter().map(|s| Ok(s.to_string())).collect();
            Self::new(
                vec![StreamBehavior::Items(items)],
                Err(ProviderError::transport("unused")),
            )
        }

        fn calls(&self) -> (usize, usize) {
            (
                self.stream_calls.load(Ordering::SeqCst),
                self.complete_calls.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait::async_trait]
    impl ChatTransport for FakeTransport {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn stream_chat(&self, _req: &ChatRequest) -> Result<FragmentStream, ProviderError> {
            let call = self.stream_calls.fetch_add(1, Ordering::SeqCst);
            let behavior = self
                .streams
                .get(call)
                .or_else(|| self.streams.last())
                .cloned()
                .unwrap_or(StreamBehavior::Items(vec![]));
            match behavior {
                StreamBehavior::Fail(err) => Err(err),
                StreamBehavior::Items(items) => Ok(Box::pin(stream::iter(items))),
                StreamBehavior::Pending => {
                    Ok(Box::pin(stream::pending::<Result<String, ProviderError>>()))
                }
            }
        }

        async fn complete_chat(&self, _req: &ChatRequest) -> Result<String, ProviderError> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            self.completion.clone()
        }
    }

    fn orchestrator(transport: Arc<FakeTransport>) -> Orchestrator {
        Orchestrator::builder()
            .transport(transport)
            .config(Some(ConnectionConfig::new("http://llm.test/v1", "key")))
            .build()
            .expect("build orchestrator")
    }

    fn session(name: &str) -> Session {
        Session::new(SessionConfig::named(name))
    }

    async fn drain(mut run: RunStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = run.next_event().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn builder_requires_transport_and_capacity() {
        let err = Orchestrator::builder().build().err().expect("missing transport");
        assert!(matches!(err, HarnessError::Validation(msg) if msg.contains("transport")));

        let err = Orchestrator::builder()
            .transport(FakeTransport::streaming(&[]))
            .stream_buffer_capacity(0)
            .build()
            .err()
            .expect("zero capacity");
        assert!(matches!(err, HarnessError::Validation(msg) if msg.contains("capacity")));
    }

    #[tokio::test]
    async fn missing_config_fails_without_transport_calls() {
        let fake = FakeTransport::streaming(&["{}"]);
        let orchestrator = Orchestrator::builder()
            .transport(fake.clone())
            .config(None)
            .build()
            .expect("build");
        let err = orchestrator
            .request(&session("s"), Conversation::from_user("hi"))
            .await
            .err()
            .expect("unconfigured");
        assert_eq!(err, HarnessError::Config(NOT_CONFIGURED.to_string()));

        let mut blank = orchestrator.clone();
        blank.set_config(Some(ConnectionConfig::new("  ", "key")));
        let err = blank
            .request(&session("s"), Conversation::from_user("hi"))
            .await
            .err()
            .expect("blank base url");
        assert!(matches!(err, HarnessError::Config(_)));
        assert_eq!(fake.calls(), (0, 0));
    }

    #[tokio::test]
    async fn empty_history_is_rejected() {
        let fake = FakeTransport::streaming(&[]);
        let err = orchestrator(fake.clone())
            .request(&session("s"), Conversation::new())
            .await
            .err()
            .expect("empty history");
        assert!(matches!(err, HarnessError::Validation(_)));
        assert_eq!(fake.calls(), (0, 0));
    }

    #[tokio::test]
    async fn streams_fragments_in_order_and_completes() {
        let fake = FakeTransport::streaming(&["[{\"id\":", " \"n1\"}", "]"]);
        let run = orchestrator(fake.clone())
            .request(&session("s"), Conversation::from_user("Generate 2 NPCs"))
            .await
            .expect("request");
        let events = drain(run).await;

        assert!(matches!(events.first(), Some(StreamEvent::Started { model, .. }) if model == "gpt-4o-mini"));
        let texts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Fragment { seq, text, source, .. } => {
                    assert_eq!(*source, FragmentSource::Stream);
                    Some((*seq, text.as_str()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec![(0, "[{\"id\":"), (1, " \"n1\"}"), (2, "]")]);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Completed { source: FragmentSource::Stream, .. })
        ));
        assert_eq!(fake.calls(), (1, 0));
    }

    #[tokio::test]
    async fn snapshot_stream_is_reassembled() {
        let fake = FakeTransport::streaming(&["{\"reply\":", "{\"reply\": \"ok\"", "{\"reply\": \"ok\"}"]);
        let value = orchestrator(fake)
            .request(&session("s"), Conversation::from_user("How is the team?"))
            .await
            .expect("request")
            .finish_structured()
            .await
            .expect("structured");
        assert_eq!(value, serde_json::json!({"reply": "ok"}));
    }

    #[tokio::test]
    async fn stream_start_failure_falls_back_to_single_completion() {
        let fake = FakeTransport::new(
            vec![StreamBehavior::Fail(ProviderError::provider("bad gateway", Some(502)))],
            Ok("{\"reply\": \"from retry\"}".into()),
        );
        let outcome = orchestrator(fake.clone())
            .request(&session("s"), Conversation::from_user("hello"))
            .await
            .expect("request")
            .finish()
            .await
            .expect("finish");
        assert_eq!(outcome.text, "{\"reply\": \"from retry\"}");
        assert_eq!(outcome.source, FragmentSource::NonStreaming);
        assert_eq!(fake.calls(), (1, 1));
    }

    #[tokio::test]
    async fn mid_stream_failure_retry_replaces_partial_text() {
        let fake = FakeTransport::new(
            vec![StreamBehavior::Items(vec![
                Ok("{\"reply\":".into()),
                Err(ProviderError::transport("connection reset")),
            ])],
            Ok("{\"reply\": \"complete\"}".into()),
        );
        let mut run = orchestrator(fake.clone())
            .request(&session("s"), Conversation::from_user("hello"))
            .await
            .expect("request");
        let mut sources = Vec::new();
        while let Some(event) = run.next_event().await {
            if let StreamEvent::Fragment { source, .. } = event {
                sources.push(source);
            }
        }
        assert_eq!(sources, vec![FragmentSource::Stream, FragmentSource::NonStreaming]);
        assert_eq!(run.text(), "{\"reply\": \"complete\"}");
        assert_eq!(fake.calls(), (1, 1));
    }

    #[tokio::test]
    async fn mid_stream_failure_retry_is_appended_when_it_does_not_resend_partial_text() {
        let fake = FakeTransport::new(
            vec![StreamBehavior::Items(vec![
                Ok("{\"reply\":".into()),
                Err(ProviderError::transport("connection reset")),
            ])],
            Ok("Here it is: {\"reply\": \"x\"}".into()),
        );
        let outcome = orchestrator(fake.clone())
            .request(&session("s"), Conversation::from_user("hello"))
            .await
            .expect("request")
            .finish()
            .await
            .expect("finish");
        assert_eq!(outcome.text, "{\"reply\":Here it is: {\"reply\": \"x\"}");
        assert_eq!(outcome.source, FragmentSource::NonStreaming);
        assert_eq!(outcome.fragments, 2);
        assert_eq!(fake.calls(), (1, 1));
    }

    #[tokio::test]
    async fn total_failure_uses_fallback_and_notifies_once_per_session() {
        let fake = FakeTransport::new(
            vec![StreamBehavior::Fail(ProviderError::transport("offline"))],
            Err(ProviderError::transport("still offline")),
        );
        let orchestrator = orchestrator(fake.clone());
        let session = session("game");
        let prompt = "Create a management scenario about a late delivery";

        let events = drain(
            orchestrator
                .request(&session, Conversation::from_user(prompt))
                .await
                .expect("request"),
        )
        .await;
        let notices: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::OfflineNotice { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(notices, vec![OFFLINE_NOTICE]);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Completed {
                source: FragmentSource::Fallback(Intent::Scenario),
                ..
            })
        ));
        assert!(session.offline_notice_shown());

        let run = orchestrator
            .request(&session, Conversation::from_user(prompt))
            .await
            .expect("second request");
        let value = run.finish_structured().await.expect("fallback parses");
        assert_eq!(value, provide_fallback(prompt));
        assert_eq!(fake.calls(), (2, 2));

        let events = drain(
            orchestrator
                .request(&session, Conversation::from_user(prompt))
                .await
                .expect("third request"),
        )
        .await;
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::OfflineNotice { .. })));
    }

    #[tokio::test]
    async fn pure_prose_reports_missing_structure_and_can_fall_back() {
        let fake = FakeTransport::streaming(&["I'm sorry, I can't produce that right now."]);
        let orchestrator = orchestrator(fake);
        let prompt = "Generate 3 NPCs for the kitchen";

        let err = orchestrator
            .request(&session("s"), Conversation::from_user(prompt))
            .await
            .expect("request")
            .finish_structured()
            .await
            .expect_err("prose has no structure");
        assert!(matches!(
            err,
            HarnessError::Recovery(RecoveryError::NoJsonStructureFound { .. })
        ));

        let value = orchestrator
            .request(&session("s"), Conversation::from_user(prompt))
            .await
            .expect("request")
            .finish_structured_or_fallback()
            .await
            .expect("fallback");
        assert_eq!(value, provide_fallback(prompt));
    }

    #[tokio::test]
    async fn sloppy_roster_decodes_into_typed_payload() {
        let fake = FakeTransport::streaming(&[
            "```json\n[{id: \"n7\", name: \"Ada\", role: \"Chef\",",
            " personality: \"calm\", avatar: \"\u{1F373}\",},]\n```",
        ]);
        let payload = orchestrator(fake)
            .request(&session("s"), Conversation::from_user("Generate 1 unique INTERNAL STAFF NPCs"))
            .await
            .expect("request")
            .finish_payload()
            .await
            .expect("payload");
        let IntentPayload::NpcRoster(npcs) = payload else {
            panic!("expected roster, got {payload:?}");
        };
        assert_eq!(npcs.len(), 1);
        assert_eq!(npcs[0].id, "n7");
        assert_eq!(npcs[0].name, "Ada");
    }

    #[tokio::test]
    async fn same_conversation_key_is_serialized() {
        let fake = FakeTransport::new(
            vec![
                StreamBehavior::Pending,
                StreamBehavior::Items(vec![Ok("{}".into())]),
            ],
            Err(ProviderError::transport("unused")),
        );
        let orchestrator = orchestrator(fake.clone());
        let session = session("game");

        let mut first = orchestrator
            .request(&session, Conversation::from_user("one"))
            .await
            .expect("first");
        assert!(matches!(
            first.next_event().await,
            Some(StreamEvent::Started { .. })
        ));

        let mut second = orchestrator
            .request(&session, Conversation::from_user("two"))
            .await
            .expect("second");
        let waiting = tokio::time::timeout(Duration::from_millis(50), second.next_event()).await;
        assert!(waiting.is_err(), "second request should wait for the first");

        drop(first);
        let started = tokio::time::timeout(Duration::from_secs(2), second.next_event())
            .await
            .expect("second request proceeds");
        assert!(matches!(started, Some(StreamEvent::Started { .. })));
        let outcome = second.finish().await.expect("finish");
        assert_eq!(outcome.text, "{}");
        assert_eq!(fake.calls(), (2, 0));
    }

    #[tokio::test]
    async fn distinct_conversation_keys_run_concurrently() {
        let fake = FakeTransport::new(
            vec![
                StreamBehavior::Pending,
                StreamBehavior::Items(vec![Ok("{}".into())]),
            ],
            Err(ProviderError::transport("unused")),
        );
        let orchestrator = orchestrator(fake);
        let game = session("game");
        let npc = game.for_conversation("npc-n1");

        let mut first = orchestrator
            .request(&game, Conversation::from_user("one"))
            .await
            .expect("first");
        assert!(matches!(first.next_event().await, Some(StreamEvent::Started { .. })));

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            orchestrator
                .request(&npc, Conversation::from_user("two"))
                .await
                .expect("second")
                .finish(),
        )
        .await
        .expect("not blocked by other key")
        .expect("finish");
        assert_eq!(outcome.text, "{}");
    }

    #[tokio::test]
    async fn conversations_of_one_session_share_the_offline_notice() {
        let fake = FakeTransport::new(
            vec![StreamBehavior::Fail(ProviderError::transport("offline"))],
            Err(ProviderError::transport("still offline")),
        );
        let orchestrator = orchestrator(fake);
        let game = session("game");
        let npc = game.for_conversation("npc");
        let scenario = game.for_conversation("scenario");

        let npc_run = orchestrator
            .request(&npc, Conversation::from_user("Hi chef"))
            .await
            .expect("npc request");
        let scenario_run = orchestrator
            .request(&scenario, Conversation::from_user("Create a management scenario"))
            .await
            .expect("scenario request");
        let (npc_events, scenario_events) = tokio::join!(drain(npc_run), drain(scenario_run));

        let notices = npc_events
            .iter()
            .chain(scenario_events.iter())
            .filter(|e| matches!(e, StreamEvent::OfflineNotice { .. }))
            .count();
        assert_eq!(notices, 1);
        assert!(game.offline_notice_shown());
    }

    #[tokio::test]
    async fn sessions_sharing_a_name_do_not_block_each_other() {
        let fake = FakeTransport::new(
            vec![
                StreamBehavior::Pending,
                StreamBehavior::Items(vec![Ok("{}".into())]),
            ],
            Err(ProviderError::transport("unused")),
        );
        let orchestrator = orchestrator(fake);

        let mut first = orchestrator
            .request(&session("game"), Conversation::from_user("one"))
            .await
            .expect("first");
        assert!(matches!(first.next_event().await, Some(StreamEvent::Started { .. })));

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            orchestrator
                .request(&session("game"), Conversation::from_user("two"))
                .await
                .expect("second")
                .finish(),
        )
        .await
        .expect("not blocked by a same-named session")
        .expect("finish");
        assert_eq!(outcome.text, "{}");
    }

    #[tokio::test]
    async fn single_flight_slot_is_released() {
        let flight = SingleFlight::default();
        let guard = flight.acquire("k").await;
        assert_eq!(flight.len(), 1);
        flight.release("k");
        assert_eq!(flight.len(), 1, "held slot must survive release");
        drop(guard);
        flight.release("k");
        assert_eq!(flight.len(), 0);
    }
}
