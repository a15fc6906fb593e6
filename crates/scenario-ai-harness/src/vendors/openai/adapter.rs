use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::errors::{HarnessError, ProviderError};
use crate::provider::{ChatRequest, ChatTransport, FragmentStream};

use super::transport::{ChunkEvent, SseDecoder, extract_message_content, map_chat_frame};

const OPENAI_TRANSPORT: &str = "openai-chat";

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Transport for OpenAI-compatible `/chat/completions` endpoints.
///
/// Endpoint, key and timeout come from the request's `ConnectionConfig`, so
/// one transport serves every configuration.
#[derive(Clone)]
pub struct OpenAiTransport {
    client: reqwest::Client,
}

impl OpenAiTransport {
    /// Creates a transport with a default HTTP client.
    pub fn new() -> Result<Self, HarnessError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Creates a transport around an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(
        &self,
        req: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let body = build_request_body(req, stream);
        let mut http_req = self
            .client
            .post(req.config.chat_completions_url())
            .timeout(req.config.timeout)
            .json(&body);
        if !req.config.api_key.trim().is_empty() {
            http_req = http_req.bearer_auth(&req.config.api_key);
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| ProviderError::transport(format!("chat request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::provider(
                format!("chat request failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ChatTransport for OpenAiTransport {
    fn name(&self) -> &'static str {
        OPENAI_TRANSPORT
    }

    async fn stream_chat(&self, req: &ChatRequest) -> Result<FragmentStream, ProviderError> {
        debug!(run_id = %req.run_id, model = %req.config.model, "starting chat completion stream");
        let response = self.send(req, true).await?;
        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(fragment_stream(bytes_stream)))
    }

    async fn complete_chat(&self, req: &ChatRequest) -> Result<String, ProviderError> {
        debug!(run_id = %req.run_id, model = %req.config.model, "requesting non-streaming chat completion");
        let response = self.send(req, false).await?;
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::protocol(format!("invalid chat completion body: {e}")))?;
        Ok(extract_message_content(&value))
    }
}

pub(crate) fn build_request_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    let mut messages = Vec::with_capacity(req.history.len() + 1);
    let system_prompt = req.config.system_prompt.trim();
    if !system_prompt.is_empty() {
        messages.push(serde_json::json!({
            "role": "system",
            "content": system_prompt,
        }));
    }
    for message in req.history.messages() {
        messages.push(serde_json::json!({
            "role": message.role,
            "content": message.content,
        }));
    }
    serde_json::json!({
        "model": req.config.model,
        "stream": stream,
        "messages": messages,
    })
}

fn fragment_stream(
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<String, ProviderError>> + Send {
    struct State {
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        failed: Option<ProviderError>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            failed: None,
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(fragment) = state.pending.pop_front() {
                    return Ok(Some((fragment, state)));
                }
                // Fragments decoded before a failing frame are delivered first.
                if let Some(err) = state.failed.take() {
                    return Err(err);
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.push_chunk(&chunk) {
                            match map_chat_frame(&frame) {
                                Ok(ChunkEvent::Fragment(text)) => state.pending.push_back(text),
                                Ok(ChunkEvent::Done) => state.done = true,
                                Ok(ChunkEvent::Ignored) => {}
                                Err(err) => {
                                    state.failed = Some(err);
                                    state.done = true;
                                }
                            }
                            if state.done {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(ProviderError::transport(format!(
                            "chat stream read failed: {e}"
                        )));
                    }
                    None => {
                        if let Some(frame) = state.decoder.finish()
                            && let ChunkEvent::Fragment(text) = map_chat_frame(&frame)?
                        {
                            state.pending.push_back(text);
                        }
                        state.done = true;
                    }
                }
            }
        },
    )
}
