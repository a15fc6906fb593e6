use crate::errors::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental server-sent-events decoder tolerant of arbitrary chunk boundaries.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes = self.buf[..idx].to_vec();
            self.buf.drain(..idx + delim_len);
            if let Some(frame) = parse_sse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame the server did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buf);
        parse_sse_frame(&rest)
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_sse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// What one SSE frame of a chat-completions stream means for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChunkEvent {
    Fragment(String),
    Done,
    Ignored,
}

pub(crate) fn map_chat_frame(frame: &SseFrame) -> Result<ChunkEvent, ProviderError> {
    let data = frame.data.trim();
    if data.is_empty() {
        return Ok(ChunkEvent::Ignored);
    }
    if data == "[DONE]" {
        return Ok(ChunkEvent::Done);
    }
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::transport(format!("invalid SSE JSON frame: {e}")))?;
    map_chat_chunk(&value)
}

pub(crate) fn map_chat_chunk(value: &serde_json::Value) -> Result<ChunkEvent, ProviderError> {
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .or_else(|| error.as_str())
            .unwrap_or("chat stream error");
        return Err(ProviderError::transport(message));
    }
    let Some(choice) = value
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|choices| choices.first())
    else {
        return Ok(ChunkEvent::Ignored);
    };
    // Some servers resend the whole message instead of a delta.
    let content = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .or_else(|| choice.get("message").and_then(|m| m.get("content")))
        .and_then(|v| v.as_str());
    match content {
        Some(text) if !text.is_empty() => Ok(ChunkEvent::Fragment(text.to_string())),
        _ => Ok(ChunkEvent::Ignored),
    }
}

/// Text of a non-streaming chat completion, or `""` when the response has none.
pub(crate) fn extract_message_content(response: &serde_json::Value) -> String {
    response
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
