/// Number of characters kept in the preview of text that had no JSON structure.
pub(crate) const STRUCTURE_PREVIEW_CHARS: usize = 100;
/// Number of characters kept in the preview of text that failed to parse.
pub(crate) const PARSE_PREVIEW_CHARS: usize = 50;

/// Errors returned by a chat transport before they are absorbed by the
/// orchestrator's fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Endpoint returned an application-level failure (HTTP status, auth, etc.).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or stream I/O failed.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Response shape or event sequencing was invalid.
    #[error("protocol error: {message}")]
    Protocol { message: String },
}

impl ProviderError {
    /// Creates a provider-level error.
    pub fn provider(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Provider {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Provider { message, .. }
            | Self::Transport { message }
            | Self::Protocol { message } => message,
        }
    }

    /// Returns the HTTP status code when the endpoint answered with one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Provider { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

/// Structural failure while turning model text into a JSON value.
///
/// Every variant that has seen text carries a truncated preview of it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecoveryError {
    /// The text was empty or whitespace-only.
    #[error("empty input: the model returned no text")]
    EmptyInput,
    /// No balanced `{...}` or `[...]` pair could be located.
    #[error("no valid JSON structure found in response: {preview}")]
    NoJsonStructureFound { preview: String },
    /// The repaired candidate failed both parse attempts.
    #[error("JSON parsing failed: {message}. Content was: {preview}...")]
    ParseFailed { message: String, preview: String },
}

impl RecoveryError {
    pub(crate) fn no_structure(text: &str) -> Self {
        Self::NoJsonStructureFound {
            preview: preview(text, STRUCTURE_PREVIEW_CHARS),
        }
    }

    pub(crate) fn parse_failed(message: impl Into<String>, text: &str) -> Self {
        Self::ParseFailed {
            message: message.into(),
            preview: preview(text, PARSE_PREVIEW_CHARS),
        }
    }

    /// Returns the truncated text preview carried by this error, if any.
    pub fn preview(&self) -> Option<&str> {
        match self {
            Self::EmptyInput => None,
            Self::NoJsonStructureFound { preview } | Self::ParseFailed { preview, .. } => {
                Some(preview)
            }
        }
    }
}

/// Top-level error type for the public API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// Connection configuration is missing or invalid. Fatal for the call.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input to the builder or request API.
    #[error("validation error: {0}")]
    Validation(String),
    /// Model output could not be recovered into a JSON value.
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl HarnessError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

/// Returns at most `max_chars` characters of `text`, cut on a char boundary.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
