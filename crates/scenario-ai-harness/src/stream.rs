use crate::intent::Intent;

/// Where the text of a fragment came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "intent")]
pub enum FragmentSource {
    /// Streaming transport.
    Stream,
    /// Single non-streaming retry after the stream failed.
    NonStreaming,
    /// Canned payload for the classified intent.
    Fallback(Intent),
}

/// Normalized events exposed by `RunStream`.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// First event for every run, sent once the request holds its conversation slot.
    Started {
        run_id: uuid::Uuid,
        session_id: uuid::Uuid,
        model: String,
    },
    /// One text fragment, in arrival order.
    Fragment {
        run_id: uuid::Uuid,
        seq: u64,
        text: String,
        source: FragmentSource,
    },
    /// Sent the first time a session falls back to canned content.
    OfflineNotice { run_id: uuid::Uuid, message: String },
    /// Terminal event; `source` is where the final text came from.
    Completed {
        run_id: uuid::Uuid,
        source: FragmentSource,
    },
}
