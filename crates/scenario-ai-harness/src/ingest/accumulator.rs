use tracing::debug;

/// How a single fragment was folded into the buffer.
///
/// Inferred per fragment: providers may switch between styles mid-stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmissionMode {
    /// Fragment carried only new content and was appended.
    Delta,
    /// Fragment carried the whole output so far and replaced the buffer.
    Snapshot,
}

/// Folds `fragment` into `current` and returns the new buffer.
///
/// A non-empty buffer that the fragment starts with is a full-snapshot resend;
/// anything else is appended. A fragment that is a strict prefix of the buffer
/// is appended too, even though that duplicates text.
pub fn accumulate(current: &str, fragment: &str) -> String {
    match classify(current, fragment) {
        EmissionMode::Snapshot => fragment.to_string(),
        EmissionMode::Delta => {
            let mut out = String::with_capacity(current.len() + fragment.len());
            out.push_str(current);
            out.push_str(fragment);
            out
        }
    }
}

fn classify(current: &str, fragment: &str) -> EmissionMode {
    if !current.is_empty() && fragment.starts_with(current) {
        EmissionMode::Snapshot
    } else {
        EmissionMode::Delta
    }
}

/// Best-known full text of one in-flight model response.
///
/// Owned by a single ingestion call; never shared.
#[derive(Clone, Debug, Default)]
pub struct Accumulator {
    text: String,
    fragments: u64,
    snapshots: u64,
    shrinks: u64,
    last_mode: Option<EmissionMode>,
}

impl Accumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one fragment into the buffer and reports how it was applied.
    pub fn push(&mut self, fragment: &str) -> EmissionMode {
        let mode = classify(&self.text, fragment);
        if mode == EmissionMode::Delta
            && !fragment.is_empty()
            && fragment.len() < self.text.len()
            && self.text.starts_with(fragment)
        {
            // Shrinking snapshot; appended anyway, counted for diagnostics.
            self.shrinks += 1;
            debug!(
                buffered = self.text.len(),
                fragment = fragment.len(),
                "fragment is a strict prefix of the buffer; appending"
            );
        }
        match mode {
            EmissionMode::Snapshot => {
                self.text.clear();
                self.text.push_str(fragment);
                self.snapshots += 1;
            }
            EmissionMode::Delta => self.text.push_str(fragment),
        }
        if self.last_mode.is_some_and(|prev| prev != mode) {
            debug!(?mode, fragments = self.fragments, "emission mode changed mid-stream");
        }
        self.last_mode = Some(mode);
        self.fragments += 1;
        mode
    }

    /// Returns the current buffer.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of fragments folded so far.
    pub fn fragment_count(&self) -> u64 {
        self.fragments
    }

    /// Number of fragments treated as full snapshots.
    pub fn snapshot_count(&self) -> u64 {
        self.snapshots
    }

    /// Number of fragments that were strict prefixes of the buffer when they arrived.
    pub fn shrink_count(&self) -> u64 {
        self.shrinks
    }

    /// Consumes the accumulator and returns the buffer.
    pub fn into_text(self) -> String {
        self.text
    }
}
