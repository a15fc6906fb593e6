use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::errors::RecoveryError;

use super::extract::{BracketMatcher, ExtractedCandidate, OuterBracketMatcher, extract_with};
use super::repair::repair;

static LINE_BREAKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\r\n\t]").expect("valid line break regex"));

/// Parses repaired text into a JSON value.
///
/// Tries a strict parse first, then once more with newlines, carriage returns
/// and tabs flattened to spaces.
pub fn parse_structured(repaired: &str) -> Result<serde_json::Value, RecoveryError> {
    if repaired.trim().is_empty() {
        return Err(RecoveryError::EmptyInput);
    }
    match serde_json::from_str(repaired) {
        Ok(value) => Ok(value),
        Err(primary) => {
            warn!(error = %primary, "primary parse failed, trying flattened text");
            let flattened = LINE_BREAKS.replace_all(repaired, " ");
            serde_json::from_str(&flattened).map_err(|err| {
                warn!(error = %err, "flattened parse failed");
                RecoveryError::parse_failed(err.to_string(), repaired)
            })
        }
    }
}

/// Extract, repair and parse pipeline with a pluggable bracket matcher.
#[derive(Clone)]
pub struct Recovery {
    matcher: Arc<dyn BracketMatcher>,
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new(Arc::new(OuterBracketMatcher))
    }
}

impl Recovery {
    /// Creates a pipeline that locates candidates with `matcher`.
    pub fn new(matcher: Arc<dyn BracketMatcher>) -> Self {
        Self { matcher }
    }

    /// Isolates the JSON candidate in `full_text`.
    pub fn extract(&self, full_text: &str) -> Result<ExtractedCandidate, RecoveryError> {
        extract_with(full_text, self.matcher.as_ref())
    }

    /// Runs the whole pipeline over `full_text`.
    pub fn recover(&self, full_text: &str) -> Result<serde_json::Value, RecoveryError> {
        let candidate = self.extract(full_text)?;
        let repaired = repair(&candidate.text);
        let value = parse_structured(&repaired)?;
        debug!(
            matcher = self.matcher.name(),
            candidate_len = candidate.text.len(),
            "recovered structured value"
        );
        Ok(value)
    }
}

impl std::fmt::Debug for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recovery")
            .field("matcher", &self.matcher.name())
            .finish()
    }
}

/// Runs the default pipeline (outer-bracket extraction) over `full_text`.
pub fn recover(full_text: &str) -> Result<serde_json::Value, RecoveryError> {
    Recovery::default().recover(full_text)
}
