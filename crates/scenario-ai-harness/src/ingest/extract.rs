use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::errors::RecoveryError;

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```json\s*").expect("valid json fence regex"));
static BARE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```\s*").expect("valid bare fence regex"));

/// Top-level JSON shape a candidate is believed to hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructureKind {
    Object,
    Array,
}

impl StructureKind {
    fn open(self) -> char {
        match self {
            Self::Object => '{',
            Self::Array => '[',
        }
    }

    fn close(self) -> char {
        match self {
            Self::Object => '}',
            Self::Array => ']',
        }
    }
}

/// Substring believed to contain exactly one JSON object or array.
///
/// Offsets are byte offsets into the fence-stripped text, `end` inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedCandidate {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub kind: StructureKind,
}

/// Strategy for locating the outermost bracket pair in fence-stripped text.
pub trait BracketMatcher: Send + Sync {
    /// Returns `(start, end_inclusive, kind)` byte offsets, or `None`.
    fn locate(&self, text: &str) -> Option<(usize, usize, StructureKind)>;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// The first `{` or `[` that has a matching closer somewhere after it picks
/// the kind; the end is the last such closer in the text.
///
/// An opener with no closer after it is skipped, so a truncated outer array
/// such as `[{"a":1}` still yields the inner object.
///
/// Not depth-aware: trailing prose containing the closer, or unbalanced
/// brackets inside strings, widen the candidate.
#[derive(Clone, Copy, Debug, Default)]
pub struct OuterBracketMatcher;

impl BracketMatcher for OuterBracketMatcher {
    fn locate(&self, text: &str) -> Option<(usize, usize, StructureKind)> {
        let last_brace = text.rfind('}');
        let last_bracket = text.rfind(']');
        text.char_indices().find_map(|(start, c)| {
            let (kind, last) = match c {
                '{' => (StructureKind::Object, last_brace),
                '[' => (StructureKind::Array, last_bracket),
                _ => return None,
            };
            last.filter(|&end| end > start).map(|end| (start, end, kind))
        })
    }

    fn name(&self) -> &'static str {
        "outer"
    }
}

/// Scans from the first opener, tracking brace/bracket depth outside string
/// literals, and stops at the position where the depth returns to zero.
///
/// If the value never closes, falls back to [`OuterBracketMatcher`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DepthBracketMatcher;

impl BracketMatcher for DepthBracketMatcher {
    fn locate(&self, text: &str) -> Option<(usize, usize, StructureKind)> {
        let kind = first_opener(text)?;
        let start = text.find(kind.open())?;
        let mut depth: i32 = 0;
        let mut in_str = false;
        let mut escape = false;
        for (offset, c) in text[start..].char_indices() {
            if in_str {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_str = false;
                }
                continue;
            }
            match c {
                '"' => in_str = true,
                '{' | '[' => depth += 1,
                '}' | ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((start, start + offset, kind));
                    }
                    if depth < 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        OuterBracketMatcher.locate(text)
    }

    fn name(&self) -> &'static str {
        "depth"
    }
}

fn first_opener(text: &str) -> Option<StructureKind> {
    match (text.find('{'), text.find('[')) {
        (Some(brace), Some(bracket)) if brace < bracket => Some(StructureKind::Object),
        (Some(_), None) => Some(StructureKind::Object),
        (_, Some(_)) => Some(StructureKind::Array),
        (None, None) => None,
    }
}

/// Removes every ```` ```json ```` and ```` ``` ```` marker, wherever it occurs.
pub fn strip_code_fences(text: &str) -> String {
    let without_json = JSON_FENCE.replace_all(text, "");
    BARE_FENCE.replace_all(&without_json, "").into_owned()
}

/// Isolates the outermost JSON value using the heuristic outer-bracket match.
pub fn extract(full_text: &str) -> Result<ExtractedCandidate, RecoveryError> {
    extract_with(full_text, &OuterBracketMatcher)
}

/// Isolates the outermost JSON value using the given matcher.
pub fn extract_with(
    full_text: &str,
    matcher: &dyn BracketMatcher,
) -> Result<ExtractedCandidate, RecoveryError> {
    let trimmed = full_text.trim();
    if trimmed.is_empty() {
        return Err(RecoveryError::EmptyInput);
    }
    let stripped = strip_code_fences(trimmed);
    let Some((start, end, kind)) = matcher.locate(&stripped) else {
        debug!(matcher = matcher.name(), "no JSON brackets found in response");
        return Err(RecoveryError::no_structure(&stripped));
    };
    let text = stripped[start..=end].to_string();
    debug!(
        matcher = matcher.name(),
        start,
        end,
        len = text.len(),
        ?kind,
        "extracted JSON candidate"
    );
    Ok(ExtractedCandidate {
        text,
        start,
        end,
        kind,
    })
}
