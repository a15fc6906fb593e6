//! Syntax-repair heuristics applied to an extracted candidate.
//!
//! Each pass is a pure text transformation that is safe to re-run on its own
//! output. [`repair`] runs them in a fixed order.

use std::borrow::Cow;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Stutter removal only looks at candidates with more lines than this.
const STUTTER_MIN_LINES: usize = 5;
/// The de-duplicated text is kept only if it has fewer than this share of lines.
const STUTTER_KEEP_RATIO: f64 = 0.8;
/// Trimmed lines shorter than this are never treated as stutter.
const STUTTER_MIN_LINE_CHARS: usize = 3;

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("valid trailing comma regex"));
static UNQUOTED_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z0-9_]+)(\s*:)").expect("valid unquoted key regex")
});
static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x1F\x7F]").expect("valid control char regex"));
static LEADING_PLUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*\+(\d+)").expect("valid leading plus regex"));

/// Runs every repair pass over `candidate`, in order.
pub fn repair(candidate: &str) -> String {
    let text = remove_stutter(candidate);
    let text = remove_trailing_commas(&text);
    let text = quote_unquoted_keys(&text);
    let text = strip_control_chars(&text);
    normalize_leading_plus(&text).into_owned()
}

/// Drops non-structural lines whose trimmed form already appeared earlier.
///
/// Returns the input unchanged when it has too few lines or when de-duplication
/// would remove less than a fifth of them.
pub fn remove_stutter(text: &str) -> Cow<'_, str> {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= STUTTER_MIN_LINES {
        return Cow::Borrowed(text);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let kept: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|line| {
            let trimmed = line.trim();
            is_structural_line(trimmed) || seen.insert(trimmed)
        })
        .collect();

    if (kept.len() as f64) < (lines.len() as f64) * STUTTER_KEEP_RATIO {
        debug!(before = lines.len(), after = kept.len(), "removed stuttered lines");
        Cow::Owned(kept.join("\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn is_structural_line(trimmed: &str) -> bool {
    matches!(trimmed, "{" | "}" | "}," | "]" | "],")
        || trimmed.chars().count() < STUTTER_MIN_LINE_CHARS
}

/// Deletes commas that directly precede a closing `}` or `]`.
pub fn remove_trailing_commas(text: &str) -> Cow<'_, str> {
    TRAILING_COMMA.replace_all(text, "$1")
}

/// Wraps bare identifier keys that follow `{` or `,` in double quotes.
pub fn quote_unquoted_keys(text: &str) -> Cow<'_, str> {
    UNQUOTED_KEY.replace_all(text, "${1}\"${2}\"${3}")
}

/// Removes C0 control characters and DEL.
pub fn strip_control_chars(text: &str) -> Cow<'_, str> {
    CONTROL_CHARS.replace_all(text, "")
}

/// Rewrites `: +5` as `: 5`.
pub fn normalize_leading_plus(text: &str) -> Cow<'_, str> {
    LEADING_PLUS.replace_all(text, ": ${1}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> serde_json::Value {
        serde_json::from_str(text).expect("repaired text should parse")
    }

    #[test]
    fn trailing_commas_are_removed() {
        let repaired = repair("{\"a\":1,\"b\":2,}");
        assert_eq!(parse(&repaired), serde_json::json!({"a": 1, "b": 2}));
        assert_eq!(remove_trailing_commas("[1, 2 ,\n ]"), "[1, 2 \n ]");
    }

    #[test]
    fn unquoted_keys_are_quoted() {
        let repaired = repair("{a:1, b:2}");
        assert_eq!(parse(&repaired), serde_json::json!({"a": 1, "b": 2}));
    }

    #[test]
    fn quoted_keys_are_left_alone() {
        let text = "{\"a\": 1, \"b\": {\"c\": [1, 2]}}";
        assert_eq!(quote_unquoted_keys(text), text);
    }

    #[test]
    fn control_characters_are_stripped() {
        let repaired = strip_control_chars("{\"a\":\u{0007}\"x\u{007f}\"}\r\n");
        assert_eq!(repaired, "{\"a\":\"x\"}");
    }

    #[test]
    fn leading_plus_is_normalized() {
        let repaired = repair("{\"morale\": +5, \"cost\":+120}");
        assert_eq!(parse(&repaired), serde_json::json!({"morale": 5, "cost": 120}));
    }

    #[test]
    fn stutter_is_removed_and_result_parses() {
        let mut lines = vec!["{".to_string(), "  \"items\": [".to_string()];
        lines.push("    \"alpha\",".to_string());
        lines.push("    \"beta\",".to_string());
        for _ in 0..15 {
            lines.push("    \"beta\",".to_string());
        }
        lines.push("    \"gamma\"".to_string());
        lines.push("  ]".to_string());
        lines.push("}".to_string());
        let text = lines.join("\n");
        assert_eq!(text.split('\n').count(), 22);

        let cleaned = remove_stutter(&text);
        assert!(cleaned.split('\n').count() < 22);
        let value = parse(&repair(&text));
        assert_eq!(value, serde_json::json!({"items": ["alpha", "beta", "gamma"]}));
    }

    #[test]
    fn stutter_below_threshold_is_kept() {
        let text = "{\n\"a\": 1,\n\"b\": 2,\n\"c\": 3,\n\"d\": 4,\n\"d\": 4,\n}";
        assert!(matches!(remove_stutter(text), Cow::Borrowed(_)));
    }

    #[test]
    fn short_candidates_are_not_deduplicated() {
        let text = "[\n\"x\",\n\"x\",\n\"x\"\n]";
        assert_eq!(remove_stutter(text), text);
    }

    #[test]
    fn structural_lines_survive_deduplication() {
        let text = "[\n{\n\"v\": 1\n},\n{\n\"v\": 1\n},\n{\n\"v\": 1\n},\n{\n\"v\": 1\n}\n]";
        let cleaned = remove_stutter(text);
        assert!(matches!(cleaned, Cow::Owned(_)));
        assert_eq!(cleaned.matches("},").count(), 3);
        assert_eq!(cleaned.matches("\"v\": 1").count(), 1);
    }

    #[test]
    fn repair_is_idempotent() {
        let once = repair("{a:1, b: +2, list: [1,2,],}");
        assert_eq!(repair(&once), once);
        assert_eq!(parse(&once), serde_json::json!({"a": 1, "b": 2, "list": [1, 2]}));
    }
}
