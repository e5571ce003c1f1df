//! Pattern compilation and text helpers shared by the detectors

use crate::error::ConfigurationError;
use regex::{Regex, RegexBuilder};

/// Compile a configured pattern, case-insensitively
pub fn compile_pattern(owner: &str, pattern: &str) -> Result<Regex, ConfigurationError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigurationError::InvalidPattern {
            rule: owner.to_string(),
            source,
        })
}

/// Compile a keyword list into a single whole-word alternation
///
/// Word boundaries are only asserted on sides of a term that start or end with
/// a word character, so terms like "non-compliant" or "e.g." still match.
pub fn compile_terms(owner: &str, terms: &[String]) -> Result<Regex, ConfigurationError> {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|term| term.trim())
        .filter(|term| !term.is_empty())
        .map(|term| {
            let starts_word = term.chars().next().map_or(false, is_word_char);
            let ends_word = term.chars().last().map_or(false, is_word_char);
            format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(term),
                if ends_word { r"\b" } else { "" }
            )
        })
        .collect();

    if alternatives.is_empty() {
        return Err(ConfigurationError::invalid(owner, "keyword list is empty"));
    }

    compile_pattern(owner, &format!("(?:{})", alternatives.join("|")))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Convert a byte index within `text` into a char offset
pub fn char_offset(text: &str, byte_idx: usize) -> usize {
    text[..byte_idx].chars().count()
}

/// Widen a byte range by `radius` chars on each side, clamped to `text`
pub fn context_bounds(text: &str, start: usize, end: usize, radius: usize) -> (usize, usize) {
    let before = text[..start]
        .char_indices()
        .rev()
        .nth(radius.saturating_sub(1))
        .map(|(idx, _)| idx);
    let context_start = if radius == 0 { start } else { before.unwrap_or(0) };

    let context_end = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(idx, _)| end + idx)
        .unwrap_or(text.len());

    (context_start, context_end)
}

/// Extract a snippet around a byte range, marking truncation with ellipses
pub fn extract_snippet(text: &str, start: usize, end: usize, radius: usize) -> String {
    let (context_start, context_end) = context_bounds(text, start, end, radius);
    let snippet = text[context_start..context_end].trim();
    let lead = if context_start > 0 { "..." } else { "" };
    let tail = if context_end < text.len() { "..." } else { "" };
    format!("{}{}{}", lead, snippet, tail)
}

/// Keep at most `max` chars of `text`
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Lowercase word tokens; apostrophes and hyphens inside a word are kept
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if (c == '\'' || c == '-' || c == '\u{2019}') && !current.is_empty() {
            current.push(if c == '\u{2019}' { '\'' } else { c });
        } else if !current.is_empty() {
            tokens.push(finish_token(std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        tokens.push(finish_token(current));
    }

    tokens.retain(|t| !t.is_empty());
    tokens
}

fn finish_token(mut token: String) -> String {
    while token.ends_with('\'') || token.ends_with('-') {
        token.pop();
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_terms_matches_whole_words() {
        let re = compile_terms("test", &["risk".to_string(), "non-compliant".to_string()]).unwrap();
        assert!(re.is_match("The RISK is high"));
        assert!(re.is_match("client was non-compliant."));
        assert!(!re.is_match("brisk walk"));
    }

    #[test]
    fn test_compile_terms_rejects_empty_list() {
        assert!(compile_terms("test", &[]).is_err());
        assert!(compile_terms("test", &["  ".to_string()]).is_err());
    }

    #[test]
    fn test_compile_pattern_reports_owner() {
        let err = compile_pattern("rule-x", "(").unwrap_err();
        match err {
            ConfigurationError::InvalidPattern { rule, .. } => assert_eq!(rule, "rule-x"),
            other => panic!("Expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn test_context_bounds_clamps_to_text() {
        let text = "abcdefghij";
        assert_eq!(context_bounds(text, 4, 6, 2), (2, 8));
        assert_eq!(context_bounds(text, 1, 2, 5), (0, 7));
        assert_eq!(context_bounds(text, 8, 10, 5), (3, 10));
        assert_eq!(context_bounds(text, 4, 6, 0), (4, 6));
    }

    #[test]
    fn test_context_bounds_respects_char_boundaries() {
        let text = "ééé word ééé";
        let start = text.find("word").unwrap();
        let (s, e) = context_bounds(text, start, start + 4, 2);
        assert_eq!(&text[s..e], "é word é");
    }

    #[test]
    fn test_extract_snippet_marks_truncation() {
        let text = "The client was calm during the visit on Monday.";
        let start = text.find("calm").unwrap();
        let snippet = extract_snippet(text, start, start + 4, 8);
        assert_eq!(snippet, "...ent was calm during...");
        assert_eq!(extract_snippet("calm", 0, 4, 10), "calm");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("The client's mother-in-law, AGED 70!"),
            vec!["the", "client's", "mother-in-law", "aged", "70"]
        );
        assert_eq!(tokenize("isn’t"), vec!["isn't"]);
        assert!(tokenize(" ... ").is_empty());
    }
}
