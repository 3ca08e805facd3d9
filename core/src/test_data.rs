//! Test-data pattern matching, shared by the content store's ingestion gate
//! and the validator's rule set so the two never drift out of sync.

use regex::Regex;

/// Returns the first configured pattern that matches `title` or `body`.
/// Each pattern is tried as a regex first; a pattern that fails to compile
/// falls back to a plain substring match instead of being silently skipped.
pub fn first_match<'a>(patterns: &'a [String], title: &str, body: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|pattern| {
            Regex::new(pattern)
                .map(|re| re.is_match(title) || re.is_match(body))
                .unwrap_or_else(|_| title.contains(pattern.as_str()) || body.contains(pattern.as_str()))
        })
        .map(|s| s.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_regex_pattern_against_title_or_body() {
        let patterns = vec!["(?i)test fixture".to_string()];
        assert_eq!(
            first_match(&patterns, "TEST FIXTURE", "lorem"),
            Some("(?i)test fixture")
        );
        assert_eq!(first_match(&patterns, "unrelated", "lorem"), None);
    }

    #[test]
    fn falls_back_to_substring_match_for_invalid_regex() {
        let patterns = vec!["[unterminated".to_string()];
        assert_eq!(
            first_match(&patterns, "has [unterminated inside", "lorem"),
            Some("[unterminated")
        );
    }
}
