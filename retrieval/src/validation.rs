//! Input validation: fail fast before any search work begins.
//!
//! Clamp/bound-check pattern shared across the hybrid/semantic/literal
//! surfaces: `limit` in `[1, 200]`, query length <= 1000, known filter
//! keys only.

use archivist_core::error::{CoreError, ErrorCode};
use chrono::{DateTime, Utc};
use storage::rows::SourceType;
use thiserror::Error;

pub const MAX_QUERY_LEN: usize = 1000;
pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 200;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("query/pattern must not be empty after trimming")]
    EmptyQuery,
    #[error("query/pattern exceeds {MAX_QUERY_LEN} characters")]
    QueryTooLong,
    #[error("limit must be >= 1 (got {0})")]
    LimitTooSmall(i64),
    #[error("filters.date_from must be <= filters.date_to")]
    DateRangeInverted,
    #[error("unknown source_type filter: {0}")]
    UnknownSourceType(String),
    #[error("fields must be a subset of {{title, body, substantive_text}}, got {0}")]
    UnknownField(String),
    #[error("tag_logic must be ANY or ALL, got {0}")]
    UnknownTagLogic(String),
}

impl CoreError for ValidationError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

/// Trims, strips ASCII control characters, and enforces the length bound.
/// Unicode beyond the ASCII control range is left untouched.
pub fn validate_query_text(raw: &str) -> Result<String, ValidationError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    if cleaned.chars().count() > MAX_QUERY_LEN {
        return Err(ValidationError::QueryTooLong);
    }
    Ok(cleaned)
}

/// `limit = 0` raises, `limit > 200` clamps silently to 200.
pub fn validate_limit(limit: i64) -> Result<usize, ValidationError> {
    if limit < MIN_LIMIT as i64 {
        return Err(ValidationError::LimitTooSmall(limit));
    }
    Ok((limit as usize).min(MAX_LIMIT))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagLogic {
    #[default]
    Any,
    All,
}

impl TagLogic {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.to_ascii_uppercase().as_str() {
            "ANY" => Ok(TagLogic::Any),
            "ALL" => Ok(TagLogic::All),
            other => Err(ValidationError::UnknownTagLogic(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub source_type: Option<Vec<SourceType>>,
    pub tags: Vec<String>,
    pub tag_logic: TagLogic,
}

impl SearchFilters {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(ValidationError::DateRangeInverted);
            }
        }
        Ok(())
    }
}

pub fn parse_source_type(raw: &str) -> Result<SourceType, ValidationError> {
    match raw {
        "email_message" => Ok(SourceType::EmailMessage),
        "email_summary" => Ok(SourceType::EmailSummary),
        "document" => Ok(SourceType::Document),
        "document_chunk" => Ok(SourceType::DocumentChunk),
        other => Err(ValidationError::UnknownSourceType(other.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralField {
    Title,
    Body,
    SubstantiveText,
}

pub fn parse_literal_field(raw: &str) -> Result<LiteralField, ValidationError> {
    match raw {
        "title" => Ok(LiteralField::Title),
        "body" => Ok(LiteralField::Body),
        "substantive_text" => Ok(LiteralField::SubstantiveText),
        other => Err(ValidationError::UnknownField(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_after_trim_is_rejected() {
        assert_eq!(validate_query_text("   "), Err(ValidationError::EmptyQuery));
    }

    #[test]
    fn control_characters_are_stripped() {
        let cleaned = validate_query_text("hello\u{0007}world").unwrap();
        assert_eq!(cleaned, "helloworld");
    }

    #[test]
    fn query_over_1000_chars_is_rejected() {
        let long = "a".repeat(1001);
        assert_eq!(validate_query_text(&long), Err(ValidationError::QueryTooLong));
    }

    #[test]
    fn limit_zero_is_rejected_limit_over_200_is_clamped() {
        assert_eq!(validate_limit(0), Err(ValidationError::LimitTooSmall(0)));
        assert_eq!(validate_limit(500).unwrap(), 200);
        assert_eq!(validate_limit(50).unwrap(), 50);
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let now = Utc::now();
        let earlier = now - chrono::Duration::days(1);
        let filters = SearchFilters {
            date_from: Some(now),
            date_to: Some(earlier),
            ..Default::default()
        };
        assert_eq!(filters.validate(), Err(ValidationError::DateRangeInverted));
    }

    #[test]
    fn tag_logic_parses_case_insensitively() {
        assert_eq!(TagLogic::parse("any").unwrap(), TagLogic::Any);
        assert_eq!(TagLogic::parse("ALL").unwrap(), TagLogic::All);
        assert!(TagLogic::parse("sometimes").is_err());
    }
}
